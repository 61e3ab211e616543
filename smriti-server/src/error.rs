//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use smriti_core::SmritiError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not found - requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict - the resource is busy with another request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Pipeline error from smriti-core
    #[error("Smriti error: {0}")]
    Smriti(#[from] SmritiError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Smriti(ref e) => match e {
                // Guest/owner input → 4xx with guidance
                SmritiError::NoFaceDetected
                | SmritiError::InvalidReference(_)
                | SmritiError::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SmritiError::InvalidPasskey => StatusCode::UNAUTHORIZED,
                SmritiError::UnsupportedUpload(_) | SmritiError::UnsupportedProgressVersion(_, _) => {
                    StatusCode::BAD_REQUEST
                }
                SmritiError::SearchNotActive(_) => StatusCode::CONFLICT,

                // External collaborator failures → 502/503
                SmritiError::Throttled(_) | SmritiError::Directory(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SmritiError::Storage(_)
                | SmritiError::Listing { .. }
                | SmritiError::Recognition(_)
                | SmritiError::CollectionNotFound(_) => StatusCode::BAD_GATEWAY,

                // Internal processing failures → 500
                SmritiError::Archive(_) | SmritiError::Serialization(_) | SmritiError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Smriti(ref e) => match e {
                SmritiError::NoFaceDetected => "NO_FACE_DETECTED",
                SmritiError::InvalidReference(_) => "INVALID_REFERENCE",
                SmritiError::InvalidImage(_) => "INVALID_IMAGE",
                SmritiError::InvalidPasskey => "INVALID_PASSKEY",
                SmritiError::UnsupportedUpload(_) => "UNSUPPORTED_UPLOAD",
                SmritiError::UnsupportedProgressVersion(_, _) => "UNSUPPORTED_PROGRESS_VERSION",
                SmritiError::SearchNotActive(_) => "SEARCH_NOT_ACTIVE",
                SmritiError::Throttled(_) => "RECOGNITION_THROTTLED",
                SmritiError::Directory(_) => "DIRECTORY_UNAVAILABLE",
                SmritiError::Storage(_) => "STORAGE_ERROR",
                SmritiError::Listing { .. } => "LISTING_FAILED",
                SmritiError::Recognition(_) => "RECOGNITION_ERROR",
                SmritiError::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
                SmritiError::Archive(_) => "ARCHIVE_ERROR",
                SmritiError::Serialization(_) => "SERIALIZATION_ERROR",
                SmritiError::Config(_) => "CONFIG_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Smriti(ref e) => match e {
                SmritiError::NoFaceDetected => {
                    "No face was detected in your photo. Please upload a clear, front-facing selfie."
                        .to_string()
                }
                SmritiError::InvalidPasskey => "Invalid access passkey".to_string(),
                SmritiError::InvalidReference(msg) => format!("Selfie not usable: {msg}"),
                SmritiError::UnsupportedUpload(msg) => format!("Upload rejected: {msg}"),
                SmritiError::SearchNotActive(state) => {
                    format!("Search is not running (state: {state})")
                }
                SmritiError::UnsupportedProgressVersion(v, current) => {
                    format!("Unsupported progress version {v} (current: {current})")
                }
                SmritiError::InvalidImage(_) => "Image could not be processed".to_string(),
                SmritiError::Throttled(_) => {
                    "Face recognition is busy, please try again shortly".to_string()
                }
                SmritiError::Directory(_) => "Event directory unavailable".to_string(),
                SmritiError::Storage(_) | SmritiError::Listing { .. } => {
                    "Photo storage error".to_string()
                }
                SmritiError::Recognition(_) | SmritiError::CollectionNotFound(_) => {
                    "Face recognition service error".to_string()
                }
                SmritiError::Archive(_) => "Could not build the archive".to_string(),
                SmritiError::Serialization(_) | SmritiError::Config(_) => {
                    "Internal error".to_string()
                }
            },
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Smriti(e) if e.is_user_input() => "user_input",
            Self::Smriti(_) => "pipeline",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_input_maps_to_4xx() {
        let err = ApiError::from(SmritiError::NoFaceDetected);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_code(), "NO_FACE_DETECTED");

        let err = ApiError::from(SmritiError::InvalidPasskey);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_systemic_errors_are_sanitized() {
        let err = ApiError::from(SmritiError::Recognition(
            "AccessDeniedException: arn:aws:iam::123456789012".into(),
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.client_message().contains("123456789012"));
    }
}
