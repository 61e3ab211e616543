use thiserror::Error;

use crate::recognition::RecognitionError;

/// Current `SearchProgress` snapshot format version.
pub const CURRENT_PROGRESS_VERSION: u8 = 1;

#[derive(Error, Debug)]
pub enum SmritiError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Listing failed for {bucket}/{prefix}: {message}")]
    Listing {
        bucket: String,
        prefix: String,
        message: String,
    },

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Recognition service throttled the request: {0}")]
    Throttled(String),

    #[error("Face collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Image rejected by recognition service: {0}")]
    InvalidImage(String),

    #[error("Reference image is not usable: {0}")]
    InvalidReference(String),

    #[error("No face detected in the reference image")]
    NoFaceDetected,

    #[error("Invalid access passkey")]
    InvalidPasskey,

    #[error("No active search (state: {0})")]
    SearchNotActive(String),

    #[error("Unsupported upload: {0}")]
    UnsupportedUpload(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported progress version {0} (current: {1})")]
    UnsupportedProgressVersion(u8, u8),

    #[error("Directory lookup failed: {0}")]
    Directory(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SmritiError {
    /// Errors caused by what the guest or owner submitted rather than by the system.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::NoFaceDetected
                | Self::InvalidReference(_)
                | Self::InvalidPasskey
                | Self::UnsupportedUpload(_)
        )
    }

    /// Errors that abort a whole search.
    pub fn is_fatal(&self) -> bool {
        !self.is_user_input()
    }
}

impl From<RecognitionError> for SmritiError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::Throttled(msg) => Self::Throttled(msg),
            RecognitionError::NotFound(msg) => Self::CollectionNotFound(msg),
            RecognitionError::BadImage(msg) => Self::InvalidImage(msg),
            RecognitionError::Other(msg) => Self::Recognition(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, SmritiError>;
