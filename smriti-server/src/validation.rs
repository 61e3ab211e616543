//! Upload validation module
//!
//! Provides validation utilities for multipart selfie and photo uploads.

use crate::error::ApiError;

/// Allowed MIME type categories for photo uploads
const ALLOWED_MIME_PREFIXES: &[&str] = &["image/", "application/octet-stream"];

/// Longest passkey accepted before hitting the directory
const MAX_PASSKEY_LEN: usize = 128;

/// Default max file size in bytes (25 MB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 25 * 1024 * 1024;

/// Validates the Content-Type of an uploaded file
///
/// Accepts image/* and application/octet-stream (RAW camera files are often
/// sent without a specific image type). A missing Content-Type is treated as
/// binary.
pub fn validate_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    match content_type {
        Some(ct) => {
            let ct_lower = ct.to_lowercase();
            if ALLOWED_MIME_PREFIXES
                .iter()
                .any(|prefix| ct_lower.starts_with(prefix))
            {
                Ok(())
            } else {
                Err(ApiError::bad_request(format!(
                    "Unsupported Content-Type: '{}'. Allowed types: image/*, application/octet-stream",
                    ct
                )))
            }
        }
        None => Ok(()),
    }
}

/// Validates the size of an uploaded file
///
/// Returns an error if the file exceeds the maximum size.
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ApiError> {
    if size > max_size {
        let max_mb = max_size / (1024 * 1024);
        let actual_mb = size / (1024 * 1024);
        Err(ApiError::bad_request(format!(
            "File too large: {} MB exceeds maximum of {} MB",
            actual_mb, max_mb
        )))
    } else {
        Ok(())
    }
}

/// Validates the shape of a passkey and returns it trimmed
///
/// Only the shape is checked here; whether the passkey belongs to an event is
/// decided by the event directory.
pub fn validate_passkey(passkey: Option<&str>) -> Result<&str, ApiError> {
    let passkey = passkey
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'passkey' field"))?;

    if passkey.len() > MAX_PASSKEY_LEN || passkey.chars().any(char::is_control) {
        return Err(smriti_core::SmritiError::InvalidPasskey.into());
    }
    Ok(passkey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content_type_image() {
        assert!(validate_content_type(Some("image/jpeg")).is_ok());
        assert!(validate_content_type(Some("image/png")).is_ok());
        assert!(validate_content_type(Some("image/heic")).is_ok());
        assert!(validate_content_type(Some("IMAGE/JPEG")).is_ok()); // case insensitive
    }

    #[test]
    fn test_validate_content_type_binary() {
        assert!(validate_content_type(Some("application/octet-stream")).is_ok());
        assert!(validate_content_type(None).is_ok());
    }

    #[test]
    fn test_validate_content_type_rejected() {
        assert!(validate_content_type(Some("video/mp4")).is_err());
        assert!(validate_content_type(Some("text/html")).is_err());
        assert!(validate_content_type(Some("application/json")).is_err());
    }

    #[test]
    fn test_validate_file_size() {
        let max = 10 * 1024 * 1024; // 10 MB
        assert!(validate_file_size(1024, max).is_ok());
        assert!(validate_file_size(max, max).is_ok()); // exactly max
        assert!(validate_file_size(max + 1, max).is_err());
    }

    #[test]
    fn test_validate_passkey() {
        assert_eq!(validate_passkey(Some("  guest-1 ")).unwrap(), "guest-1");
        assert!(validate_passkey(None).is_err());
        assert!(validate_passkey(Some("   ")).is_err());
        assert!(validate_passkey(Some("bad\u{0}key")).is_err());
        assert!(validate_passkey(Some(&"k".repeat(200))).is_err());
    }
}
