//! Exit codes following sysexits.h conventions.
//!
//! These codes give scripts a way to tell a bad selfie from an unreachable
//! service without parsing messages.

use smriti_core::SmritiError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments, missing configuration,
/// search not running).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (no face in the selfie, unusable image, corrupt
/// progress file).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (object store, recognition service).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const SERVICE_UNAVAILABLE: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Pipeline errors carry their own class; fall back to the context text
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<SmritiError>())
            .map(code_for)
            .unwrap_or_else(|| {
                if message.contains("Failed to read") {
                    INPUT_ERROR
                } else if message.contains("Failed to write") {
                    IO_ERROR
                } else {
                    GENERAL_ERROR
                }
            });

        Self {
            code,
            message: Some(message),
        }
    }
}

fn code_for(err: &SmritiError) -> i32 {
    match err {
        SmritiError::Config(_) | SmritiError::SearchNotActive(_) | SmritiError::InvalidPasskey => {
            USAGE_ERROR
        }
        SmritiError::NoFaceDetected
        | SmritiError::InvalidReference(_)
        | SmritiError::InvalidImage(_)
        | SmritiError::UnsupportedUpload(_)
        | SmritiError::UnsupportedProgressVersion(_, _)
        | SmritiError::Serialization(_) => DATA_ERROR,
        SmritiError::Storage(_)
        | SmritiError::Listing { .. }
        | SmritiError::Recognition(_)
        | SmritiError::Throttled(_)
        | SmritiError::CollectionNotFound(_)
        | SmritiError::Directory(_) => SERVICE_UNAVAILABLE,
        SmritiError::Archive(_) => IO_ERROR,
    }
}
