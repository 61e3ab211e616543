//! Face recognition service collaborator.
//!
//! The pipeline never detects or compares faces itself. It talks to a
//! recognition service that keeps named collections of indexed faces and can
//! search a collection for faces appearing in an image stored in the object
//! store.
//!
//! - **Rekognition** - AWS Rekognition (production, `aws` feature)
//! - **Mock** - in-memory collections with scripted outcomes for tests

mod mock;
#[cfg(feature = "aws")]
mod rekognition;

pub use mock::MockRecognizer;
#[cfg(feature = "aws")]
pub use rekognition::RekognitionRecognizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::ObjectLocation;

/// Largest batch a single `delete_faces` call accepts.
pub const MAX_DELETE_BATCH: usize = 100;

/// Error classes the recognition service distinguishes.
///
/// The pipeline's retry and skip decisions are made on these classes alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Request rate exceeded; retrying later may succeed.
    #[error("throttled: {0}")]
    Throttled(String),

    /// The named collection (or another resource) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The image cannot be processed (corrupt, unsupported format, too large).
    #[error("bad image: {0}")]
    BadImage(String),

    /// Anything else: credentials, malformed ids, service faults.
    #[error("{0}")]
    Other(String),
}

impl RecognitionError {
    /// Classify a service error code into one of the four classes.
    pub fn from_code(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(
                "ThrottlingException"
                | "ProvisionedThroughputExceededException"
                | "LimitExceededException",
            ) => Self::Throttled(message),
            Some("ResourceNotFoundException") => Self::NotFound(message),
            Some(
                "InvalidImageFormatException"
                | "ImageTooLargeException"
                | "InvalidS3ObjectException",
            ) => Self::BadImage(message),
            _ => Self::Other(message),
        }
    }
}

pub type RecognitionResult<T> = std::result::Result<T, RecognitionError>;

/// A face stored in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFace {
    /// Service-assigned face id.
    pub face_id: String,
    /// Identity tag attached when the face was indexed.
    pub external_id: Option<String>,
}

/// One page of a collection listing.
#[derive(Debug, Clone, Default)]
pub struct FacePage {
    pub faces: Vec<IndexedFace>,
    /// Token for the next page, `None` on the last page.
    pub next: Option<String>,
}

/// A hit returned by a collection search.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub face_id: String,
    pub external_id: Option<String>,
    /// Similarity percentage (0-100).
    pub similarity: f32,
}

/// Capability interface for the recognition service.
///
/// Implementations must be thread-safe (`Send + Sync`): a batch issues many
/// searches concurrently against the same client.
#[async_trait]
pub trait FaceRecognizer: Send + Sync {
    /// Succeeds when the collection exists, `NotFound` when it does not.
    async fn describe_collection(&self, collection_id: &str) -> RecognitionResult<()>;

    /// Create an empty collection.
    async fn create_collection(&self, collection_id: &str) -> RecognitionResult<()>;

    /// List one page of indexed faces.
    async fn list_faces(
        &self,
        collection_id: &str,
        next: Option<String>,
    ) -> RecognitionResult<FacePage>;

    /// Delete up to [`MAX_DELETE_BATCH`] faces.
    async fn delete_faces(&self, collection_id: &str, face_ids: &[String])
        -> RecognitionResult<()>;

    /// Index the most prominent face in `image`, tagged with `external_id`.
    ///
    /// Detection is capped to one face and low-quality faces are filtered out,
    /// so the result holds zero or one entries.
    async fn index_face(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
    ) -> RecognitionResult<Vec<IndexedFace>>;

    /// Search the collection for faces present in the stored image.
    async fn search_faces_by_image(
        &self,
        collection_id: &str,
        image: &ObjectLocation,
        threshold: f32,
        max_faces: u32,
    ) -> RecognitionResult<Vec<FaceMatch>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_classification() {
        assert!(matches!(
            RecognitionError::from_code(Some("ThrottlingException"), "slow down"),
            RecognitionError::Throttled(_)
        ));
        assert!(matches!(
            RecognitionError::from_code(Some("ProvisionedThroughputExceededException"), ""),
            RecognitionError::Throttled(_)
        ));
        assert!(matches!(
            RecognitionError::from_code(Some("ResourceNotFoundException"), ""),
            RecognitionError::NotFound(_)
        ));
        assert!(matches!(
            RecognitionError::from_code(Some("ImageTooLargeException"), ""),
            RecognitionError::BadImage(_)
        ));
        assert!(matches!(
            RecognitionError::from_code(Some("AccessDeniedException"), ""),
            RecognitionError::Other(_)
        ));
        assert!(matches!(
            RecognitionError::from_code(None, "dispatch failure"),
            RecognitionError::Other(_)
        ));
    }
}
