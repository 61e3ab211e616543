//! Object store collaborator.
//!
//! Photos live in a remote content-addressable blob store. The pipeline only
//! needs to page through keys under a prefix, fetch bytes, check existence,
//! write new objects and mint time-limited read URLs.

mod memory;
#[cfg(feature = "aws")]
mod s3;

pub use memory::InMemoryObjectStore;
#[cfg(feature = "aws")]
pub use s3::S3ObjectStore;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Address of one object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Continuation token, `None` on the last page.
    pub next: Option<String>,
}

/// Capability interface for the object store.
///
/// No read-after-write guarantee is assumed: a freshly written key may be
/// missing from the next listing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys under `prefix`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage>;

    /// Fetch an object's bytes.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Whether an object exists under `key`.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Write an object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Time-limited read URL for displaying an object.
    async fn presigned_get_url(&self, bucket: &str, key: &str, expires_in: Duration)
        -> Result<String>;
}
