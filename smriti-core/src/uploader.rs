//! Owner-side photo upload.
//!
//! Writes photos under an event prefix without overwriting anything already
//! there: when a key is taken the new photo gets a short random suffix.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SmritiError};
use crate::lister::ListingCache;
use crate::store::ObjectStore;

/// Extensions accepted for upload, matched case-insensitively.
pub const UPLOAD_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "raw", "cr2", "dng", "nef", "tif", "tiff", "webp",
];

/// Content type for an upload extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "dng" => "image/x-adobe-dng",
        "cr2" => "image/x-canon-cr2",
        "nef" => "image/x-nikon-nef",
        _ => "application/octet-stream",
    }
}

/// Strip any client-supplied directories and check the extension.
///
/// Returns the bare file name and its extension.
pub fn validate_upload_name(filename: &str) -> Result<(String, String)> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name.starts_with('.') {
        return Err(SmritiError::UnsupportedUpload(format!(
            "invalid file name: {filename:?}"
        )));
    }
    let Some((_, ext)) = name.rsplit_once('.') else {
        return Err(SmritiError::UnsupportedUpload(format!(
            "{name} has no file extension"
        )));
    };
    if !UPLOAD_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    {
        return Err(SmritiError::UnsupportedUpload(format!(
            "{name}: .{ext} files are not accepted"
        )));
    }
    Ok((name.to_string(), ext.to_string()))
}

fn suffixed(name: &str) -> String {
    let tag = hex::encode(&Uuid::new_v4().as_bytes()[..3]);
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{tag}.{ext}"),
        None => format!("{name}-{tag}"),
    }
}

/// Outcome of uploading one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// File name as submitted.
    pub filename: String,
    /// Key written, when the upload succeeded.
    pub key: Option<String>,
    /// Failure message, when it did not.
    pub error: Option<String>,
}

/// Summary of a multi-file upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
    pub files: Vec<UploadResult>,
}

/// Uploads photos into a bucket.
#[derive(Clone)]
pub struct PhotoUploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl PhotoUploader {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Key under `prefix` for `name` that does not exist yet.
    pub async fn unique_key(&self, prefix: &str, name: &str) -> Result<String> {
        let join = |name: &str| match prefix.trim_end_matches('/') {
            "" => name.to_string(),
            dir => format!("{dir}/{name}"),
        };
        let key = join(name);
        if !self.store.object_exists(&self.bucket, &key).await? {
            return Ok(key);
        }
        Ok(join(&suffixed(name)))
    }

    /// Upload one photo under `prefix`. Returns the key written.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn upload(
        &self,
        prefix: &str,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let (name, ext) = validate_upload_name(filename)?;
        if bytes.is_empty() {
            return Err(SmritiError::UnsupportedUpload(format!("{name} is empty")));
        }
        let key = self.unique_key(prefix, &name).await?;
        let content_type = content_type
            .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
            .unwrap_or_else(|| content_type_for(&ext));

        self.store
            .put_object(&self.bucket, &key, bytes, Some(content_type))
            .await?;
        info!(key = %key, "Uploaded photo");
        Ok(key)
    }

    /// Upload several photos, continuing past individual failures, then drop
    /// the cached listing for `prefix` when anything was written.
    pub async fn upload_all(
        &self,
        prefix: &str,
        files: Vec<(String, Vec<u8>, Option<String>)>,
        cache: Option<&ListingCache>,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        for (filename, bytes, content_type) in files {
            match self
                .upload(prefix, &filename, bytes, content_type.as_deref())
                .await
            {
                Ok(key) => {
                    report.uploaded += 1;
                    report.files.push(UploadResult {
                        filename,
                        key: Some(key),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Upload failed");
                    report.failed += 1;
                    report.files.push(UploadResult {
                        filename,
                        key: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if report.uploaded > 0 {
            if let Some(cache) = cache {
                cache.invalidate(&self.bucket, prefix);
            }
        }
        report
    }
}
