//! Result archiving.
//!
//! Packs the matched photos into one deflate-compressed zip for bulk
//! download. Members are named after the key's base name; a fetch failure
//! drops that member and is reported, it never fails the archive.

use std::collections::HashSet;
use std::io::{Cursor, Seek, Write};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Result, SmritiError};
use crate::store::ObjectStore;

/// File name offered for the downloaded archive.
pub const ARCHIVE_FILE_NAME: &str = "smriti_matched_moments.zip";

/// A finished archive.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    /// Zip bytes.
    pub bytes: Vec<u8>,
    /// Member names written, in archive order.
    pub added: Vec<String>,
    /// Keys that could not be fetched.
    pub skipped: Vec<String>,
}

/// Members written by [`ResultArchiver::write_archive`].
#[derive(Debug)]
pub struct ArchiveWritten<W> {
    /// The finished archive's sink.
    pub sink: W,
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

/// Base name of a key: everything after the last `/`.
pub fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Pick a member name for `key` that is not in `used` yet.
///
/// Duplicates get ` (n)` inserted before the extension: `IMG_1.jpg`,
/// `IMG_1 (2).jpg`, `IMG_1 (3).jpg`.
fn unique_member_name(key: &str, used: &mut HashSet<String>) -> String {
    let base = match base_name(key) {
        "" => "photo",
        name => name,
    };
    if used.insert(base.to_string()) {
        return base.to_string();
    }

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };
    (2..)
        .map(|n| match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        })
        .find(|candidate| used.insert(candidate.clone()))
        .unwrap_or_else(|| base.to_string())
}

/// Builds zip archives of matched objects.
#[derive(Clone)]
pub struct ResultArchiver {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    concurrency: usize,
}

impl ResultArchiver {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, concurrency: usize) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every key and write it into an in-memory zip, in the order given.
    pub async fn build_archive(&self, keys: &[String]) -> Result<ArchiveOutcome> {
        let written = self.write_archive(keys, Cursor::new(Vec::new())).await?;
        Ok(ArchiveOutcome {
            bytes: written.sink.into_inner(),
            added: written.added,
            skipped: written.skipped,
        })
    }

    /// Fetch every key and write it into a zip on `sink`, in the order given.
    ///
    /// Members are written as their fetches complete, so at most
    /// `concurrency` photos are held in memory at once.
    #[instrument(skip(self, keys, sink), fields(requested = keys.len()))]
    pub async fn write_archive<W>(&self, keys: &[String], sink: W) -> Result<ArchiveWritten<W>>
    where
        W: Write + Seek + Send,
    {
        let mut fetched = stream::iter(keys.iter())
            .map(|key| async move {
                let bytes = self.store.get_object(&self.bucket, key).await;
                (key, bytes)
            })
            .buffered(self.concurrency)
            .boxed();

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(sink);
        let mut used = HashSet::new();
        let mut added = Vec::new();
        let mut skipped = Vec::new();

        while let Some((key, bytes)) = fetched.next().await {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key = %key, error = %e, "Could not fetch photo, leaving it out");
                    skipped.push(key.clone());
                    continue;
                }
            };
            let name = unique_member_name(key, &mut used);
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| SmritiError::Archive(format!("start {name}: {e}")))?;
            writer
                .write_all(&bytes)
                .map_err(|e| SmritiError::Archive(format!("write {name}: {e}")))?;
            added.push(name);
        }

        let sink = writer
            .finish()
            .map_err(|e| SmritiError::Archive(e.to_string()))?;

        info!(added = added.len(), skipped = skipped.len(), "Archive built");
        Ok(ArchiveWritten {
            sink,
            added,
            skipped,
        })
    }
}
