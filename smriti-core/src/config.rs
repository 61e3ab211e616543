//! Pipeline configuration.
//!
//! Values only: where the photos live, which collection to search, and the
//! tuning knobs for batching, concurrency and retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmritiError};
use crate::retry::RetryPolicy;

/// Default minimum similarity (percent) for a hit to count as a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 90.0;

/// Default candidates per scheduler step.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default concurrent recognition requests within one batch.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default identity tag for the searcher's reference face.
pub const DEFAULT_IDENTITY: &str = "selfie_user";

/// Default face collection id.
pub const DEFAULT_COLLECTION_ID: &str = "wedding_faces";

/// Default lifetime of a cached candidate listing.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(600);

/// Default lifetime of gallery display URLs.
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Default concurrent fetches while building an archive.
pub const DEFAULT_ARCHIVE_CONCURRENCY: usize = 4;

/// Configuration consumed by the search pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bucket holding the event photos.
    pub bucket: String,
    /// Key prefix of the candidate namespace.
    pub prefix: String,
    /// Face collection scoped to the event.
    pub collection_id: String,
    /// Identity tag attached to the reference face.
    pub identity: String,
    /// Minimum similarity percentage (0-100).
    pub match_threshold: f32,
    /// Candidates per scheduler step.
    pub batch_size: usize,
    /// Concurrent recognition requests per batch.
    pub concurrency: usize,
    /// Retry policy for throttled searches.
    pub retry: RetryPolicy,
    /// How long a candidate listing may be reused.
    pub listing_ttl: Duration,
    /// Concurrent object fetches while archiving.
    pub archive_concurrency: usize,
    /// Expiry of gallery display URLs.
    pub url_expiry: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            collection_id: DEFAULT_COLLECTION_ID.to_string(),
            identity: DEFAULT_IDENTITY.to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            listing_ttl: DEFAULT_LISTING_TTL,
            archive_concurrency: DEFAULT_ARCHIVE_CONCURRENCY,
            url_expiry: DEFAULT_URL_EXPIRY,
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl PipelineConfig {
    /// Create a configuration for a bucket and prefix with default tuning.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `S3_BUCKET_NAME`, `S3_WEDDING_PHOTOS_FOLDER`.
    /// Malformed tuning values fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        let bucket = std::env::var("S3_BUCKET_NAME").map_err(|_| {
            SmritiError::Config("S3_BUCKET_NAME environment variable not set".into())
        })?;
        let prefix = std::env::var("S3_WEDDING_PHOTOS_FOLDER").map_err(|_| {
            SmritiError::Config("S3_WEDDING_PHOTOS_FOLDER environment variable not set".into())
        })?;

        let defaults = Self::default();
        let retry = RetryPolicy {
            max_attempts: parsed("RETRY_MAX_ATTEMPTS").unwrap_or(defaults.retry.max_attempts),
            base_delay: parsed("RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
            max_delay: parsed("RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_delay),
            ..defaults.retry.clone()
        };

        let config = Self {
            bucket,
            prefix,
            collection_id: std::env::var("REKOGNITION_COLLECTION_ID")
                .unwrap_or(defaults.collection_id),
            identity: std::env::var("SELFIE_EXTERNAL_ID").unwrap_or(defaults.identity),
            match_threshold: parsed("FACE_MATCH_THRESHOLD").unwrap_or(defaults.match_threshold),
            batch_size: parsed("BATCH_SIZE").unwrap_or(defaults.batch_size),
            concurrency: parsed("MAX_WORKERS").unwrap_or(defaults.concurrency),
            retry,
            listing_ttl: parsed("LISTING_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.listing_ttl),
            archive_concurrency: defaults.archive_concurrency,
            url_expiry: defaults.url_expiry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(SmritiError::Config("bucket must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(SmritiError::Config("batch size must be at least 1".into()));
        }
        if self.concurrency == 0 || self.archive_concurrency == 0 {
            return Err(SmritiError::Config("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SmritiError::Config("retry attempts must be at least 1".into()));
        }
        if !(0.0..=100.0).contains(&self.match_threshold) {
            return Err(SmritiError::Config(format!(
                "match threshold {} outside 0-100",
                self.match_threshold
            )));
        }
        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = collection_id.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_listing_ttl(mut self, ttl: Duration) -> Self {
        self.listing_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("photos", "Wedding_images/abc");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.match_threshold, 90.0);
        assert_eq!(config.identity, "selfie_user");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = PipelineConfig::new("photos", "p");
        assert!(base.clone().with_batch_size(0).validate().is_err());
        assert!(base.clone().with_concurrency(0).validate().is_err());
        assert!(base.clone().with_threshold(120.0).validate().is_err());
        assert!(base
            .clone()
            .with_retry(RetryPolicy::immediate(0))
            .validate()
            .is_err());
        assert!(PipelineConfig::default().validate().is_err());
    }
}
