//! Common utility functions shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use smriti_core::{
    AwsConfig, BatchScheduler, ObjectStore, PipelineConfig, RekognitionRecognizer, S3ObjectStore,
    SearchProgress,
};
use tracing::debug;

/// Service clients built from the environment.
pub struct Pipeline {
    pub config: PipelineConfig,
    pub store: Arc<dyn ObjectStore>,
    pub scheduler: BatchScheduler,
}

/// Read `PipelineConfig` from the environment and connect to AWS.
pub async fn connect(config: PipelineConfig) -> Result<Pipeline> {
    let sdk_config = AwsConfig::from_env().load().await;
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&sdk_config));
    let recognizer = Arc::new(RekognitionRecognizer::new(&sdk_config));
    debug!(bucket = %config.bucket, prefix = %config.prefix, "Connected to AWS");

    let scheduler = BatchScheduler::new(store.clone(), recognizer, config.clone());
    Ok(Pipeline {
        config,
        store,
        scheduler,
    })
}

/// Pipeline configuration from the environment.
pub fn load_config() -> Result<PipelineConfig> {
    PipelineConfig::from_env().context("Invalid configuration")
}

/// Pipeline configuration for continuing `progress`, which fixes the bucket.
pub fn config_for(progress: &SearchProgress) -> Result<PipelineConfig> {
    let mut config = load_config()?;
    config.bucket = progress.bucket.clone();
    config.prefix = progress.prefix.clone();
    config.collection_id = progress.collection_id.clone();
    config.identity = progress.identity.clone();
    Ok(config)
}

/// Load a saved search.
pub fn load_progress(path: &Path) -> Result<SearchProgress> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read progress file: {}", path.display()))?;
    let progress = SearchProgress::from_cbor(&bytes)
        .with_context(|| format!("Failed to parse progress file: {}", path.display()))?;
    debug!(path = %path.display(), cursor = progress.cursor, "Loaded progress");
    Ok(progress)
}

/// Save a search, replacing the file atomically.
pub fn save_progress(path: &Path, progress: &SearchProgress) -> Result<()> {
    let bytes = progress
        .to_cbor()
        .context("Failed to serialize progress")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("Failed to write progress file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to write progress file: {}", path.display()))?;
    debug!(path = %path.display(), cursor = progress.cursor, "Saved progress");
    Ok(())
}

/// Format a timestamp in the local timezone.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string()
}

/// Text progress bar, e.g. `[#####.....]`.
pub fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.cbor");
        let mut progress = SearchProgress::new("photos", "event/", "faces", "selfie_user");
        progress.begin(vec!["event/a.jpg".into(), "event/b.jpg".into()]);

        save_progress(&path, &progress).unwrap();
        let loaded = load_progress(&path).unwrap();

        assert_eq!(loaded.candidates, progress.candidates);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_progress_file() {
        let err = load_progress(Path::new("/nonexistent/search.cbor")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read progress file"));
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 4), "[....]");
        assert_eq!(progress_bar(50.0, 4), "[##..]");
        assert_eq!(progress_bar(100.0, 4), "[####]");
    }
}
