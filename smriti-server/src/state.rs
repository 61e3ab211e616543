//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use smriti_core::{
    BatchScheduler, EventDirectory, FaceRecognizer, ObjectStore, PhotoUploader, PipelineConfig,
    ResultArchiver, SearchProgress,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::validation::DEFAULT_MAX_FILE_SIZE;

/// One guest's search, locked while a batch runs.
pub type SearchSession = Arc<Mutex<SearchProgress>>;

/// Idle time after which a search is dropped (1 hour)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Identity under which a session's reference face is registered
pub fn session_identity(search_id: &Uuid) -> String {
    format!("guest_{}", search_id.simple())
}

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Pipeline driver (registrar, worker pool, listing cache)
    pub scheduler: Arc<BatchScheduler>,
    /// Photo storage, used for gallery links
    pub store: Arc<dyn ObjectStore>,
    /// Zip packaging of matched photos
    pub archiver: Arc<ResultArchiver>,
    /// Owner-side photo uploads
    pub uploader: Arc<PhotoUploader>,
    /// Passkey to event lookup
    pub directory: Arc<dyn EventDirectory>,
    /// Active searches by session id
    pub sessions: Arc<DashMap<Uuid, SearchSession>>,
    /// Maximum accepted size per uploaded file in bytes
    pub max_file_size: usize,
    /// Idle time after which a search is dropped and its face released
    pub session_ttl: Duration,
}

impl AppState {
    /// Wire the pipeline components over one object store and recognizer.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn FaceRecognizer>,
        directory: Arc<dyn EventDirectory>,
        pipeline: PipelineConfig,
    ) -> Self {
        let archiver = ResultArchiver::new(
            store.clone(),
            pipeline.bucket.clone(),
            pipeline.archive_concurrency,
        );
        let uploader = PhotoUploader::new(store.clone(), pipeline.bucket.clone());
        let scheduler = BatchScheduler::new(store.clone(), recognizer, pipeline);

        Self {
            scheduler: Arc::new(scheduler),
            store,
            archiver: Arc::new(archiver),
            uploader: Arc::new(uploader),
            directory,
            sessions: Arc::new(DashMap::new()),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    /// Override the per-file upload limit
    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Override how long an untouched search is kept
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Look up an active search
    pub fn session(&self, id: &Uuid) -> Option<SearchSession> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Drop a search's reference face from its collection, logging failures
    pub async fn release_face(&self, progress: &SearchProgress) {
        if let Err(e) = self.scheduler.release(progress).await {
            tracing::warn!(
                identity = %progress.identity,
                error = %e,
                "Failed to release reference face"
            );
        }
    }

    /// Remove searches not updated within the TTL and release their faces.
    /// A search with a batch in flight is kept. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(self.session_ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let mut expired = Vec::new();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(progress) if progress.updated_at <= cutoff => {
                expired.push(progress.clone());
                false
            }
            _ => true,
        });

        for progress in &expired {
            self.release_face(progress).await;
        }
        if !expired.is_empty() {
            tracing::info!(removed = expired.len(), "Expired idle searches");
        }
        expired.len()
    }

    /// Run [`AppState::cleanup_expired`] every `every` until the task is aborted
    pub fn spawn_session_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                state.cleanup_expired().await;
            }
        })
    }
}
