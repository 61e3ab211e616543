//! Batch scheduler.
//!
//! Drives one search from a reference selfie to an exhausted candidate list,
//! one fixed-size batch per [`BatchScheduler::step`]. All state lives in the
//! [`SearchProgress`] the caller passes in, so the process may exit between
//! steps and pick up again from a persisted snapshot.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::directory::EventScope;
use crate::error::{Result, SmritiError};
use crate::lister::{ListingCache, ObjectLister};
use crate::matcher::{MatchWorkerPool, SkippedCandidate};
use crate::progress::{SearchNotice, SearchProgress, SearchState};
use crate::recognition::FaceRecognizer;
use crate::registrar::ReferenceRegistrar;
use crate::store::ObjectStore;

/// What one scheduler step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Candidates processed in this step.
    pub processed: usize,
    /// Matches this step added to the match set.
    pub new_matches: Vec<String>,
    /// Candidates this step excluded.
    pub skipped: Vec<SkippedCandidate>,
    pub cursor: usize,
    pub total: usize,
    pub state: SearchState,
}

impl StepReport {
    fn idle(progress: &SearchProgress) -> Self {
        Self {
            processed: 0,
            new_matches: Vec::new(),
            skipped: Vec::new(),
            cursor: progress.cursor,
            total: progress.total(),
            state: progress.state,
        }
    }
}

/// Orchestrates registration, listing and batched matching.
pub struct BatchScheduler {
    config: PipelineConfig,
    lister: ObjectLister,
    cache: ListingCache,
    registrar: ReferenceRegistrar,
    pool: MatchWorkerPool,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn FaceRecognizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            lister: ObjectLister::new(store),
            cache: ListingCache::new(config.listing_ttl),
            registrar: ReferenceRegistrar::new(recognizer.clone(), config.retry.clone()),
            pool: MatchWorkerPool::new(recognizer, &config),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn listing_cache(&self) -> &ListingCache {
        &self.cache
    }

    pub fn worker_pool(&self) -> &MatchWorkerPool {
        &self.pool
    }

    /// Start a search over the configured prefix and collection.
    pub async fn prepare(&self, reference: &[u8]) -> Result<SearchProgress> {
        let scope = EventScope::new(self.config.prefix.clone(), self.config.collection_id.clone());
        self.prepare_scoped(&scope, reference).await
    }

    /// Start a search for one event under the configured identity.
    pub async fn prepare_scoped(&self, scope: &EventScope, reference: &[u8]) -> Result<SearchProgress> {
        self.prepare_as(scope, &self.config.identity, reference).await
    }

    /// Start a search for one event under `identity`.
    ///
    /// Registers the reference face (replacing any previous one for the same
    /// identity) and snapshots the candidate list. Searches that run side by
    /// side against one collection need distinct identities. A listing failure
    /// releases the face again before the error is returned. A selfie without a face
    /// yields an `Idle` progress carrying [`SearchNotice::NoFaceDetected`]; an
    /// event without photos yields an `Exhausted` one carrying
    /// [`SearchNotice::NothingToSearch`]. Other failures are returned as errors.
    #[instrument(skip(self, reference), fields(collection = %scope.collection_id, prefix = %scope.prefix))]
    pub async fn prepare_as(
        &self,
        scope: &EventScope,
        identity: &str,
        reference: &[u8],
    ) -> Result<SearchProgress> {
        let started = Instant::now();
        let mut progress = SearchProgress::new(
            self.config.bucket.clone(),
            scope.prefix.clone(),
            scope.collection_id.clone(),
            identity.to_string(),
        );

        let registered = self
            .registrar
            .replace_reference(&scope.collection_id, identity, reference)
            .await?;
        if !registered {
            progress.abandon(SearchNotice::NoFaceDetected);
            return Ok(progress);
        }

        let candidates = match self
            .cache
            .get_or_list(&self.lister, &self.config.bucket, &scope.prefix)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                // Nothing will search with the face just registered.
                if let Err(purge) = self.release(&progress).await {
                    warn!(error = %purge, "Failed to release reference face");
                }
                return Err(e);
            }
        };
        progress.begin(candidates.as_ref().clone());

        info!(
            candidates = progress.total(),
            batches = progress.total().div_ceil(self.config.batch_size.max(1)),
            latency_ms = started.elapsed().as_millis() as u64,
            "Search prepared"
        );
        Ok(progress)
    }

    /// Process the next batch.
    ///
    /// Exhausted searches are left untouched. A fatal batch error moves the
    /// search to `Idle` without advancing the cursor; the same batch is
    /// retried after [`SearchProgress::resume`].
    #[instrument(skip(self, progress), fields(cursor = progress.cursor, total = progress.total()))]
    pub async fn step(&self, progress: &mut SearchProgress) -> Result<StepReport> {
        match progress.state {
            SearchState::Searching => {}
            SearchState::Exhausted => return Ok(StepReport::idle(progress)),
            other => return Err(SmritiError::SearchNotActive(other.to_string())),
        }

        let batch = progress.next_slice(self.config.batch_size).to_vec();
        let outcome = match self
            .pool
            .match_batch(&batch, &progress.collection_id, &progress.identity)
            .await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Batch failed, search stopped");
                progress.fail(&e);
                return Err(e);
            }
        };

        let new_matches: Vec<String> = outcome
            .matches
            .iter()
            .filter(|key| !progress.matches.contains(*key))
            .cloned()
            .collect();
        let skipped = outcome.skipped.clone();
        progress.record_batch(batch.len(), outcome);

        info!(
            processed = batch.len(),
            new_matches = new_matches.len(),
            total_matches = progress.matches.len(),
            cursor = progress.cursor,
            state = %progress.state,
            "Step complete"
        );

        Ok(StepReport {
            processed: batch.len(),
            new_matches,
            skipped,
            cursor: progress.cursor,
            total: progress.total(),
            state: progress.state,
        })
    }

    /// Remove the search's reference face from its collection. Returns how
    /// many faces were deleted.
    #[instrument(skip(self, progress), fields(collection = %progress.collection_id, identity = %progress.identity))]
    pub async fn release(&self, progress: &SearchProgress) -> Result<usize> {
        self.registrar
            .purge_identity(&progress.collection_id, &progress.identity)
            .await
    }

    /// Step until the search is exhausted. Returns the number of steps taken.
    pub async fn run_to_completion(&self, progress: &mut SearchProgress) -> Result<usize> {
        let mut steps = 0;
        while progress.state == SearchState::Searching {
            self.step(progress).await?;
            steps += 1;
        }
        Ok(steps)
    }
}
