//! Match worker pool.
//!
//! Searches the reference collection for every candidate in a batch with
//! bounded parallelism. Each candidate is independent:
//!
//! - throttling is retried with the configured backoff, and a candidate that
//!   stays throttled is skipped
//! - an image the service cannot process is skipped
//! - any other error is systemic and fails the batch
//!
//! Skipped candidates count as "no match" and are reported back to the caller.
//! A collection is shared by every active search, so only hits tagged with the
//! searching identity count as matches.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::{Result, SmritiError};
use crate::recognition::{FaceRecognizer, RecognitionError};
use crate::retry::{retry_throttled, RetryPolicy};
use crate::store::ObjectLocation;

/// Matches requested per search. Other identities' faces may outrank the
/// searching identity's, so one hit per search is not enough.
pub const MAX_FACES_PER_SEARCH: u32 = 100;

/// Why a candidate was excluded without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Still throttled after the retry budget ran out.
    Throttled,
    /// The recognition service could not process the image.
    BadImage,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttled => write!(f, "throttled"),
            Self::BadImage => write!(f, "bad image"),
        }
    }
}

/// A candidate excluded from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub key: String,
    pub reason: SkipReason,
}

/// Result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Candidates confirmed to contain the reference face.
    pub matches: BTreeSet<String>,
    /// Candidates excluded after a per-image failure.
    pub skipped: Vec<SkippedCandidate>,
}

enum Verdict {
    Match,
    NoMatch,
    Skip(SkipReason),
}

/// Concurrent searcher for one bucket.
#[derive(Clone)]
pub struct MatchWorkerPool {
    recognizer: Arc<dyn FaceRecognizer>,
    bucket: String,
    threshold: f32,
    concurrency: usize,
    retry: RetryPolicy,
}

impl MatchWorkerPool {
    pub fn new(recognizer: Arc<dyn FaceRecognizer>, config: &PipelineConfig) -> Self {
        Self {
            recognizer,
            bucket: config.bucket.clone(),
            threshold: config.match_threshold,
            concurrency: config.concurrency.max(1),
            retry: config.retry.clone(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Search every candidate in `candidates` against `collection_id`, keeping
    /// the ones that contain `identity`'s reference face.
    ///
    /// All searches run to completion even when one of them fails; the first
    /// systemic error is then returned and the partial outcome discarded.
    #[instrument(skip(self, candidates), fields(batch = candidates.len()))]
    pub async fn match_batch(
        &self,
        candidates: &[String],
        collection_id: &str,
        identity: &str,
    ) -> Result<BatchOutcome> {
        let started = Instant::now();

        let verdicts: Vec<(String, Result<Verdict>)> = stream::iter(candidates.iter())
            .map(|key| async move {
                let verdict = self.match_one(key, collection_id, identity).await;
                (key.clone(), verdict)
            })
            .buffer_unordered(self.concurrency)
            .boxed()
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        let mut fatal: Option<SmritiError> = None;
        for (key, verdict) in verdicts {
            match verdict {
                Ok(Verdict::Match) => {
                    outcome.matches.insert(key);
                }
                Ok(Verdict::NoMatch) => {}
                Ok(Verdict::Skip(reason)) => {
                    outcome.skipped.push(SkippedCandidate { key, reason });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Systemic recognition failure");
                    fatal.get_or_insert(e);
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        outcome.skipped.sort_by(|a, b| a.key.cmp(&b.key));
        info!(
            matched = outcome.matches.len(),
            skipped = outcome.skipped.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );
        Ok(outcome)
    }

    async fn match_one(&self, key: &str, collection_id: &str, identity: &str) -> Result<Verdict> {
        let location = ObjectLocation::new(self.bucket.clone(), key);

        let searched = retry_throttled(&self.retry, "search_faces_by_image", || {
            self.recognizer.search_faces_by_image(
                collection_id,
                &location,
                self.threshold,
                MAX_FACES_PER_SEARCH,
            )
        })
        .await;

        match searched {
            Ok(hits) => match hits
                .iter()
                .find(|hit| hit.external_id.as_deref() == Some(identity))
            {
                Some(hit) => {
                    debug!(key, similarity = hit.similarity, "Face matched");
                    Ok(Verdict::Match)
                }
                None => Ok(Verdict::NoMatch),
            },
            Err(RecognitionError::Throttled(msg)) => {
                warn!(key, error = %msg, "Retries exhausted, skipping candidate");
                Ok(Verdict::Skip(SkipReason::Throttled))
            }
            Err(RecognitionError::BadImage(msg)) => {
                warn!(key, error = %msg, "Unprocessable image, skipping candidate");
                Ok(Verdict::Skip(SkipReason::BadImage))
            }
            Err(e) => Err(e.into()),
        }
    }
}
