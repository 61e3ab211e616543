//! Resumable search progress.
//!
//! A [`SearchProgress`] is a self-contained snapshot of one search: the
//! candidate list it runs over, the cursor of the next unprocessed candidate
//! and the matches found so far. It is passed into and returned from every
//! scheduler step and persisted by the caller between invocations, either as
//! CBOR bytes or as a URL-safe base64 token.

use std::collections::BTreeSet;
use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmritiError, CURRENT_PROGRESS_VERSION};
use crate::matcher::BatchOutcome;

/// Largest progress snapshot accepted for decoding (16 MiB).
pub const MAX_PROGRESS_SIZE: usize = 16 * 1024 * 1024;

/// Lifecycle of a search.
///
/// `Idle -> Preparing -> Searching -> Exhausted`, with `Preparing` and
/// `Searching` falling back to `Idle` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Preparing,
    Searching,
    Exhausted,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Searching => "searching",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// User-facing guidance attached to a search that could not run normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchNotice {
    /// The selfie contained no detectable face.
    NoFaceDetected,
    /// The event has no photos to search.
    NothingToSearch,
}

impl SearchNotice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoFaceDetected => {
                "No face was detected in your photo. Please upload a clear, front-facing selfie."
            }
            Self::NothingToSearch => "There are no photos to search in this event yet.",
        }
    }
}

/// Snapshot of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Snapshot format version.
    pub version: u8,
    pub bucket: String,
    pub prefix: String,
    pub collection_id: String,
    pub identity: String,
    /// Candidate keys, sorted, fixed for the lifetime of the search.
    pub candidates: Vec<String>,
    /// Offset of the next unprocessed candidate.
    pub cursor: usize,
    /// Matches so far. Only ever grows.
    pub matches: BTreeSet<String>,
    /// Candidates excluded after per-image failures.
    pub skipped: usize,
    pub state: SearchState,
    pub notice: Option<SearchNotice>,
    /// Message of the last fatal error, cleared on resume.
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchProgress {
    /// Fresh progress in `Preparing` over no candidates yet.
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        collection_id: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: CURRENT_PROGRESS_VERSION,
            bucket: bucket.into(),
            prefix: prefix.into(),
            collection_id: collection_id.into(),
            identity: identity.into(),
            candidates: Vec::new(),
            cursor: 0,
            matches: BTreeSet::new(),
            skipped: 0,
            state: SearchState::Preparing,
            notice: None,
            last_error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Start searching over `candidates`. An empty list is exhausted at once.
    pub fn begin(&mut self, mut candidates: Vec<String>) {
        candidates.sort_unstable();
        candidates.dedup();
        self.candidates = candidates;
        self.cursor = 0;
        self.matches.clear();
        self.skipped = 0;
        self.last_error = None;
        if self.candidates.is_empty() {
            self.state = SearchState::Exhausted;
            self.notice = Some(SearchNotice::NothingToSearch);
        } else {
            self.state = SearchState::Searching;
            self.notice = None;
        }
        self.touch();
    }

    /// Return to `Idle` with a user-facing notice.
    pub fn abandon(&mut self, notice: SearchNotice) {
        self.state = SearchState::Idle;
        self.notice = Some(notice);
        self.touch();
    }

    pub fn total(&self) -> usize {
        self.candidates.len()
    }

    pub fn remaining(&self) -> usize {
        self.total().saturating_sub(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == SearchState::Exhausted
    }

    /// Percentage of candidates processed.
    pub fn percent_complete(&self) -> f64 {
        if self.total() == 0 {
            return 100.0;
        }
        self.cursor.min(self.total()) as f64 * 100.0 / self.total() as f64
    }

    /// The next `batch_size` unprocessed candidates (shorter at the end).
    pub fn next_slice(&self, batch_size: usize) -> &[String] {
        let start = self.cursor.min(self.total());
        let end = start.saturating_add(batch_size.max(1)).min(self.total());
        &self.candidates[start..end]
    }

    /// Fold a finished batch of `processed` candidates into the snapshot.
    pub fn record_batch(&mut self, processed: usize, outcome: BatchOutcome) {
        self.matches.extend(outcome.matches);
        self.skipped += outcome.skipped.len();
        self.cursor = (self.cursor + processed).min(self.total());
        if self.cursor >= self.total() {
            self.state = SearchState::Exhausted;
        }
        self.touch();
    }

    /// A fatal error stopped the search. Cursor and matches are kept.
    pub fn fail(&mut self, error: &SmritiError) {
        self.state = SearchState::Idle;
        self.last_error = Some(error.to_string());
        self.touch();
    }

    /// Pick a failed search back up where it stopped.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            SearchState::Searching => Ok(()),
            SearchState::Idle if self.cursor < self.total() => {
                self.state = SearchState::Searching;
                self.last_error = None;
                self.touch();
                Ok(())
            }
            SearchState::Idle if !self.candidates.is_empty() => {
                self.state = SearchState::Exhausted;
                self.last_error = None;
                self.touch();
                Ok(())
            }
            other => Err(SmritiError::SearchNotActive(other.to_string())),
        }
    }

    /// Matches in presentation order.
    pub fn sorted_matches(&self) -> Vec<String> {
        self.matches.iter().cloned().collect()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Serialize to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| SmritiError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR bytes, rejecting unknown versions.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PROGRESS_SIZE {
            return Err(SmritiError::Serialization(format!(
                "progress snapshot too large: {} bytes (max {MAX_PROGRESS_SIZE})",
                bytes.len()
            )));
        }
        let progress: Self =
            ciborium::from_reader(bytes).map_err(|e| SmritiError::Serialization(e.to_string()))?;
        if progress.version != CURRENT_PROGRESS_VERSION {
            return Err(SmritiError::UnsupportedProgressVersion(
                progress.version,
                CURRENT_PROGRESS_VERSION,
            ));
        }
        Ok(progress)
    }

    /// Encode as an opaque URL-safe token.
    pub fn to_token(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_cbor()?))
    }

    pub fn from_token(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| SmritiError::Serialization(format!("invalid progress token: {e}")))?;
        Self::from_cbor(&bytes)
    }
}
