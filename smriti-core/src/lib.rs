//! Smriti Core - batched face-match pipeline over object storage
//!
//! Given a guest's selfie and an event's photo collection in object storage,
//! find every photo the guest appears in using an external face recognition
//! service.
//!
//! # Pipeline
//!
//! - [`ObjectLister`] enumerates candidate photos under the event prefix
//! - [`ReferenceRegistrar`] replaces the guest's reference face in the event's
//!   face collection
//! - [`MatchWorkerPool`] searches one batch of candidates with bounded
//!   concurrency, retrying throttled calls and skipping unprocessable images
//! - [`BatchScheduler`] drives the search one batch at a time over a
//!   resumable [`SearchProgress`]
//! - [`ResultArchiver`] packs the matches into a zip
//!
//! The object store and the recognition service are reached through the
//! [`ObjectStore`] and [`FaceRecognizer`] traits. AWS implementations live
//! behind the `aws` feature; in-memory fakes are always available.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use smriti_core::{BatchScheduler, InMemoryObjectStore, MockRecognizer, PipelineConfig};
//!
//! # async fn example(selfie: Vec<u8>) -> smriti_core::Result<()> {
//! let store = Arc::new(InMemoryObjectStore::new());
//! let recognizer = Arc::new(MockRecognizer::new());
//! let config = PipelineConfig::new("photos", "Wedding_images/asha");
//!
//! let scheduler = BatchScheduler::new(store, recognizer, config);
//! let mut progress = scheduler.prepare(&selfie).await?;
//! while !progress.is_exhausted() {
//!     let report = scheduler.step(&mut progress).await?;
//!     println!("{}/{} searched", report.cursor, report.total);
//! }
//! println!("found {} photos", progress.matches.len());
//! # Ok(())
//! # }
//! ```

pub mod archive;
#[cfg(feature = "aws")]
pub mod aws;
pub mod config;
pub mod directory;
pub mod error;
pub mod gallery;
pub mod lister;
pub mod matcher;
pub mod progress;
pub mod recognition;
pub mod registrar;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod uploader;

// Re-export main types for convenience
pub use archive::{ArchiveOutcome, ArchiveWritten, ResultArchiver, ARCHIVE_FILE_NAME};
#[cfg(feature = "aws")]
pub use aws::AwsConfig;
pub use config::PipelineConfig;
pub use directory::{EventDirectory, EventScope, StaticEventDirectory};
pub use error::{Result, SmritiError, CURRENT_PROGRESS_VERSION};
pub use gallery::{matched_links, GalleryLink};
pub use lister::{ListingCache, ObjectLister};
pub use matcher::{BatchOutcome, MatchWorkerPool, SkipReason, SkippedCandidate};
pub use progress::{SearchNotice, SearchProgress, SearchState};
pub use recognition::{FaceRecognizer, MockRecognizer, RecognitionError};
#[cfg(feature = "aws")]
pub use recognition::RekognitionRecognizer;
pub use registrar::ReferenceRegistrar;
pub use retry::RetryPolicy;
pub use scheduler::{BatchScheduler, StepReport};
pub use store::{InMemoryObjectStore, ObjectLocation, ObjectStore};
#[cfg(feature = "aws")]
pub use store::S3ObjectStore;
pub use uploader::{PhotoUploader, UploadReport, UploadResult};
