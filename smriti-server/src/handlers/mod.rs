//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod photos;
pub mod search;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use photos::{upload_photos_handler, UploadResponse, UploadedFile};
pub use search::{
    archive_search_handler, delete_search_handler, get_search_handler, start_search_handler,
    step_search_handler, PhotoLink, SearchResponse, SkippedPhoto, StepResponse,
};
