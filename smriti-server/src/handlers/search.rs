//! Selfie search handlers
//!
//! A guest uploads a selfie with the event passkey, then advances the search
//! one batch per request and finally downloads the matched photos.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use smriti_core::{
    matched_links, SearchNotice, SearchProgress, SearchState, SkippedCandidate, SmritiError,
    StepReport, ARCHIVE_FILE_NAME,
};
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::multipart::MultipartFields;
use crate::state::{session_identity, AppState, SearchSession};
use crate::validation::validate_passkey;

/// Presigned link to one matched photo
#[derive(Serialize, ToSchema)]
pub struct PhotoLink {
    /// Object key in the event folder
    #[schema(example = "Wedding_images/asha/IMG_0042.jpg")]
    pub key: String,
    /// File name shown to the guest
    #[schema(example = "IMG_0042.jpg")]
    pub name: String,
    /// Time-limited display URL
    pub url: String,
}

/// Snapshot of one search
#[derive(Serialize, ToSchema)]
pub struct SearchResponse {
    /// Session identifier used by the other search endpoints
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub search_id: Uuid,
    /// `idle`, `preparing`, `searching` or `exhausted`
    #[schema(example = "searching")]
    pub state: String,
    /// Number of photos already searched
    #[schema(example = 50)]
    pub cursor: usize,
    /// Number of photos in the event
    #[schema(example = 1200)]
    pub total: usize,
    /// Progress from 0 to 100
    #[schema(example = 4.2)]
    pub percent_complete: f64,
    /// Matched object keys, sorted
    pub matches: Vec<String>,
    /// Photos that could not be searched
    pub skipped: usize,
    /// Guidance code when the search could not run normally
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "nothing_to_search")]
    pub notice: Option<String>,
    /// Guidance text matching `notice`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error that stopped the last batch; the next step retries it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Display links for the matches (status endpoint only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<PhotoLink>>,
}

impl SearchResponse {
    fn from_progress(search_id: Uuid, progress: &SearchProgress) -> Self {
        Self {
            search_id,
            state: progress.state.to_string(),
            cursor: progress.cursor,
            total: progress.total(),
            percent_complete: progress.percent_complete(),
            matches: progress.sorted_matches(),
            skipped: progress.skipped,
            notice: progress.notice.map(|n| notice_code(n).to_string()),
            message: progress.notice.map(|n| n.message().to_string()),
            last_error: progress.last_error.clone(),
            links: None,
        }
    }
}

fn notice_code(notice: SearchNotice) -> &'static str {
    match notice {
        SearchNotice::NoFaceDetected => "no_face_detected",
        SearchNotice::NothingToSearch => "nothing_to_search",
    }
}

/// Photo skipped during a batch
#[derive(Serialize, ToSchema)]
pub struct SkippedPhoto {
    pub key: String,
    /// `throttled` or `bad_image`
    #[schema(example = "throttled")]
    pub reason: String,
}

impl From<SkippedCandidate> for SkippedPhoto {
    fn from(skipped: SkippedCandidate) -> Self {
        Self {
            key: skipped.key,
            reason: skipped.reason.to_string(),
        }
    }
}

/// Result of one batch
#[derive(Serialize, ToSchema)]
pub struct StepResponse {
    #[schema(value_type = String)]
    pub search_id: Uuid,
    /// Photos searched in this batch
    #[schema(example = 25)]
    pub processed: usize,
    /// Matches first found in this batch
    pub new_matches: Vec<String>,
    /// Photos skipped in this batch
    pub skipped: Vec<SkippedPhoto>,
    pub cursor: usize,
    pub total: usize,
    /// Matches found so far
    pub total_matches: usize,
    #[schema(example = "searching")]
    pub state: String,
}

impl StepResponse {
    fn new(search_id: Uuid, report: StepReport, total_matches: usize) -> Self {
        Self {
            search_id,
            processed: report.processed,
            new_matches: report.new_matches,
            skipped: report.skipped.into_iter().map(SkippedPhoto::from).collect(),
            cursor: report.cursor,
            total: report.total,
            total_matches,
            state: report.state.to_string(),
        }
    }
}

fn find_session(state: &AppState, search_id: Uuid) -> Result<SearchSession, ApiError> {
    state
        .session(&search_id)
        .ok_or_else(|| ApiError::not_found(format!("Search {search_id} not found")))
}

/// Start a search for a guest's selfie
///
/// Accepts multipart/form-data with:
/// - **passkey** (required): the event's guest passkey
/// - **file** (required): a JPEG or PNG selfie
///
/// Registers the guest's reference face in the event's collection under an
/// identity private to this search, then snapshots the event's photos. No
/// batch is run yet.
#[utoipa::path(
    post,
    path = "/searches",
    tag = "Search",
    request_body(
        content_type = "multipart/form-data",
        description = "Guest passkey and selfie"
    ),
    responses(
        (status = 200, description = "Search prepared", body = SearchResponse),
        (status = 400, description = "Missing passkey or file"),
        (status = 401, description = "Unknown passkey"),
        (status = 422, description = "No face detected or selfie not usable"),
        (status = 502, description = "Storage or recognition service error")
    )
)]
pub async fn start_search_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SearchResponse>, ApiError> {
    let fields = MultipartFields::parse(&mut multipart, true, state.max_file_size).await?;
    let passkey = validate_passkey(fields.get_text("passkey"))?;
    let scope = state
        .directory
        .resolve_guest(passkey)
        .await?
        .ok_or(SmritiError::InvalidPasskey)?;
    let selfie = fields.require_file()?;

    let search_id = Uuid::new_v4();
    let identity = session_identity(&search_id);
    let progress = state
        .scheduler
        .prepare_as(&scope, &identity, &selfie.data)
        .await?;
    if progress.notice == Some(SearchNotice::NoFaceDetected) {
        return Err(SmritiError::NoFaceDetected.into());
    }
    if progress.state == SearchState::Exhausted {
        state.release_face(&progress).await;
    }

    let response = SearchResponse::from_progress(search_id, &progress);
    state
        .sessions
        .insert(search_id, Arc::new(Mutex::new(progress)));

    tracing::info!(
        search_id = %search_id,
        prefix = %scope.prefix,
        total = response.total,
        "Search started"
    );
    Ok(Json(response))
}

/// Run the next batch of a search
///
/// A search stopped by a service error is resumed from the failed batch.
/// Stepping an exhausted search is a no-op. The batch that exhausts the
/// search releases its reference face.
#[utoipa::path(
    post,
    path = "/searches/{search_id}/step",
    tag = "Search",
    params(
        ("search_id" = String, Path, description = "Search ID (UUID)")
    ),
    responses(
        (status = 200, description = "Batch processed", body = StepResponse),
        (status = 404, description = "Search not found"),
        (status = 409, description = "Another batch is running for this search"),
        (status = 502, description = "Storage or recognition service error"),
        (status = 503, description = "Recognition service throttled")
    )
)]
pub async fn step_search_handler(
    State(state): State<AppState>,
    Path(search_id): Path<Uuid>,
) -> Result<Json<StepResponse>, ApiError> {
    let session = find_session(&state, search_id)?;
    let mut progress = session
        .try_lock()
        .map_err(|_| ApiError::conflict("A batch is already running for this search"))?;

    if progress.last_error.is_some() {
        progress.resume()?;
    }
    let report = state.scheduler.step(&mut progress).await?;
    if report.processed > 0 && report.state == SearchState::Exhausted {
        state.release_face(&progress).await;
    }

    Ok(Json(StepResponse::new(
        search_id,
        report,
        progress.matches.len(),
    )))
}

/// Get a search's progress with links to the matched photos
#[utoipa::path(
    get,
    path = "/searches/{search_id}",
    tag = "Search",
    params(
        ("search_id" = String, Path, description = "Search ID (UUID)")
    ),
    responses(
        (status = 200, description = "Search progress", body = SearchResponse),
        (status = 404, description = "Search not found")
    )
)]
pub async fn get_search_handler(
    State(state): State<AppState>,
    Path(search_id): Path<Uuid>,
) -> Result<Json<SearchResponse>, ApiError> {
    let session = find_session(&state, search_id)?;
    let progress = session.lock().await.clone();

    let expiry = state.scheduler.config().url_expiry;
    let links = matched_links(state.store.as_ref(), &progress, expiry)
        .await
        .into_iter()
        .map(|link| PhotoLink {
            key: link.key,
            name: link.name,
            url: link.url,
        })
        .collect();

    let mut response = SearchResponse::from_progress(search_id, &progress);
    response.links = Some(links);
    Ok(Json(response))
}

/// Download the matched photos as a zip archive
///
/// Photos that cannot be fetched are left out of the archive.
#[utoipa::path(
    get,
    path = "/searches/{search_id}/archive",
    tag = "Search",
    params(
        ("search_id" = String, Path, description = "Search ID (UUID)")
    ),
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip", body = Vec<u8>),
        (status = 404, description = "Search not found or no matches yet")
    )
)]
pub async fn archive_search_handler(
    State(state): State<AppState>,
    Path(search_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, search_id)?;
    let matches = session.lock().await.sorted_matches();
    if matches.is_empty() {
        return Err(ApiError::not_found("No matched photos to download"));
    }

    let outcome = state.archiver.build_archive(&matches).await?;
    tracing::info!(
        search_id = %search_id,
        added = outcome.added.len(),
        skipped = outcome.skipped.len(),
        "Archive served"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_FILE_NAME}\""),
            ),
        ],
        outcome.bytes,
    )
        .into_response())
}

/// Abandon a search, free its session and release its reference face
#[utoipa::path(
    delete,
    path = "/searches/{search_id}",
    tag = "Search",
    params(
        ("search_id" = String, Path, description = "Search ID (UUID)")
    ),
    responses(
        (status = 204, description = "Search removed"),
        (status = 404, description = "Search not found")
    )
)]
pub async fn delete_search_handler(
    State(state): State<AppState>,
    Path(search_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let (_, session) = state
        .sessions
        .remove(&search_id)
        .ok_or_else(|| ApiError::not_found(format!("Search {search_id} not found")))?;

    let progress = session.lock().await.clone();
    if progress.state != SearchState::Exhausted {
        state.release_face(&progress).await;
    }
    tracing::info!(search_id = %search_id, "Search removed");
    Ok(StatusCode::NO_CONTENT)
}
