//! Photo upload handler
//!
//! The event owner adds photos to the event folder with the client passkey.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use smriti_core::{SmritiError, UploadReport, UploadResult};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::multipart::MultipartFields;
use crate::state::AppState;
use crate::validation::validate_passkey;

/// Outcome for one uploaded file
#[derive(Serialize, ToSchema)]
pub struct UploadedFile {
    /// File name as sent by the client
    #[schema(example = "IMG_0042.jpg")]
    pub filename: String,
    /// Object key the photo was stored under
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Wedding_images/asha/IMG_0042-3fa9c1.jpg")]
    pub key: Option<String>,
    /// Why the file was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<UploadResult> for UploadedFile {
    fn from(result: UploadResult) -> Self {
        Self {
            filename: result.filename,
            key: result.key,
            error: result.error,
        }
    }
}

/// Response for a photo upload
#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    #[schema(example = 12)]
    pub uploaded: usize,
    #[schema(example = 1)]
    pub failed: usize,
    pub files: Vec<UploadedFile>,
}

impl From<UploadReport> for UploadResponse {
    fn from(report: UploadReport) -> Self {
        Self {
            uploaded: report.uploaded,
            failed: report.failed,
            files: report.files.into_iter().map(UploadedFile::from).collect(),
        }
    }
}

/// Upload photos to an event
///
/// Accepts multipart/form-data with:
/// - **passkey** (required): the event's client passkey
/// - **file** (one or more): photos (jpg, jpeg, png, heic, raw, cr2, dng, nef, tif, tiff, webp)
///
/// Each file is stored under a collision-free key in the event folder.
/// Rejected files are reported individually; the rest are still stored.
#[utoipa::path(
    post,
    path = "/photos",
    tag = "Photos",
    request_body(
        content_type = "multipart/form-data",
        description = "Client passkey and one or more photos"
    ),
    responses(
        (status = 200, description = "Upload report", body = UploadResponse),
        (status = 400, description = "Missing passkey or no files"),
        (status = 401, description = "Unknown passkey")
    )
)]
pub async fn upload_photos_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let fields = MultipartFields::parse(&mut multipart, true, state.max_file_size).await?;
    let passkey = validate_passkey(fields.get_text("passkey"))?;
    let scope = state
        .directory
        .resolve_owner(passkey)
        .await?
        .ok_or(SmritiError::InvalidPasskey)?;

    if fields.file_count() == 0 {
        return Err(ApiError::bad_request(
            "No files provided. Use one or more 'file' fields in multipart form.",
        ));
    }

    let files = fields
        .into_files()
        .into_iter()
        .map(|f| (f.file_name.unwrap_or_default(), f.data, f.content_type))
        .collect();

    let report = state
        .uploader
        .upload_all(&scope.prefix, files, Some(state.scheduler.listing_cache()))
        .await;

    tracing::info!(
        prefix = %scope.prefix,
        uploaded = report.uploaded,
        failed = report.failed,
        "Photos uploaded"
    );
    Ok(Json(report.into()))
}
