//! AWS Rekognition recognizer.
//!
//! Maps Rekognition's service error codes onto [`RecognitionError`] classes so
//! the pipeline can tell throttling and bad images apart from systemic faults.

use std::time::Instant;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rekognition::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, Face, Image, QualityFilter, S3Object};
use aws_sdk_rekognition::Client;
use tracing::{debug, instrument};

use super::{
    FaceMatch, FacePage, FaceRecognizer, IndexedFace, RecognitionError, RecognitionResult,
    MAX_DELETE_BATCH,
};
use crate::store::ObjectLocation;

/// Page size requested from `ListFaces`.
const LIST_FACES_PAGE_SIZE: i32 = 4096;

/// Rekognition-backed [`FaceRecognizer`].
#[derive(Clone)]
pub struct RekognitionRecognizer {
    client: Client,
}

impl RekognitionRecognizer {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> RecognitionError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let message = format!("{operation} failed: {}", DisplayErrorContext(&err));
    RecognitionError::from_code(code.as_deref(), message)
}

/// Error code SearchFacesByImage returns when the image holds no face.
const NO_FACE_IN_IMAGE: &str = "InvalidParameterException";

/// Result of a failed search. A photo without a detectable face is a plain
/// miss, everything else is classified as usual.
fn search_failure(code: Option<&str>, message: String) -> RecognitionResult<Vec<FaceMatch>> {
    match code {
        Some(NO_FACE_IN_IMAGE) => Ok(Vec::new()),
        code => Err(RecognitionError::from_code(code, message)),
    }
}

fn to_indexed(face: &Face) -> Option<IndexedFace> {
    Some(IndexedFace {
        face_id: face.face_id()?.to_string(),
        external_id: face.external_image_id().map(str::to_string),
    })
}

#[async_trait]
impl FaceRecognizer for RekognitionRecognizer {
    #[instrument(level = "debug", skip(self))]
    async fn describe_collection(&self, collection_id: &str) -> RecognitionResult<()> {
        self.client
            .describe_collection()
            .collection_id(collection_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("DescribeCollection", e))
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_collection(&self, collection_id: &str) -> RecognitionResult<()> {
        self.client
            .create_collection()
            .collection_id(collection_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("CreateCollection", e))
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_faces(
        &self,
        collection_id: &str,
        next: Option<String>,
    ) -> RecognitionResult<FacePage> {
        let output = self
            .client
            .list_faces()
            .collection_id(collection_id)
            .max_results(LIST_FACES_PAGE_SIZE)
            .set_next_token(next)
            .send()
            .await
            .map_err(|e| classify("ListFaces", e))?;

        Ok(FacePage {
            faces: output.faces().iter().filter_map(to_indexed).collect(),
            next: output.next_token().map(str::to_string),
        })
    }

    #[instrument(level = "debug", skip(self, face_ids), fields(count = face_ids.len()))]
    async fn delete_faces(
        &self,
        collection_id: &str,
        face_ids: &[String],
    ) -> RecognitionResult<()> {
        if face_ids.len() > MAX_DELETE_BATCH {
            return Err(RecognitionError::Other(format!(
                "DeleteFaces accepts at most {MAX_DELETE_BATCH} ids, got {}",
                face_ids.len()
            )));
        }

        let output = self
            .client
            .delete_faces()
            .collection_id(collection_id)
            .set_face_ids(Some(face_ids.to_vec()))
            .send()
            .await
            .map_err(|e| classify("DeleteFaces", e))?;

        debug!(deleted = output.deleted_faces().len(), "Deleted faces");
        Ok(())
    }

    #[instrument(level = "debug", skip(self, image), fields(bytes = image.len()))]
    async fn index_face(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
    ) -> RecognitionResult<Vec<IndexedFace>> {
        let output = self
            .client
            .index_faces()
            .collection_id(collection_id)
            .image(Image::builder().bytes(Blob::new(image.to_vec())).build())
            .external_image_id(external_id)
            .detection_attributes(Attribute::Default)
            .max_faces(1)
            .quality_filter(QualityFilter::Auto)
            .send()
            .await
            .map_err(|e| classify("IndexFaces", e))?;

        if !output.unindexed_faces().is_empty() {
            debug!(
                unindexed = output.unindexed_faces().len(),
                "Faces filtered out while indexing reference"
            );
        }

        Ok(output
            .face_records()
            .iter()
            .filter_map(|record| record.face().and_then(to_indexed))
            .collect())
    }

    async fn search_faces_by_image(
        &self,
        collection_id: &str,
        image: &ObjectLocation,
        threshold: f32,
        max_faces: u32,
    ) -> RecognitionResult<Vec<FaceMatch>> {
        let start = Instant::now();
        let s3_object = S3Object::builder()
            .bucket(&image.bucket)
            .name(&image.key)
            .build();

        let sent = self
            .client
            .search_faces_by_image()
            .collection_id(collection_id)
            .image(Image::builder().s3_object(s3_object).build())
            .face_match_threshold(threshold)
            .max_faces(max_faces.min(i32::MAX as u32) as i32)
            .send()
            .await;

        let output = match sent {
            Ok(output) => output,
            Err(e) => {
                let code = e
                    .as_service_error()
                    .and_then(|svc| svc.code())
                    .map(str::to_string);
                let message = format!("SearchFacesByImage failed: {}", DisplayErrorContext(&e));
                let outcome = search_failure(code.as_deref(), message);
                match &outcome {
                    Ok(_) => debug!(key = %image.key, "No face in candidate image"),
                    Err(err) => debug!(
                        key = %image.key,
                        error = %err,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Search request failed"
                    ),
                }
                return outcome;
            }
        };

        Ok(output
            .face_matches()
            .iter()
            .filter_map(|hit| {
                let face = hit.face()?;
                Some(FaceMatch {
                    face_id: face.face_id()?.to_string(),
                    external_id: face.external_image_id().map(str::to_string),
                    similarity: hit.similarity().unwrap_or_default(),
                })
            })
            .collect())
    }
}
