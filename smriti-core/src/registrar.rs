//! Reference face registration.
//!
//! A collection holds at most one reference face per identity. Registering a
//! new selfie therefore purges every face tagged with the identity first, and
//! the purge-then-register sequence runs under a per-`(collection, identity)`
//! lock so two preparations in the same process cannot interleave. Every
//! service call retries throttling under the pipeline's [`RetryPolicy`].

use std::sync::Arc;

use dashmap::DashMap;
use image::ImageFormat;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SmritiError};
use crate::recognition::{FaceRecognizer, RecognitionError, MAX_DELETE_BATCH};
use crate::retry::{retry_throttled, RetryPolicy};

/// Check that a reference image is a JPEG or PNG before it is sent anywhere.
pub fn validate_reference(image: &[u8]) -> Result<ImageFormat> {
    if image.is_empty() {
        return Err(SmritiError::InvalidReference("image is empty".into()));
    }
    match image::guess_format(image) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(format),
        Ok(other) => Err(SmritiError::InvalidReference(format!(
            "{other:?} images are not supported, use JPEG or PNG"
        ))),
        Err(_) => Err(SmritiError::InvalidReference(
            "unrecognized image format, use JPEG or PNG".into(),
        )),
    }
}

/// Registers reference faces against face collections.
pub struct ReferenceRegistrar {
    recognizer: Arc<dyn FaceRecognizer>,
    retry: RetryPolicy,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl ReferenceRegistrar {
    pub fn new(recognizer: Arc<dyn FaceRecognizer>, retry: RetryPolicy) -> Self {
        Self {
            recognizer,
            retry,
            locks: DashMap::new(),
        }
    }

    /// Make sure the collection exists, creating it when absent.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, collection_id: &str) -> Result<()> {
        let described = retry_throttled(&self.retry, "describe_collection", || {
            self.recognizer.describe_collection(collection_id)
        })
        .await;
        match described {
            Ok(()) => {
                debug!("Collection exists");
                Ok(())
            }
            Err(RecognitionError::NotFound(_)) => {
                info!("Creating face collection");
                retry_throttled(&self.retry, "create_collection", || {
                    self.recognizer.create_collection(collection_id)
                })
                .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every face tagged with `identity`. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn purge_identity(&self, collection_id: &str, identity: &str) -> Result<usize> {
        let mut stale = Vec::new();
        let mut next = None;
        loop {
            let page = retry_throttled(&self.retry, "list_faces", || {
                self.recognizer.list_faces(collection_id, next.clone())
            })
            .await?;
            stale.extend(
                page.faces
                    .into_iter()
                    .filter(|face| face.external_id.as_deref() == Some(identity))
                    .map(|face| face.face_id),
            );
            match page.next {
                Some(token) => next = Some(token),
                None => break,
            }
        }

        for chunk in stale.chunks(MAX_DELETE_BATCH) {
            retry_throttled(&self.retry, "delete_faces", || {
                self.recognizer.delete_faces(collection_id, chunk)
            })
            .await?;
        }

        if !stale.is_empty() {
            info!(removed = stale.len(), "Purged stale reference faces");
        }
        Ok(stale.len())
    }

    /// Index the reference image under `identity`.
    ///
    /// Returns `false` when no face was detected. An image the service cannot
    /// process is reported as [`SmritiError::InvalidReference`].
    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn register(
        &self,
        collection_id: &str,
        identity: &str,
        image: &[u8],
    ) -> Result<bool> {
        validate_reference(image)?;
        let faces = retry_throttled(&self.retry, "index_face", || {
            self.recognizer.index_face(collection_id, image, identity)
        })
        .await
        .map_err(|e| match e {
            RecognitionError::BadImage(msg) => SmritiError::InvalidReference(msg),
            other => other.into(),
        })?;

        if faces.is_empty() {
            warn!("No face detected in reference image");
            return Ok(false);
        }
        debug!(face_id = %faces[0].face_id, "Registered reference face");
        Ok(true)
    }

    /// Ensure the collection, purge `identity`, then register the new image,
    /// all under the identity's lock.
    pub async fn replace_reference(
        &self,
        collection_id: &str,
        identity: &str,
        image: &[u8],
    ) -> Result<bool> {
        validate_reference(image)?;

        let lock = self.lock_for(collection_id, identity);
        let _guard = lock.lock().await;

        self.ensure_collection(collection_id).await?;
        self.purge_identity(collection_id, identity).await?;
        self.register(collection_id, identity, image).await
    }

    fn lock_for(&self, collection_id: &str, identity: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((collection_id.to_string(), identity.to_string()))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::{IndexedFace, MockRecognizer};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn registrar(mock: Arc<MockRecognizer>) -> ReferenceRegistrar {
        ReferenceRegistrar::new(mock, RetryPolicy::immediate(3))
    }

    fn face(id: &str, external_id: &str) -> IndexedFace {
        IndexedFace {
            face_id: id.to_string(),
            external_id: Some(external_id.to_string()),
        }
    }

    #[test]
    fn test_validate_reference() {
        assert_eq!(validate_reference(PNG).unwrap(), ImageFormat::Png);
        assert_eq!(
            validate_reference(b"\xFF\xD8\xFF\xE0\0\x10JFIF").unwrap(),
            ImageFormat::Jpeg
        );
        assert!(matches!(
            validate_reference(b"GIF89a...."),
            Err(SmritiError::InvalidReference(_))
        ));
        assert!(validate_reference(b"").is_err());
        assert!(validate_reference(b"not an image").is_err());
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let mock = Arc::new(MockRecognizer::new());
        let registrar = registrar(mock.clone());

        registrar.ensure_collection("event").await.unwrap();
        registrar.ensure_collection("event").await.unwrap();
        assert!(mock.has_collection("event"));
    }

    #[tokio::test]
    async fn test_ensure_collection_propagates_other_errors() {
        let mock = Arc::new(
            MockRecognizer::new().with_describe_error(RecognitionError::Other("denied".into())),
        );
        let registrar = registrar(mock);
        let err = registrar.ensure_collection("event").await.unwrap_err();
        assert!(matches!(err, SmritiError::Recognition(_)));
    }

    #[tokio::test]
    async fn test_purge_pages_and_chunks_deletes() {
        let mut faces: Vec<IndexedFace> = (0..250)
            .map(|i| face(&format!("old-{i}"), "selfie_user"))
            .collect();
        faces.push(face("keep", "someone_else"));
        let mock = Arc::new(
            MockRecognizer::new()
                .with_collection("event", faces)
                .with_page_size(64),
        );
        let registrar = registrar(mock.clone());

        let removed = registrar.purge_identity("event", "selfie_user").await.unwrap();
        assert_eq!(removed, 250);
        assert_eq!(mock.delete_calls(), 3);
        assert_eq!(mock.faces("event"), vec![face("keep", "someone_else")]);
    }

    #[tokio::test]
    async fn test_purge_without_matches_is_noop() {
        let mock = Arc::new(MockRecognizer::new().with_collection("event", Vec::new()));
        let registrar = registrar(mock.clone());
        assert_eq!(registrar.purge_identity("event", "guest").await.unwrap(), 0);
        assert_eq!(mock.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_register_reports_zero_faces() {
        let mock = Arc::new(
            MockRecognizer::new()
                .with_collection("event", Vec::new())
                .with_no_face_detected(),
        );
        let registrar = registrar(mock);
        assert!(!registrar.register("event", "guest", PNG).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_leaves_single_reference() {
        let mock = Arc::new(
            MockRecognizer::new().with_collection("event", vec![face("stale", "guest")]),
        );
        let registrar = registrar(mock.clone());

        assert!(registrar.replace_reference("event", "guest", PNG).await.unwrap());
        assert!(registrar.replace_reference("event", "guest", PNG).await.unwrap());

        let faces = mock.faces("event");
        assert_eq!(faces.len(), 1);
        assert_ne!(faces[0].face_id, "stale");
    }

    #[tokio::test]
    async fn test_replace_rejects_bad_reference_before_touching_collection() {
        let mock = Arc::new(MockRecognizer::new());
        let registrar = registrar(mock.clone());
        let err = registrar
            .replace_reference("event", "guest", b"plain text")
            .await
            .unwrap_err();
        assert!(err.is_user_input());
        assert!(!mock.has_collection("event"));
    }

    #[tokio::test]
    async fn test_throttled_registration_recovers_within_budget() {
        let mock = Arc::new(
            MockRecognizer::new()
                .with_collection("event", vec![face("stale", "guest")])
                .with_control_throttling(2),
        );
        let registrar = registrar(mock.clone());

        assert!(registrar.replace_reference("event", "guest", PNG).await.unwrap());
        assert_eq!(mock.faces("event").len(), 1);
        assert_eq!(mock.control_throttles_remaining(), 0);
    }

    #[tokio::test]
    async fn test_throttling_every_call_during_prepare_stops_after_budget() {
        let mock = Arc::new(MockRecognizer::new().with_control_throttling(100));
        let registrar = registrar(mock.clone());

        let err = registrar.ensure_collection("event").await.unwrap_err();
        assert!(matches!(err, SmritiError::Throttled(_)));
        assert_eq!(mock.control_throttles_remaining(), 97);
    }
}
