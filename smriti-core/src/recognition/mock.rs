//! Mock recognition service for testing.
//!
//! Keeps collections in memory and answers searches from scripted
//! similarities. Faces indexed from a registered person's selfie only resemble
//! that person's photos; any other face resembles a key at the similarity set
//! with [`MockRecognizer::with_similarity`]. Throttling, bad images and
//! systemic failures can be injected per key, and every call is counted so
//! tests can assert on retry budgets and concurrency.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    FaceMatch, FacePage, FaceRecognizer, IndexedFace, RecognitionError, RecognitionResult,
    MAX_DELETE_BATCH,
};
use crate::store::ObjectLocation;

/// Mock recognizer.
/// WARNING: Do not use in production - matches are scripted, not computed!
pub struct MockRecognizer {
    collections: Mutex<HashMap<String, Vec<IndexedFace>>>,
    similarities: HashMap<String, f32>,
    people: Vec<Person>,
    face_people: Mutex<HashMap<String, usize>>,
    bad_image_keys: HashSet<String>,
    fatal_keys: HashSet<String>,
    throttles_remaining: Mutex<HashMap<String, u32>>,
    control_throttles: AtomicU32,
    search_calls: Mutex<HashMap<String, u32>>,
    no_face_detected: bool,
    describe_error: Option<RecognitionError>,
    page_size: usize,
    search_latency: Duration,
    next_face_id: AtomicU64,
    delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A person recognizable from one selfie.
struct Person {
    selfie: Vec<u8>,
    keys: HashSet<String>,
}

/// Similarity reported for a scripted match.
const SCRIPTED_SIMILARITY: f32 = 99.0;

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            similarities: HashMap::new(),
            people: Vec::new(),
            face_people: Mutex::new(HashMap::new()),
            bad_image_keys: HashSet::new(),
            fatal_keys: HashSet::new(),
            throttles_remaining: Mutex::new(HashMap::new()),
            control_throttles: AtomicU32::new(0),
            search_calls: Mutex::new(HashMap::new()),
            no_face_detected: false,
            describe_error: None,
            page_size: 4096,
            search_latency: Duration::ZERO,
            next_face_id: AtomicU64::new(1),
            delete_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Keys whose images contain any unscripted reference face.
    pub fn with_matches<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.similarities
            .extend(keys.into_iter().map(|key| (key.into(), SCRIPTED_SIMILARITY)));
        self
    }

    /// Similarity between `key` and any unscripted reference face.
    pub fn with_similarity(mut self, key: impl Into<String>, similarity: f32) -> Self {
        self.similarities.insert(key.into(), similarity);
        self
    }

    /// A person whose face, once indexed from `selfie`, appears only in `keys`.
    pub fn with_person<I, S>(mut self, selfie: &[u8], keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.people.push(Person {
            selfie: selfie.to_vec(),
            keys: keys.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Throttle the first `times` collection management calls (describe,
    /// create, list, delete and index).
    pub fn with_control_throttling(self, times: u32) -> Self {
        self.control_throttles.store(times, Ordering::SeqCst);
        self
    }

    /// Throttle the first `times` searches for `key`.
    pub fn with_throttling(self, key: impl Into<String>, times: u32) -> Self {
        self.throttles_remaining
            .lock()
            .expect("mock lock poisoned")
            .insert(key.into(), times);
        self
    }

    /// Reject `key` as an unprocessable image.
    pub fn with_bad_image(mut self, key: impl Into<String>) -> Self {
        self.bad_image_keys.insert(key.into());
        self
    }

    /// Fail searches for `key` with a systemic error.
    pub fn with_fatal_error(mut self, key: impl Into<String>) -> Self {
        self.fatal_keys.insert(key.into());
        self
    }

    /// Report zero faces for every indexed reference.
    pub fn with_no_face_detected(mut self) -> Self {
        self.no_face_detected = true;
        self
    }

    /// Fail `describe_collection` with the given error.
    pub fn with_describe_error(mut self, err: RecognitionError) -> Self {
        self.describe_error = Some(err);
        self
    }

    /// Pre-populate a collection.
    pub fn with_collection(self, collection_id: impl Into<String>, faces: Vec<IndexedFace>) -> Self {
        self.collections
            .lock()
            .expect("mock lock poisoned")
            .insert(collection_id.into(), faces);
        self
    }

    /// Page size used by `list_faces`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Simulated latency per search call.
    pub fn with_search_latency(mut self, latency: Duration) -> Self {
        self.search_latency = latency;
        self
    }

    /// Faces currently stored in a collection.
    pub fn faces(&self, collection_id: &str) -> Vec<IndexedFace> {
        self.collections
            .lock()
            .expect("mock lock poisoned")
            .get(collection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_collection(&self, collection_id: &str) -> bool {
        self.collections
            .lock()
            .expect("mock lock poisoned")
            .contains_key(collection_id)
    }

    /// Searches issued for `key`, retries included.
    pub fn search_calls_for(&self, key: &str) -> u32 {
        self.search_calls
            .lock()
            .expect("mock lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Searches issued in total.
    pub fn total_search_calls(&self) -> u32 {
        self.search_calls
            .lock()
            .expect("mock lock poisoned")
            .values()
            .sum()
    }

    /// Collection management throttles not yet served.
    pub fn control_throttles_remaining(&self) -> u32 {
        self.control_throttles.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Highest number of searches observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record_search(&self, key: &str) {
        *self
            .search_calls
            .lock()
            .expect("mock lock poisoned")
            .entry(key.to_string())
            .or_insert(0) += 1;
    }

    fn take_throttle(&self, key: &str) -> bool {
        let mut remaining = self.throttles_remaining.lock().expect("mock lock poisoned");
        match remaining.get_mut(key) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_control_throttle(&self, operation: &str) -> RecognitionResult<()> {
        let throttled = self
            .control_throttles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(RecognitionError::Throttled(format!(
                "ThrottlingException during {operation}"
            )));
        }
        Ok(())
    }

    fn similarity(
        &self,
        face_people: &HashMap<String, usize>,
        face: &IndexedFace,
        key: &str,
    ) -> Option<f32> {
        match face_people.get(&face.face_id).and_then(|&i| self.people.get(i)) {
            Some(person) => person.keys.contains(key).then_some(SCRIPTED_SIMILARITY),
            None => self.similarities.get(key).copied(),
        }
    }

    fn search_outcome(
        &self,
        collection_id: &str,
        key: &str,
        threshold: f32,
    ) -> RecognitionResult<Vec<FaceMatch>> {
        if self.fatal_keys.contains(key) {
            return Err(RecognitionError::Other(format!(
                "AccessDeniedException while searching {key}"
            )));
        }
        if self.take_throttle(key) {
            return Err(RecognitionError::Throttled(format!(
                "ThrottlingException for {key}"
            )));
        }
        if self.bad_image_keys.contains(key) {
            return Err(RecognitionError::BadImage(format!(
                "InvalidImageFormatException for {key}"
            )));
        }

        let collections = self.collections.lock().expect("mock lock poisoned");
        let faces = collections
            .get(collection_id)
            .ok_or_else(|| RecognitionError::NotFound(collection_id.to_string()))?;
        let face_people = self.face_people.lock().expect("mock lock poisoned");

        let mut hits: Vec<FaceMatch> = faces
            .iter()
            .filter_map(|face| {
                let similarity = self.similarity(&face_people, face, key)?;
                (similarity >= threshold).then(|| FaceMatch {
                    face_id: face.face_id.clone(),
                    external_id: face.external_id.clone(),
                    similarity,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(hits)
    }
}

#[async_trait]
impl FaceRecognizer for MockRecognizer {
    async fn describe_collection(&self, collection_id: &str) -> RecognitionResult<()> {
        self.take_control_throttle("describe_collection")?;
        if let Some(err) = &self.describe_error {
            return Err(err.clone());
        }
        if self.has_collection(collection_id) {
            Ok(())
        } else {
            Err(RecognitionError::NotFound(collection_id.to_string()))
        }
    }

    async fn create_collection(&self, collection_id: &str) -> RecognitionResult<()> {
        self.take_control_throttle("create_collection")?;
        let mut collections = self.collections.lock().expect("mock lock poisoned");
        if collections.contains_key(collection_id) {
            return Err(RecognitionError::Other(format!(
                "ResourceAlreadyExistsException: {collection_id}"
            )));
        }
        collections.insert(collection_id.to_string(), Vec::new());
        Ok(())
    }

    async fn list_faces(
        &self,
        collection_id: &str,
        next: Option<String>,
    ) -> RecognitionResult<FacePage> {
        self.take_control_throttle("list_faces")?;
        let collections = self.collections.lock().expect("mock lock poisoned");
        let faces = collections
            .get(collection_id)
            .ok_or_else(|| RecognitionError::NotFound(collection_id.to_string()))?;

        let start = match next {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RecognitionError::Other(format!("invalid token {token}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(faces.len());
        let page = faces.get(start..end).unwrap_or_default().to_vec();

        Ok(FacePage {
            faces: page,
            next: (end < faces.len()).then(|| end.to_string()),
        })
    }

    async fn delete_faces(
        &self,
        collection_id: &str,
        face_ids: &[String],
    ) -> RecognitionResult<()> {
        self.take_control_throttle("delete_faces")?;
        if face_ids.len() > MAX_DELETE_BATCH {
            return Err(RecognitionError::Other(format!(
                "InvalidParameterException: {} face ids exceeds {MAX_DELETE_BATCH}",
                face_ids.len()
            )));
        }
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.lock().expect("mock lock poisoned");
        let faces = collections
            .get_mut(collection_id)
            .ok_or_else(|| RecognitionError::NotFound(collection_id.to_string()))?;
        faces.retain(|face| !face_ids.contains(&face.face_id));
        Ok(())
    }

    async fn index_face(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
    ) -> RecognitionResult<Vec<IndexedFace>> {
        self.take_control_throttle("index_face")?;
        if image.is_empty() {
            return Err(RecognitionError::BadImage("empty image".into()));
        }
        if self.no_face_detected {
            return Ok(Vec::new());
        }

        let face = IndexedFace {
            face_id: format!(
                "face-{:04}",
                self.next_face_id.fetch_add(1, Ordering::SeqCst)
            ),
            external_id: Some(external_id.to_string()),
        };

        let mut collections = self.collections.lock().expect("mock lock poisoned");
        let faces = collections
            .get_mut(collection_id)
            .ok_or_else(|| RecognitionError::NotFound(collection_id.to_string()))?;
        faces.push(face.clone());
        if let Some(person) = self.people.iter().position(|p| p.selfie == image) {
            self.face_people
                .lock()
                .expect("mock lock poisoned")
                .insert(face.face_id.clone(), person);
        }
        Ok(vec![face])
    }

    async fn search_faces_by_image(
        &self,
        collection_id: &str,
        image: &ObjectLocation,
        threshold: f32,
        max_faces: u32,
    ) -> RecognitionResult<Vec<FaceMatch>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.record_search(&image.key);

        if self.search_latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.search_latency).await;
        }

        let outcome = self
            .search_outcome(collection_id, &image.key, threshold)
            .map(|mut matches| {
                matches.truncate(max_faces as usize);
                matches
            });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(key: &str) -> ObjectLocation {
        ObjectLocation::new("bucket", key)
    }

    #[tokio::test]
    async fn test_index_then_search() {
        let mock = MockRecognizer::new().with_matches(["b.jpg"]);
        mock.create_collection("c").await.unwrap();
        let faces = mock.index_face("c", b"selfie", "guest").await.unwrap();
        assert_eq!(faces.len(), 1);

        let hit = mock
            .search_faces_by_image("c", &location("b.jpg"), 90.0, 1)
            .await
            .unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].external_id.as_deref(), Some("guest"));

        let miss = mock
            .search_faces_by_image("c", &location("a.jpg"), 90.0, 1)
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn test_throttle_budget_is_consumed() {
        let mock = MockRecognizer::new()
            .with_collection("c", Vec::new())
            .with_throttling("a.jpg", 2);

        for _ in 0..2 {
            let err = mock
                .search_faces_by_image("c", &location("a.jpg"), 90.0, 1)
                .await
                .unwrap_err();
            assert!(matches!(err, RecognitionError::Throttled(_)));
        }
        assert!(mock
            .search_faces_by_image("c", &location("a.jpg"), 90.0, 1)
            .await
            .is_ok());
        assert_eq!(mock.search_calls_for("a.jpg"), 3);
    }

    #[tokio::test]
    async fn test_list_faces_pages() {
        let faces = (0..5)
            .map(|i| IndexedFace {
                face_id: format!("f{i}"),
                external_id: None,
            })
            .collect();
        let mock = MockRecognizer::new()
            .with_collection("c", faces)
            .with_page_size(2);

        let first = mock.list_faces("c", None).await.unwrap();
        assert_eq!(first.faces.len(), 2);
        let second = mock.list_faces("c", first.next).await.unwrap();
        assert_eq!(second.faces.len(), 2);
        let third = mock.list_faces("c", second.next).await.unwrap();
        assert_eq!(third.faces.len(), 1);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_oversized_batch() {
        let mock = MockRecognizer::new().with_collection("c", Vec::new());
        let ids: Vec<String> = (0..=MAX_DELETE_BATCH).map(|i| i.to_string()).collect();
        assert!(mock.delete_faces("c", &ids).await.is_err());
    }

    #[tokio::test]
    async fn test_search_honours_threshold_and_ranks_hits() {
        let mock = MockRecognizer::new().with_similarity("a.jpg", 85.0);
        mock.create_collection("c").await.unwrap();
        mock.index_face("c", b"one", "first").await.unwrap();
        mock.index_face("c", b"two", "second").await.unwrap();

        let hits = mock
            .search_faces_by_image("c", &location("a.jpg"), 80.0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.similarity == 85.0));

        let strict = mock
            .search_faces_by_image("c", &location("a.jpg"), 90.0, 10)
            .await
            .unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_person_faces_only_resemble_their_photos() {
        let mock = MockRecognizer::new()
            .with_person(b"asha", ["asha.jpg"])
            .with_person(b"ravi", ["ravi.jpg"]);
        mock.create_collection("c").await.unwrap();
        mock.index_face("c", b"asha", "guest_a").await.unwrap();
        mock.index_face("c", b"ravi", "guest_b").await.unwrap();

        let hits = mock
            .search_faces_by_image("c", &location("ravi.jpg"), 80.0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].external_id.as_deref(), Some("guest_b"));
    }

    #[tokio::test]
    async fn test_control_throttling_is_consumed_across_calls() {
        let mock = MockRecognizer::new().with_control_throttling(2);
        assert!(matches!(
            mock.create_collection("c").await,
            Err(RecognitionError::Throttled(_))
        ));
        assert!(matches!(
            mock.describe_collection("c").await,
            Err(RecognitionError::Throttled(_))
        ));
        mock.create_collection("c").await.unwrap();
        assert_eq!(mock.control_throttles_remaining(), 0);
    }
}
