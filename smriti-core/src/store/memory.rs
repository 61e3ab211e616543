//! In-memory object store for tests and local runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use super::{ObjectPage, ObjectStore};
use crate::error::{Result, SmritiError};

/// Object store backed by a sorted map of `(bucket, key)` to bytes.
///
/// Listing pages are `page_size` keys long and continuation tokens are the
/// last key returned, mirroring `ListObjectsV2`'s `StartAfter` semantics.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    failing_keys: RwLock<HashSet<String>>,
    list_failure: Option<String>,
    page_size: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            failing_keys: RwLock::new(HashSet::new()),
            list_failure: None,
            page_size: 1000,
        }
    }

    /// Add an object.
    pub fn with_object(self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(bucket, key, bytes);
        self
    }

    /// Keys per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make `get_object` fail for `key`.
    pub fn with_failing_key(self, key: impl Into<String>) -> Self {
        self.failing_keys
            .write()
            .expect("store lock poisoned")
            .insert(key.into());
        self
    }

    /// Make every listing call fail.
    pub fn with_list_failure(mut self, message: impl Into<String>) -> Self {
        self.list_failure = Some(message.into());
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects.write().expect("store lock poisoned").insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: bytes.into(),
                content_type: None,
            },
        );
    }

    /// Content type recorded for an object, if any.
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .expect("store lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|o| o.content_type.clone())
    }

    /// All keys in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .expect("store lock poisoned")
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage> {
        if let Some(message) = &self.list_failure {
            return Err(SmritiError::Storage(message.clone()));
        }

        let objects = self.objects.read().expect("store lock poisoned");
        let mut matching = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k)
            .filter(|k| continuation.as_ref().map_or(true, |after| *k > after));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next = if matching.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ObjectPage { keys, next })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        if self
            .failing_keys
            .read()
            .expect("store lock poisoned")
            .contains(key)
        {
            return Err(SmritiError::Storage(format!("GetObject failed for {key}")));
        }

        self.objects
            .read()
            .expect("store lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.clone())
            .ok_or_else(|| SmritiError::Storage(format!("NoSuchKey: {bucket}/{key}")))
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .expect("store lock poisoned")
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.objects.write().expect("store lock poisoned").insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        if !self.object_exists(bucket, key).await? {
            return Err(SmritiError::Storage(format!("NoSuchKey: {bucket}/{key}")));
        }
        Ok(format!(
            "memory://{bucket}/{key}?expires={}",
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paging_covers_every_key_once() {
        let store = (0..7).fold(
            InMemoryObjectStore::new().with_page_size(3),
            |store, i| store.with_object("b", &format!("event/{i}.jpg"), vec![i as u8]),
        );

        let mut seen = Vec::new();
        let mut next = None;
        loop {
            let page = store.list_page("b", "event/", next).await.unwrap();
            seen.extend(page.keys);
            next = page.next;
            if next.is_none() {
                break;
            }
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(seen.first().map(String::as_str), Some("event/0.jpg"));
    }

    #[tokio::test]
    async fn test_prefix_and_bucket_isolation() {
        let store = InMemoryObjectStore::new()
            .with_object("b", "event/a.jpg", b"a".to_vec())
            .with_object("b", "other/b.jpg", b"b".to_vec())
            .with_object("c", "event/c.jpg", b"c".to_vec());

        let page = store.list_page("b", "event/", None).await.unwrap();
        assert_eq!(page.keys, vec!["event/a.jpg".to_string()]);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_failing_key() {
        let store = InMemoryObjectStore::new()
            .with_object("b", "x.jpg", b"x".to_vec())
            .with_failing_key("x.jpg");
        assert!(store.get_object("b", "x.jpg").await.is_err());
        assert!(store.object_exists("b", "x.jpg").await.unwrap());
    }
}
