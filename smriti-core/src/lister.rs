//! Candidate enumeration.
//!
//! Pages through every key under an event prefix and keeps the ones that look
//! like photos. Listing a large bucket is slow, so successful listings can be
//! reused through [`ListingCache`] for a bounded time.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::error::{Result, SmritiError};
use crate::store::ObjectStore;

/// Candidate suffixes, matched case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Whether `key` ends in one of [`IMAGE_EXTENSIONS`].
pub fn is_candidate_key(key: &str) -> bool {
    key.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Enumerates candidate images under a prefix.
#[derive(Clone)]
pub struct ObjectLister {
    store: Arc<dyn ObjectStore>,
}

impl ObjectLister {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// List every candidate key under `prefix`, sorted and deduplicated.
    ///
    /// Any page failure aborts the whole listing.
    #[instrument(skip(self))]
    pub async fn list_candidates(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let started = Instant::now();
        let mut keys = Vec::new();
        let mut continuation = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .store
                .list_page(bucket, prefix, continuation)
                .await
                .map_err(|e| SmritiError::Listing {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    message: e.to_string(),
                })?;
            pages += 1;
            keys.extend(page.keys.into_iter().filter(|k| is_candidate_key(k)));

            match page.next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        keys.sort_unstable();
        keys.dedup();

        info!(
            candidates = keys.len(),
            pages,
            latency_ms = started.elapsed().as_millis() as u64,
            "Listed candidates"
        );
        Ok(keys)
    }
}

struct CachedListing {
    listed_at: Instant,
    keys: Arc<Vec<String>>,
}

/// Time-bounded cache of candidate listings keyed by `(bucket, prefix)`.
pub struct ListingCache {
    ttl: Duration,
    entries: DashMap<(String, String), CachedListing>,
}

impl ListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached listing if it is still fresh.
    pub fn get(&self, bucket: &str, prefix: &str) -> Option<Arc<Vec<String>>> {
        let key = (bucket.to_string(), prefix.to_string());
        let entry = self.entries.get(&key)?;
        if entry.listed_at.elapsed() < self.ttl {
            return Some(Arc::clone(&entry.keys));
        }
        drop(entry);
        self.entries.remove(&key);
        None
    }

    pub fn insert(&self, bucket: &str, prefix: &str, keys: Vec<String>) -> Arc<Vec<String>> {
        let keys = Arc::new(keys);
        self.entries.insert(
            (bucket.to_string(), prefix.to_string()),
            CachedListing {
                listed_at: Instant::now(),
                keys: Arc::clone(&keys),
            },
        );
        keys
    }

    /// Drop a listing, e.g. after new photos were uploaded under the prefix.
    pub fn invalidate(&self, bucket: &str, prefix: &str) {
        self.entries
            .remove(&(bucket.to_string(), prefix.to_string()));
    }

    /// Return the cached listing or list afresh and cache the result.
    ///
    /// Failed listings are never cached.
    pub async fn get_or_list(
        &self,
        lister: &ObjectLister,
        bucket: &str,
        prefix: &str,
    ) -> Result<Arc<Vec<String>>> {
        if let Some(keys) = self.get(bucket, prefix) {
            debug!(bucket, prefix, candidates = keys.len(), "Listing cache hit");
            return Ok(keys);
        }
        let keys = lister.list_candidates(bucket, prefix).await?;
        Ok(self.insert(bucket, prefix, keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;

    fn store() -> InMemoryObjectStore {
        InMemoryObjectStore::new()
            .with_page_size(2)
            .with_object("b", "event/c.JPG", b"c".to_vec())
            .with_object("b", "event/a.jpg", b"a".to_vec())
            .with_object("b", "event/notes.txt", b"n".to_vec())
            .with_object("b", "event/b.png", b"b".to_vec())
            .with_object("b", "event/d.jpeg", b"d".to_vec())
            .with_object("b", "event/raw.cr2", b"r".to_vec())
            .with_object("b", "elsewhere/z.jpg", b"z".to_vec())
    }

    #[test]
    fn test_candidate_key_filter() {
        assert!(is_candidate_key("a.jpg"));
        assert!(is_candidate_key("dir/A.JPEG"));
        assert!(is_candidate_key("dir/b.Png"));
        assert!(!is_candidate_key("dir/b.gif"));
        assert!(!is_candidate_key("jpg"));
        assert!(!is_candidate_key("dir/photo.jpg.txt"));
        // Suffix match only, hidden files included
        assert!(is_candidate_key("dir/.jpg"));
    }

    #[tokio::test]
    async fn test_lists_all_pages_filtered_and_sorted() {
        let lister = ObjectLister::new(Arc::new(store()));
        let keys = lister.list_candidates("b", "event/").await.unwrap();
        assert_eq!(
            keys,
            vec!["event/a.jpg", "event/b.png", "event/c.JPG", "event/d.jpeg"]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let lister =
            ObjectLister::new(Arc::new(InMemoryObjectStore::new().with_list_failure("denied")));
        let err = lister.list_candidates("b", "event/").await.unwrap_err();
        assert!(matches!(err, SmritiError::Listing { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let store = Arc::new(store());
        let lister = ObjectLister::new(store.clone());
        let cache = ListingCache::new(Duration::from_secs(600));

        let first = cache.get_or_list(&lister, "b", "event/").await.unwrap();
        assert_eq!(first.len(), 4);

        store.insert("b", "event/e.jpg", b"e".to_vec());
        let cached = cache.get_or_list(&lister, "b", "event/").await.unwrap();
        assert_eq!(cached.len(), 4);

        tokio::time::advance(Duration::from_secs(601)).await;
        let fresh = cache.get_or_list(&lister, "b", "event/").await.unwrap();
        assert_eq!(fresh.len(), 5);
    }

    #[tokio::test]
    async fn test_invalidate_forces_relist() {
        let store = Arc::new(store());
        let lister = ObjectLister::new(store.clone());
        let cache = ListingCache::new(Duration::from_secs(600));

        cache.get_or_list(&lister, "b", "event/").await.unwrap();
        store.insert("b", "event/e.jpg", b"e".to_vec());
        cache.invalidate("b", "event/");
        assert_eq!(cache.get_or_list(&lister, "b", "event/").await.unwrap().len(), 5);
    }
}
