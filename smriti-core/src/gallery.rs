//! Display links for matched photos.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::archive::base_name;
use crate::progress::SearchProgress;
use crate::store::ObjectStore;

/// Concurrent presign requests.
const PRESIGN_CONCURRENCY: usize = 8;

/// A matched photo with a time-limited URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryLink {
    pub key: String,
    pub name: String,
    pub url: String,
}

/// Presigned display URLs for every match, sorted by key.
///
/// Matches whose URL cannot be generated are left out.
pub async fn matched_links(
    store: &dyn ObjectStore,
    progress: &SearchProgress,
    expires_in: Duration,
) -> Vec<GalleryLink> {
    stream::iter(progress.matches.iter())
        .map(|key| async move {
            match store
                .presigned_get_url(&progress.bucket, key, expires_in)
                .await
            {
                Ok(url) => Some(GalleryLink {
                    key: key.clone(),
                    name: base_name(key).to_string(),
                    url,
                }),
                Err(e) => {
                    warn!(key = %key, error = %e, "Could not presign photo");
                    None
                }
            }
        })
        .buffered(PRESIGN_CONCURRENCY)
        .boxed()
        .filter_map(|link| async move { link })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::BatchOutcome;
    use crate::store::InMemoryObjectStore;

    #[tokio::test]
    async fn test_links_skip_missing_objects() {
        let store = InMemoryObjectStore::new()
            .with_object("bucket", "event/b.jpg", b"b".to_vec())
            .with_object("bucket", "event/a.jpg", b"a".to_vec());

        let mut progress = SearchProgress::new("bucket", "event/", "faces", "guest");
        progress.begin(vec![
            "event/a.jpg".into(),
            "event/b.jpg".into(),
            "event/gone.jpg".into(),
        ]);
        progress.record_batch(
            3,
            BatchOutcome {
                matches: ["event/b.jpg", "event/a.jpg", "event/gone.jpg"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                skipped: Vec::new(),
            },
        );

        let links = matched_links(&store, &progress, Duration::from_secs(3600)).await;
        let names: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
        assert_eq!(links[0].url, "memory://bucket/event/a.jpg?expires=3600");
    }
}
