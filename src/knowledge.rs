//! Knowledge blob cache
//!
//! Holds the text of the knowledge document for a fixed interval and
//! refetches lazily on the first read after it goes stale. There is no
//! single-flight guard: readers racing on a stale blob may each fetch, and
//! the last successful fetch wins.

use crate::relay::DocumentSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const KNOWLEDGE_TTL: Duration = Duration::from_secs(10 * 60);

/// Returned when no fetch has ever succeeded
pub const KNOWLEDGE_PLACEHOLDER: &str = "Knowledge base temporarily unavailable.";

struct KnowledgeBlob {
    text: String,
    fetched_at: Instant,
}

pub struct KnowledgeCache {
    source: Arc<dyn DocumentSource>,
    ttl: Duration,
    blob: RwLock<Option<KnowledgeBlob>>,
}

impl KnowledgeCache {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self::with_ttl(source, KNOWLEDGE_TTL)
    }

    pub fn with_ttl(source: Arc<dyn DocumentSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            blob: RwLock::new(None),
        }
    }

    /// Current knowledge text. Never empty: a failed or empty fetch falls back
    /// to the last good text, then to [`KNOWLEDGE_PLACEHOLDER`].
    pub async fn get(&self) -> String {
        {
            let blob = self.blob.read().await;
            if let Some(blob) = blob.as_ref() {
                if blob.fetched_at.elapsed() < self.ttl {
                    return blob.text.clone();
                }
            }
        }

        match self.source.fetch_text().await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(chars = text.len(), "Knowledge base fetched and cached");
                self.set(text.clone()).await;
                text
            }
            Ok(_) => {
                tracing::warn!("Knowledge document is empty; keeping previous text");
                self.fallback().await
            }
            Err(e) if e.is_not_configured() => {
                tracing::debug!(error = %e, "Knowledge document not configured");
                self.fallback().await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch knowledge base");
                self.fallback().await
            }
        }
    }

    /// Replace the cached text and restart its freshness interval
    pub async fn set(&self, text: String) {
        *self.blob.write().await = Some(KnowledgeBlob {
            text,
            fetched_at: Instant::now(),
        });
    }

    /// Forget the cached text so the next `get` refetches
    #[allow(dead_code)] // API completeness
    pub async fn evict(&self) -> bool {
        self.blob.write().await.take().is_some()
    }

    async fn fallback(&self) -> String {
        self.blob
            .read()
            .await
            .as_ref()
            .map_or_else(|| KNOWLEDGE_PLACEHOLDER.to_string(), |b| b.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::relay::testing::MockDocumentSource;

    fn outage() -> UpstreamError {
        UpstreamError::Status {
            service: "Google",
            status: 503,
            body: "backend error".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_reads_within_ttl_fetch_once() {
        let source = Arc::new(MockDocumentSource::new());
        source.queue_text("Service areas: 90210");
        let cache = KnowledgeCache::new(source.clone());

        assert_eq!(cache.get().await, "Service areas: 90210");
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get().await, "Service areas: 90210");
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_after_ttl() {
        let source = Arc::new(MockDocumentSource::new());
        source.queue_text("v1");
        source.queue_text("v2");
        let cache = KnowledgeCache::new(source.clone());

        assert_eq!(cache.get().await, "v1");
        tokio::time::advance(KNOWLEDGE_TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.get().await, "v2");
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_stale_text() {
        let source = Arc::new(MockDocumentSource::new());
        source.queue_text("v1");
        source.queue_error(outage());
        let cache = KnowledgeCache::new(source.clone());

        assert_eq!(cache.get().await, "v1");
        tokio::time::advance(KNOWLEDGE_TTL).await;
        assert_eq!(cache.get().await, "v1");
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn first_failure_returns_placeholder() {
        let source = Arc::new(MockDocumentSource::new());
        source.queue_error(outage());
        let cache = KnowledgeCache::new(source.clone());

        assert_eq!(cache.get().await, KNOWLEDGE_PLACEHOLDER);
    }

    #[tokio::test]
    async fn empty_document_is_not_cached() {
        let source = Arc::new(MockDocumentSource::new());
        source.queue_text("   ");
        source.queue_text("now with content");
        let cache = KnowledgeCache::new(source.clone());

        assert_eq!(cache.get().await, KNOWLEDGE_PLACEHOLDER);
        assert_eq!(cache.get().await, "now with content");
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn evict_forces_refetch_and_set_seeds() {
        let source = Arc::new(MockDocumentSource::new());
        source.queue_text("fetched");
        let cache = KnowledgeCache::new(source.clone());

        cache.set("seeded".to_string()).await;
        assert_eq!(cache.get().await, "seeded");
        assert_eq!(source.fetch_count(), 0);

        assert!(cache.evict().await);
        assert_eq!(cache.get().await, "fetched");
        assert_eq!(source.fetch_count(), 1);
        assert!(cache.evict().await);
        assert!(!cache.evict().await);
    }
}
