//! Caching layer for knowledge-base lookups

use crate::company::CompanyRecord;
use cached::{Cached, TimedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Outcome of a successful lookup: `None` when the id matched no company
pub type Resolution = Option<Vec<CompanyRecord>>;

/// Thread-safe TTL cache of resolutions keyed by entity id
///
/// Only successful lookups are stored, so a failed query is retried the next
/// time the entity shows up.
pub struct ResolutionCache {
    cache: Arc<RwLock<TimedCache<String, Resolution>>>,
}

impl ResolutionCache {
    /// Create a new cache with specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    /// Get a cached resolution
    pub async fn get(&self, entity_id: &str) -> Option<Resolution> {
        let mut cache = self.cache.write().await;
        cache.cache_get(&entity_id.to_string()).cloned()
    }

    /// Store a resolution
    pub async fn insert(&self, entity_id: impl Into<String>, resolution: Resolution) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(entity_id.into(), resolution);
    }

    /// Get or fetch a resolution using the provided fetcher function
    ///
    /// Errors from the fetcher are returned and not cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        entity_id: &str,
        fetcher: F,
    ) -> Result<Resolution, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Resolution, E>>,
    {
        if let Some(resolution) = self.get(entity_id).await {
            tracing::debug!("Cache hit for entity: {}", entity_id);
            return Ok(resolution);
        }

        tracing::debug!("Cache miss for entity: {}", entity_id);

        let resolution = fetcher().await?;
        self.insert(entity_id, resolution.clone()).await;

        Ok(resolution)
    }
}

impl Clone for ResolutionCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}
