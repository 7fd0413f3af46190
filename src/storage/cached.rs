use crate::models::{LinkChanges, ShortenedUrl};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Storage wrapper with a read cache for link lookups.
///
/// Misses are cached too, so unknown keys hammered by scanners do not reach
/// the database on every request.
pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    read_cache: Cache<i64, Option<ShortenedUrl>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }

    async fn invalidate_cache(&self, id: i64) {
        self.read_cache.invalidate(&id).await;
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create(
        &self,
        id: i64,
        title: &str,
        original_url: &str,
    ) -> StorageResult<ShortenedUrl> {
        let result = self.inner.create(id, title, original_url).await?;

        // replaces a cached miss for the same id
        self.read_cache.insert(id, Some(result.clone())).await;

        Ok(result)
    }

    async fn get(&self, id: i64) -> Result<Option<ShortenedUrl>> {
        if let Some(cached) = self.read_cache.get(&id).await {
            return Ok(cached);
        }

        let result = self.inner.get(id).await?;
        self.read_cache.insert(id, result.clone()).await;

        Ok(result)
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        self.inner.exists(id).await
    }

    async fn deactivate(&self, id: i64) -> Result<bool> {
        let result = self.inner.deactivate(id).await?;

        if result {
            self.invalidate_cache(id).await;
        }

        Ok(result)
    }

    async fn reactivate(&self, id: i64) -> Result<bool> {
        let result = self.inner.reactivate(id).await?;

        if result {
            self.invalidate_cache(id).await;
        }

        Ok(result)
    }

    async fn update(&self, id: i64, changes: &LinkChanges) -> Result<Option<ShortenedUrl>> {
        let result = self.inner.update(id, changes).await?;

        if result.is_some() {
            self.invalidate_cache(id).await;
        }

        Ok(result)
    }

    async fn list(&self, limit: i64, offset: i64, tags: &[String]) -> Result<Vec<ShortenedUrl>> {
        self.inner.list(limit, offset, tags).await
    }

    async fn tags(&self) -> Result<Vec<String>> {
        self.inner.tags().await
    }
}
