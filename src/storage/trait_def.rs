use crate::models::{LinkChanges, ShortenedUrl};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("link id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the link, tag and click tables if they do not exist yet
    async fn init(&self) -> Result<()>;

    /// Insert a link under a caller-chosen id. Fails with `Conflict` if the id is taken.
    async fn create(&self, id: i64, title: &str, original_url: &str)
        -> StorageResult<ShortenedUrl>;

    async fn get(&self, id: i64) -> Result<Option<ShortenedUrl>>;

    async fn exists(&self, id: i64) -> Result<bool>;

    /// Deactivate a link (soft delete). Returns false if no such link.
    async fn deactivate(&self, id: i64) -> Result<bool>;

    async fn reactivate(&self, id: i64) -> Result<bool>;

    /// Apply `changes` in one transaction. Returns the updated link, or `None` if no such link.
    async fn update(&self, id: i64, changes: &LinkChanges) -> Result<Option<ShortenedUrl>>;

    /// Newest first. A non-empty `tags` keeps only links carrying all of them;
    /// callers pass each tag once.
    async fn list(&self, limit: i64, offset: i64, tags: &[String]) -> Result<Vec<ShortenedUrl>>;

    /// Every tag in use, sorted
    async fn tags(&self) -> Result<Vec<String>>;
}
