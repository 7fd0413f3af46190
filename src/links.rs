//! Short link lifecycle: creation, lookup by key, edits, tags and (de)activation

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::keys;
use crate::models::{LinkChanges, ShortenedUrl, UpdateUrlRequest, TAG_SEPARATOR};
use crate::storage::{Storage, StorageError};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;
pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_TAG_CHARS: usize = 32;
pub const MAX_TAGS: usize = 10;

/// Resolves public keys to links. Expects a cached [`Storage`] in front of the
/// database; every mutation goes through that same storage so its cache stays
/// coherent.
#[derive(Clone)]
pub struct LinkResolver {
    storage: Arc<dyn Storage>,
}

impl LinkResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn resolve(&self, key: &str) -> AnalyticsResult<ShortenedUrl> {
        let id = keys::decode_id(key)?;
        self.storage
            .get(id)
            .await
            .map_err(|e| AnalyticsError::internal("GetShorten", e))?
            .ok_or_else(|| not_found(key))
    }

    /// Create a link under `key`, or under a random key when none is given.
    /// Without a title the destination's host is used.
    pub async fn create(
        &self,
        title: Option<&str>,
        original_url: &str,
        key: Option<&str>,
    ) -> AnalyticsResult<ShortenedUrl> {
        let original_url = validate_destination(original_url)?;
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => validate_title(title)?,
            None => default_title(&original_url),
        };

        let link = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => self.create_with_key(key, &title, &original_url).await?,
            None => self.create_with_random_key(&title, &original_url).await?,
        };

        info!(id = link.id, url = %link.original_url, "short link created");
        Ok(link)
    }

    async fn create_with_key(
        &self,
        key: &str,
        title: &str,
        original_url: &str,
    ) -> AnalyticsResult<ShortenedUrl> {
        let id = keys::decode_id(key)?;
        match self.storage.create(id, title, original_url).await {
            Ok(link) => Ok(link),
            Err(StorageError::Conflict) => Err(AnalyticsError::Conflict(format!(
                "short link '{key}' already exists"
            ))),
            Err(StorageError::Other(e)) => Err(AnalyticsError::internal("CreateShorten", e)),
        }
    }

    async fn create_with_random_key(
        &self,
        title: &str,
        original_url: &str,
    ) -> AnalyticsResult<ShortenedUrl> {
        keys::generate_unique_id(|id| {
            let storage = self.storage.clone();
            async move {
                if storage.exists(id).await? {
                    return Ok(None);
                }
                match storage.create(id, title, original_url).await {
                    Ok(link) => Ok(Some(link)),
                    Err(StorageError::Conflict) => Ok(None),
                    Err(StorageError::Other(e)) => Err(e),
                }
            }
        })
        .await
        .map_err(|e| e.with_scope("CreateShorten"))
    }

    /// Overwrite title, destination and tags. Absent fields and blank titles
    /// are left unchanged; a tag list replaces the current tags.
    pub async fn update(
        &self,
        key: &str,
        request: &UpdateUrlRequest,
    ) -> AnalyticsResult<ShortenedUrl> {
        let id = keys::decode_id(key)?;
        let changes = LinkChanges {
            title: request
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(validate_title)
                .transpose()?,
            original_url: request
                .url
                .as_deref()
                .map(validate_destination)
                .transpose()?,
            tags: request.tags.as_deref().map(normalize_tags).transpose()?,
        };

        let link = self
            .storage
            .update(id, &changes)
            .await
            .map_err(|e| AnalyticsError::internal("UpdateShorten", e))?
            .ok_or_else(|| not_found(key))?;

        info!(id = link.id, "short link updated");
        Ok(link)
    }

    pub async fn set_active(&self, key: &str, active: bool) -> AnalyticsResult<ShortenedUrl> {
        let id = keys::decode_id(key)?;
        let result = if active {
            self.storage.reactivate(id).await
        } else {
            self.storage.deactivate(id).await
        };

        let changed = result.map_err(|e| AnalyticsError::internal("UpdateShorten", e))?;
        if !changed {
            return Err(not_found(key));
        }
        self.resolve(key).await
    }

    /// Newest first. `tags` is a comma-separated filter; a link must carry every tag.
    pub async fn list(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
        tags: Option<&str>,
    ) -> AnalyticsResult<Vec<ShortenedUrl>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);
        let tags = parse_tag_filter(tags.unwrap_or_default());
        self.storage
            .list(limit, offset, &tags)
            .await
            .map_err(|e| AnalyticsError::internal("ListShortens", e))
    }

    pub async fn tags(&self) -> AnalyticsResult<Vec<String>> {
        self.storage
            .tags()
            .await
            .map_err(|e| AnalyticsError::internal("ListTags", e))
    }
}

fn not_found(key: &str) -> AnalyticsError {
    AnalyticsError::NotFound(format!("short link '{key}' not found"))
}

/// Only absolute http(s) URLs are accepted as destinations
pub fn validate_destination(raw: &str) -> AnalyticsResult<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AnalyticsError::invalid(format!("url is invalid: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.into()),
        _ => Err(AnalyticsError::invalid(
            "url is invalid, expected an http or https address",
        )),
    }
}

fn validate_title(title: &str) -> AnalyticsResult<String> {
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AnalyticsError::invalid(format!(
            "title is too long, at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn default_title(original_url: &str) -> String {
    Url::parse(original_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Trimmed, deduplicated and sorted
pub fn normalize_tags(tags: &[String]) -> AnalyticsResult<Vec<String>> {
    let mut normalized = BTreeSet::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || tag.contains(TAG_SEPARATOR) {
            return Err(AnalyticsError::invalid(format!(
                "tag '{tag}' is invalid, tags must be non-empty and contain no commas"
            )));
        }
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(AnalyticsError::invalid(format!(
                "tag '{tag}' is too long, at most {MAX_TAG_CHARS} characters"
            )));
        }
        normalized.insert(tag.to_string());
    }

    if normalized.len() > MAX_TAGS {
        return Err(AnalyticsError::invalid(format!(
            "too many tags, at most {MAX_TAGS} per link"
        )));
    }
    Ok(normalized.into_iter().collect())
}

fn parse_tag_filter(raw: &str) -> Vec<String> {
    raw.split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CachedStorage, SqliteStorage};

    async fn resolver() -> LinkResolver {
        let inner = Arc::new(SqliteStorage::new("sqlite::memory:", 1).await.unwrap());
        inner.init().await.unwrap();
        LinkResolver::new(Arc::new(CachedStorage::new(inner, 100, 60)))
    }

    #[test]
    fn test_validate_destination() {
        assert_eq!(
            validate_destination("https://example.com/a?b=c").unwrap(),
            "https://example.com/a?b=c"
        );
        assert!(validate_destination("ftp://example.com").is_err());
        assert!(validate_destination("javascript:alert(1)").is_err());
        assert!(validate_destination("not a url").is_err());
    }

    #[tokio::test]
    async fn test_create_then_resolve_by_key() {
        let resolver = resolver().await;
        let link = resolver
            .create(Some(" Launch "), "https://example.com/launch", None)
            .await
            .unwrap();
        assert_eq!(link.title, "Launch");

        let resolved = resolver.resolve(&link.key()).await.unwrap();
        assert_eq!(resolved, link);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let resolver = resolver().await;
        assert!(matches!(
            resolver.resolve("not-a-key").await,
            Err(AnalyticsError::InvalidParams(_))
        ));
        assert!(matches!(
            resolver.resolve("zzzzzz").await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_active_round_trip() {
        let resolver = resolver().await;
        let link = resolver.create(None, "https://example.com", None).await.unwrap();
        let key = link.key();

        assert!(!resolver.set_active(&key, false).await.unwrap().is_active);
        assert!(resolver.set_active(&key, true).await.unwrap().is_active);
        assert!(matches!(
            resolver.set_active("zzzzzz", false).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_with_chosen_key() {
        let resolver = resolver().await;
        let link = resolver
            .create(None, "https://docs.example.com/start", Some("docs42"))
            .await
            .unwrap();
        assert_eq!(link.key(), "docs42");
        assert_eq!(link.title, "docs.example.com");

        let err = resolver
            .create(None, "https://example.com/other", Some("docs42"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Conflict(_)));

        for bad in ["docs-42", "0docs"] {
            assert!(matches!(
                resolver.create(None, "https://example.com", Some(bad)).await,
                Err(AnalyticsError::InvalidParams(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_update_fields_and_tags() {
        let resolver = resolver().await;
        let link = resolver
            .create(Some("Old"), "https://example.com/old", None)
            .await
            .unwrap();
        let key = link.key();
        // warm the cache so the update has to invalidate it
        resolver.resolve(&key).await.unwrap();

        let request = UpdateUrlRequest {
            title: Some("  ".to_string()),
            url: Some("https://example.com/new".to_string()),
            tags: Some(vec![" promo ".to_string(), "blog".to_string(), "promo".to_string()]),
        };
        let updated = resolver.update(&key, &request).await.unwrap();
        assert_eq!(updated.title, "Old");
        assert_eq!(updated.original_url, "https://example.com/new");
        assert_eq!(updated.tags, vec!["blog", "promo"]);
        assert_eq!(resolver.resolve(&key).await.unwrap(), updated);

        let tagged = resolver.list(None, None, Some("promo, blog")).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert!(resolver.list(None, None, Some("news")).await.unwrap().is_empty());
        assert_eq!(resolver.tags().await.unwrap(), vec!["blog", "promo"]);

        assert!(matches!(
            resolver.update("zzzzzz", &UpdateUrlRequest::default()).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_validation() {
        let resolver = resolver().await;
        let key = resolver
            .create(None, "https://example.com", None)
            .await
            .unwrap()
            .key();

        let long_title = UpdateUrlRequest {
            title: Some("x".repeat(MAX_TITLE_CHARS + 1)),
            ..Default::default()
        };
        let bad_url = UpdateUrlRequest {
            url: Some("ftp://example.com".to_string()),
            ..Default::default()
        };
        let bad_tag = UpdateUrlRequest {
            tags: Some(vec!["a,b".to_string()]),
            ..Default::default()
        };
        for request in [long_title, bad_url, bad_tag] {
            assert!(matches!(
                resolver.update(&key, &request).await,
                Err(AnalyticsError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn test_normalize_tags_limits() {
        let many: Vec<String> = (0..=MAX_TAGS).map(|i| format!("t{i}")).collect();
        assert!(normalize_tags(&many).is_err());
        assert!(normalize_tags(&["".to_string()]).is_err());
        assert!(normalize_tags(&["x".repeat(MAX_TAG_CHARS + 1)]).is_err());
        assert!(normalize_tags(&[]).unwrap().is_empty());
    }
}
