use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::config::LinkConfig;
use crate::keys;

/// Tags are stored one row each and aggregated back with this separator
pub const TAG_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenedUrl {
    pub id: i64,
    pub title: String,
    pub original_url: String,
    pub created_at: i64,
    pub is_active: bool,
    pub tags: Vec<String>,
}

impl ShortenedUrl {
    pub fn key(&self) -> String {
        keys::encode(self.id as u64)
    }
}

/// Link row with its tags aggregated into one separated column
#[derive(Debug, FromRow)]
pub struct ShortenRow {
    pub id: i64,
    pub title: String,
    pub original_url: String,
    pub created_at: i64,
    pub is_active: bool,
    pub tags: Option<String>,
}

impl From<ShortenRow> for ShortenedUrl {
    fn from(row: ShortenRow) -> Self {
        let mut tags: Vec<String> = row
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(TAG_SEPARATOR)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        tags.sort();

        Self {
            id: row.id,
            title: row.title,
            original_url: row.original_url,
            created_at: row.created_at,
            is_active: row.is_active,
            tags,
        }
    }
}

/// Fields to overwrite on an existing link; `None` leaves a field as is.
/// `tags` replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct LinkChanges {
    pub title: Option<String>,
    pub original_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Caller-chosen short key
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUrlRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Comma-separated; only links carrying every tag are listed
    pub tags: Option<String>,
}

/// Link as returned by the API, with its key and public short URL
#[derive(Debug, Clone, Serialize)]
pub struct LinkResponse {
    pub key: String,
    pub short_url: String,
    #[serde(flatten)]
    pub url: ShortenedUrl,
}

impl LinkResponse {
    pub fn new(url: ShortenedUrl, links: &LinkConfig) -> Self {
        let key = url.key();
        Self {
            short_url: links.short_url(&key),
            key,
            url,
        }
    }
}
