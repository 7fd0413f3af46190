//! Click storage rows and the store abstraction the analytics pipeline reads from

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::models::{Click, Dimension, Platform};
use crate::analytics::window::{DateWindow, TimeUnit};

/// Click row as stored in the database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClickEntry {
    pub shorten_id: i64,
    pub platform: String,
    pub os: String,
    pub referer: String,
    pub ip: String,
    pub timestamp: i64,
}

impl ClickEntry {
    pub fn into_click(self) -> Result<Click> {
        let timestamp = DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .ok_or_else(|| anyhow::anyhow!("click timestamp {} out of range", self.timestamp))?;

        Ok(Click {
            shorten_id: self.shorten_id,
            platform: Platform::from(self.platform.as_str()),
            os: self.os,
            referrer: self.referer,
            source_ip: self.ip,
            timestamp,
        })
    }
}

/// `(bucket, count)` row of a grouped click query. `bucket` is a unix timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct BucketCount {
    pub bucket: i64,
    pub count: i64,
}

/// `(name, bucket, count)` row of a grouped breakdown query
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DimensionBucketCount {
    pub name: String,
    pub bucket: i64,
    pub count: i64,
}

/// Append-only click log with time-bucketed read queries.
///
/// Grouped queries return only buckets that contain clicks; filling the gaps is
/// the aggregation engine's job.
#[async_trait]
pub trait ClickStore: Send + Sync {
    async fn insert_click(&self, click: &Click) -> Result<()>;

    async fn count_clicks(&self, shorten_id: i64, window: &DateWindow) -> Result<i64>;

    async fn bucket_counts(
        &self,
        shorten_id: i64,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> Result<Vec<BucketCount>>;

    async fn dimension_bucket_counts(
        &self,
        shorten_id: i64,
        dimension: Dimension,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> Result<Vec<DimensionBucketCount>>;

    /// Raw clicks in chronological order
    async fn list_clicks(&self, shorten_id: i64, window: &DateWindow) -> Result<Vec<Click>>;
}
