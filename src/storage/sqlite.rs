use crate::analytics::models::{Click, Dimension};
use crate::analytics::storage::{BucketCount, ClickEntry, ClickStore, DimensionBucketCount};
use crate::analytics::window::{DateWindow, TimeUnit};
use crate::models::{LinkChanges, ShortenRow, ShortenedUrl};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

/// Unix timestamp of the start of the bucket containing `timestamp`.
/// Weeks start on Monday.
fn bucket_expr(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Minute => "(timestamp / 60) * 60",
        TimeUnit::Hour => "(timestamp / 3600) * 3600",
        TimeUnit::Day => "(timestamp / 86400) * 86400",
        TimeUnit::Week => {
            "CAST(strftime('%s', timestamp, 'unixepoch', 'start of day', 'weekday 0', '-6 days') AS INTEGER)"
        }
        TimeUnit::Month => {
            "CAST(strftime('%s', timestamp, 'unixepoch', 'start of month') AS INTEGER)"
        }
        TimeUnit::Year => "CAST(strftime('%s', timestamp, 'unixepoch', 'start of year') AS INTEGER)",
    }
}

const LINK_SELECT: &str = r#"
    SELECT s.id, s.title, s.original_url, s.created_at, s.is_active,
           (SELECT group_concat(t.tag, ',') FROM shorten_tags t WHERE t.shorten_id = s.id) AS tags
    FROM shortens s"#;

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shortens (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                original_url TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shorten_tags (
                shorten_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (shorten_id, tag)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_shorten_tags_tag ON shorten_tags(tag)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shorten_id INTEGER NOT NULL,
                platform TEXT NOT NULL,
                os TEXT NOT NULL,
                referer TEXT NOT NULL,
                ip TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_clicks_shorten_time ON clicks(shorten_id, timestamp)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create(
        &self,
        id: i64,
        title: &str,
        original_url: &str,
    ) -> StorageResult<ShortenedUrl> {
        let created_at = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO shortens (id, title, original_url, created_at, is_active)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(original_url)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(ShortenedUrl {
            id,
            title: title.to_string(),
            original_url: original_url.to_string(),
            created_at,
            is_active: true,
            tags: Vec::new(),
        })
    }

    async fn get(&self, id: i64) -> Result<Option<ShortenedUrl>> {
        let row = sqlx::query_as::<_, ShortenRow>(&format!("{LINK_SELECT} WHERE s.id = ?"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(ShortenedUrl::from))
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shortens WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count > 0)
    }

    async fn deactivate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE shortens SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE shortens SET is_active = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update(&self, id: i64, changes: &LinkChanges) -> Result<Option<ShortenedUrl>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE shortens
            SET title = COALESCE(?, title), original_url = COALESCE(?, original_url)
            WHERE id = ?
            "#,
        )
        .bind(changes.title.as_deref())
        .bind(changes.original_url.as_deref())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(tags) = &changes.tags {
            sqlx::query("DELETE FROM shorten_tags WHERE shorten_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for tag in tags {
                sqlx::query("INSERT OR IGNORE INTO shorten_tags (shorten_id, tag) VALUES (?, ?)")
                    .bind(id)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.get(id).await
    }

    async fn list(&self, limit: i64, offset: i64, tags: &[String]) -> Result<Vec<ShortenedUrl>> {
        let mut query = QueryBuilder::<Sqlite>::new(LINK_SELECT);
        if !tags.is_empty() {
            query.push(" WHERE s.id IN (SELECT shorten_id FROM shorten_tags WHERE tag IN (");
            let mut values = query.separated(", ");
            for tag in tags {
                values.push_bind(tag.as_str());
            }
            values.push_unseparated(") GROUP BY shorten_id HAVING COUNT(*) = ");
            query.push_bind(tags.len() as i64);
            query.push(")");
        }
        query.push(" ORDER BY s.created_at DESC, s.id DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let rows = query
            .build_query_as::<ShortenRow>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.into_iter().map(ShortenedUrl::from).collect())
    }

    async fn tags(&self) -> Result<Vec<String>> {
        let tags: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT tag FROM shorten_tags ORDER BY tag")
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(tags)
    }
}

#[async_trait]
impl ClickStore for SqliteStorage {
    async fn insert_click(&self, click: &Click) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clicks (shorten_id, platform, os, referer, ip, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(click.shorten_id)
        .bind(click.platform.as_str())
        .bind(&click.os)
        .bind(&click.referrer)
        .bind(&click.source_ip)
        .bind(click.timestamp.timestamp())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn count_clicks(&self, shorten_id: i64, window: &DateWindow) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM clicks WHERE shorten_id = ? AND timestamp BETWEEN ? AND ?",
        )
        .bind(shorten_id)
        .bind(window.start_ts())
        .bind(window.end_ts())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn bucket_counts(
        &self,
        shorten_id: i64,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> Result<Vec<BucketCount>> {
        let sql = format!(
            r#"
            SELECT {bucket} AS bucket, COUNT(*) AS count
            FROM clicks
            WHERE shorten_id = ? AND timestamp BETWEEN ? AND ?
            GROUP BY bucket
            ORDER BY bucket
            "#,
            bucket = bucket_expr(unit)
        );

        let rows = sqlx::query_as::<_, BucketCount>(&sql)
            .bind(shorten_id)
            .bind(window.start_ts())
            .bind(window.end_ts())
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows)
    }

    async fn dimension_bucket_counts(
        &self,
        shorten_id: i64,
        dimension: Dimension,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> Result<Vec<DimensionBucketCount>> {
        let sql = format!(
            r#"
            SELECT {column} AS name, {bucket} AS bucket, COUNT(*) AS count
            FROM clicks
            WHERE shorten_id = ? AND timestamp BETWEEN ? AND ?
            GROUP BY name, bucket
            ORDER BY bucket, name
            "#,
            column = dimension.column(),
            bucket = bucket_expr(unit)
        );

        let rows = sqlx::query_as::<_, DimensionBucketCount>(&sql)
            .bind(shorten_id)
            .bind(window.start_ts())
            .bind(window.end_ts())
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows)
    }

    async fn list_clicks(&self, shorten_id: i64, window: &DateWindow) -> Result<Vec<Click>> {
        let rows = sqlx::query_as::<_, ClickEntry>(
            r#"
            SELECT shorten_id, platform, os, referer, ip, timestamp
            FROM clicks
            WHERE shorten_id = ? AND timestamp BETWEEN ? AND ?
            ORDER BY timestamp, id
            "#,
        )
        .bind(shorten_id)
        .bind(window.start_ts())
        .bind(window.end_ts())
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter().map(ClickEntry::into_click).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::Platform;
    use chrono::{TimeZone, Utc};

    async fn storage() -> SqliteStorage {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    fn click_at(ts: chrono::DateTime<Utc>) -> Click {
        Click {
            shorten_id: 7,
            platform: Platform::Desktop,
            os: "Windows 10".to_string(),
            referrer: "Other".to_string(),
            source_ip: "203.0.113.7".to_string(),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_week_buckets_start_on_monday() {
        let storage = storage().await;
        // Sunday 2024-03-10 and Monday 2024-03-11
        for ts in [
            Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 11, 1, 0, 0).unwrap(),
        ] {
            storage.insert_click(&click_at(ts)).await.unwrap();
        }

        let window = DateWindow::parse("2024-03-01", "2024-03-31").unwrap();
        let rows = storage.bucket_counts(7, &window, TimeUnit::Week).await.unwrap();

        let monday_4th = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap().timestamp();
        let monday_11th = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap().timestamp();
        assert_eq!(
            rows,
            vec![
                BucketCount { bucket: monday_4th, count: 1 },
                BucketCount { bucket: monday_11th, count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_sql_buckets_match_time_unit_truncation() {
        let storage = storage().await;
        let ts = Utc.with_ymd_and_hms(2024, 7, 17, 13, 45, 31).unwrap();
        storage.insert_click(&click_at(ts)).await.unwrap();

        let window = DateWindow::parse("2024-07-17", "2024-07-17").unwrap();
        for unit in TimeUnit::ALL {
            let rows = storage.bucket_counts(7, &window, unit).await.unwrap();
            assert_eq!(rows.len(), 1, "{unit}");
            assert_eq!(rows[0].bucket, unit.truncate(ts).timestamp(), "{unit}");
        }
    }

    #[tokio::test]
    async fn test_create_conflict_on_existing_id() {
        let storage = storage().await;
        storage.create(100, "a", "https://a.example").await.unwrap();
        let err = storage.create(100, "b", "https://b.example").await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert!(storage.exists(100).await.unwrap());
        assert!(!storage.exists(101).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_replaces_tags_and_filters_list() {
        let storage = storage().await;
        storage.create(1, "one", "https://one.example").await.unwrap();
        storage.create(2, "two", "https://two.example").await.unwrap();

        let changes = LinkChanges {
            tags: Some(vec!["blog".to_string(), "promo".to_string()]),
            ..Default::default()
        };
        let updated = storage.update(1, &changes).await.unwrap().unwrap();
        assert_eq!(updated.tags, vec!["blog", "promo"]);
        assert_eq!(updated.title, "one");

        let changes = LinkChanges {
            title: Some("second".to_string()),
            tags: Some(vec!["blog".to_string()]),
            ..Default::default()
        };
        storage.update(2, &changes).await.unwrap().unwrap();

        let tagged = |tags: &[&str]| tags.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        let ids = |links: Vec<ShortenedUrl>| links.iter().map(|l| l.id).collect::<Vec<_>>();
        assert_eq!(ids(storage.list(10, 0, &tagged(&["blog"])).await.unwrap()), vec![2, 1]);
        assert_eq!(
            ids(storage.list(10, 0, &tagged(&["blog", "promo"])).await.unwrap()),
            vec![1]
        );
        assert!(storage.list(10, 0, &tagged(&["news"])).await.unwrap().is_empty());
        assert_eq!(storage.tags().await.unwrap(), vec!["blog", "promo"]);

        // replacing with an empty set clears every tag
        let changes = LinkChanges {
            tags: Some(Vec::new()),
            ..Default::default()
        };
        assert!(storage.update(1, &changes).await.unwrap().unwrap().tags.is_empty());
        assert_eq!(storage.tags().await.unwrap(), vec!["blog"]);

        assert!(storage.update(3, &changes).await.unwrap().is_none());
    }
}
