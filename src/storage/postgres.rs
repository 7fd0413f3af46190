use crate::analytics::models::{Click, Dimension};
use crate::analytics::storage::{BucketCount, ClickEntry, ClickStore, DimensionBucketCount};
use crate::analytics::window::{DateWindow, TimeUnit};
use crate::models::{LinkChanges, ShortenRow, ShortenedUrl};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn bucket_expr(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Minute => "(timestamp / 60) * 60",
        TimeUnit::Hour => "(timestamp / 3600) * 3600",
        TimeUnit::Day => "(timestamp / 86400) * 86400",
        TimeUnit::Week => {
            "CAST(EXTRACT(EPOCH FROM date_trunc('week', to_timestamp(timestamp) AT TIME ZONE 'UTC')) AS BIGINT)"
        }
        TimeUnit::Month => {
            "CAST(EXTRACT(EPOCH FROM date_trunc('month', to_timestamp(timestamp) AT TIME ZONE 'UTC')) AS BIGINT)"
        }
        TimeUnit::Year => {
            "CAST(EXTRACT(EPOCH FROM date_trunc('year', to_timestamp(timestamp) AT TIME ZONE 'UTC')) AS BIGINT)"
        }
    }
}

const LINK_SELECT: &str = r#"
    SELECT s.id, s.title, s.original_url, s.created_at, s.is_active,
           (SELECT string_agg(t.tag, ',' ORDER BY t.tag)
            FROM shorten_tags t WHERE t.shorten_id = s.id) AS tags
    FROM shortens s"#;

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shortens (
                id BIGINT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                original_url TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shorten_tags (
                shorten_id BIGINT NOT NULL,
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
                id BIGSERIAL PRIMARY KEY,
                shorten_id BIGINT NOT NULL,
                platform TEXT NOT NULL,
                os TEXT NOT NULL,
                referer TEXT NOT NULL,
                ip TEXT NOT NULL,
                timestamp BIGINT NOT NULL
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

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO shortens (id, title, original_url, created_at, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(original_url)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if inserted.is_none() {
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
        let row = sqlx::query_as::<_, ShortenRow>(&format!("{LINK_SELECT} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(ShortenedUrl::from))
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shortens WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count.0 > 0)
    }

    async fn deactivate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE shortens SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE shortens SET is_active = TRUE WHERE id = $1")
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
            SET title = COALESCE($1, title), original_url = COALESCE($2, original_url)
            WHERE id = $3
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
            sqlx::query("DELETE FROM shorten_tags WHERE shorten_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO shorten_tags (shorten_id, tag)
                SELECT $1, tag FROM UNNEST($2::TEXT[]) AS tag
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(tags)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get(id).await
    }

    async fn list(&self, limit: i64, offset: i64, tags: &[String]) -> Result<Vec<ShortenedUrl>> {
        let mut query = QueryBuilder::<Postgres>::new(LINK_SELECT);
        if !tags.is_empty() {
            query.push(" WHERE s.id IN (SELECT shorten_id FROM shorten_tags WHERE tag = ANY(");
            query.push_bind(tags);
            query.push(") GROUP BY shorten_id HAVING COUNT(*) = ");
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
impl ClickStore for PostgresStorage {
    async fn insert_click(&self, click: &Click) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clicks (shorten_id, platform, os, referer, ip, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
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
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM clicks WHERE shorten_id = $1 AND timestamp BETWEEN $2 AND $3",
        )
        .bind(shorten_id)
        .bind(window.start_ts())
        .bind(window.end_ts())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count.0)
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
            WHERE shorten_id = $1 AND timestamp BETWEEN $2 AND $3
            GROUP BY 1
            ORDER BY 1
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
            WHERE shorten_id = $1 AND timestamp BETWEEN $2 AND $3
            GROUP BY 1, 2
            ORDER BY 2, 1
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
            WHERE shorten_id = $1 AND timestamp BETWEEN $2 AND $3
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
