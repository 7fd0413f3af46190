//! Time-bucketed click aggregation
//!
//! The engine asks the click store for sparse grouped counts and turns them into
//! report shapes. The top-level click series is dense: the bucket axis is
//! enumerated from the window independently of the data and the counts are
//! left-joined onto it, so a plain `GROUP BY bucket` that drops empty buckets
//! never leaks into the output. Breakdown series stay sparse.
//!
//! Every storage call runs under a deadline and failures are tagged with the
//! scope of the failing operation. There is no retry and no partial result.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::analytics::models::{
    Click, ClickMetric, ClickSeriesPoint, Dimension, Metric, MetricSeriesPoint, PeriodDelta,
};
use crate::analytics::storage::{BucketCount, ClickStore};
use crate::analytics::window::{DateWindow, TimeUnit};

pub const DEFAULT_QUERY_DEADLINE: Duration = Duration::from_secs(30);

pub struct AggregationEngine {
    store: Arc<dyn ClickStore>,
    deadline: Duration,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn ClickStore>) -> Self {
        Self {
            store,
            deadline: DEFAULT_QUERY_DEADLINE,
        }
    }

    /// Deadline applied to each storage call
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    async fn run<T, F>(&self, scope: &'static str, query: F) -> AnalyticsResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.deadline, query).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(AnalyticsError::internal(scope, err)),
            Err(_) => Err(AnalyticsError::Cancelled { scope }),
        }
    }

    /// Number of clicks for the link inside the window
    pub async fn total_clicks(&self, shorten_id: i64, window: &DateWindow) -> AnalyticsResult<i64> {
        self.run(
            "GetClicksSummary",
            self.store.count_clicks(shorten_id, window),
        )
        .await
    }

    /// Dense click series: one point per bucket of the window, zero-filled
    pub async fn click_series(
        &self,
        shorten_id: i64,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> AnalyticsResult<ClickMetric> {
        let axis = window.axis(unit)?;
        let rows = self
            .run(
                "GetStats.SelectClickMetric",
                self.store.bucket_counts(shorten_id, window, unit),
            )
            .await?;

        let values = fill_axis(&axis, &rows);
        let total = values.iter().map(|point| point.count).sum();

        Ok(ClickMetric { total, values })
    }

    /// Per-value breakdown of one dimension, ordered by total (descending) then name.
    /// Values that never occurred in the window are absent.
    pub async fn breakdown(
        &self,
        shorten_id: i64,
        dimension: Dimension,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> AnalyticsResult<Vec<Metric>> {
        let scope = dimension.scope();
        let rows = self
            .run(
                scope,
                self.store
                    .dimension_bucket_counts(shorten_id, dimension, window, unit),
            )
            .await?;

        let points = rows
            .into_iter()
            .map(|row| {
                let timestamp =
                    bucket_time(row.bucket).map_err(|e| AnalyticsError::internal(scope, e))?;
                Ok(MetricSeriesPoint {
                    timestamp,
                    name: row.name,
                    count: row.count,
                })
            })
            .collect::<AnalyticsResult<Vec<_>>>()?;

        Ok(group_by_name(points))
    }

    /// Window total against the preceding window of identical length
    pub async fn period_delta(
        &self,
        shorten_id: i64,
        window: &DateWindow,
    ) -> AnalyticsResult<PeriodDelta> {
        let previous_window = window.previous();
        let (total, previous) = tokio::try_join!(
            self.total_clicks(shorten_id, window),
            async {
                self.total_clicks(shorten_id, &previous_window)
                    .await
                    .map_err(|e| e.with_scope("GetClicksSummary.Previous"))
            },
        )?;

        Ok(PeriodDelta::new(total, previous))
    }

    /// Individual clicks in chronological order, unbucketed
    pub async fn clicks(
        &self,
        shorten_id: i64,
        window: &DateWindow,
    ) -> AnalyticsResult<Vec<Click>> {
        self.run("SelectClicks", self.store.list_clicks(shorten_id, window)).await
    }
}

fn bucket_time(bucket: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(bucket, 0)
        .ok_or_else(|| anyhow::anyhow!("bucket {bucket} is not a valid timestamp"))
}

/// Left-join sparse bucket counts onto the full axis
fn fill_axis(axis: &[DateTime<Utc>], rows: &[BucketCount]) -> Vec<ClickSeriesPoint> {
    let mut counts: HashMap<i64, i64> = HashMap::with_capacity(rows.len());
    for row in rows {
        *counts.entry(row.bucket).or_insert(0) += row.count;
    }

    let values: Vec<ClickSeriesPoint> = axis
        .iter()
        .map(|bucket| ClickSeriesPoint {
            timestamp: *bucket,
            count: counts.remove(&bucket.timestamp()).unwrap_or(0),
        })
        .collect();

    if !counts.is_empty() {
        warn!(
            orphaned = counts.len(),
            "grouped click rows fell outside the bucket axis"
        );
    }

    values
}

fn group_by_name(points: Vec<MetricSeriesPoint>) -> Vec<Metric> {
    let mut metrics: Vec<Metric> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for point in points {
        let slot = *index.entry(point.name.clone()).or_insert_with(|| {
            metrics.push(Metric {
                name: point.name.clone(),
                total: 0,
                values: Vec::new(),
            });
            metrics.len() - 1
        });

        let metric = &mut metrics[slot];
        metric.total += point.count;
        metric.values.push(ClickSeriesPoint {
            timestamp: point.timestamp,
            count: point.count,
        });
    }

    for metric in &mut metrics {
        metric.values.sort_by_key(|point| point.timestamp);
    }
    metrics.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    metrics
}
