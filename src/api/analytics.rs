//! Stats API handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::analytics::{AnalyticsError, AnalyticsResult, ExportSubject, PeriodDelta, StatsReport};

use super::handlers::{ApiResponse, AppState};

/// Raw query parameters. Validation happens in the analytics layer so
/// malformed input gets the same error body as every other failure.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub unit: String,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<StatsQuery>,
) -> AnalyticsResult<Json<ApiResponse<StatsReport>>> {
    let link = state.links.resolve(&key).await?;
    let report = state
        .analytics
        .stats_report(link.id, &query.from, &query.to, &query.unit)
        .await?;

    Ok(ApiResponse::new(report))
}

pub async fn get_stats_summary(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<StatsQuery>,
) -> AnalyticsResult<Json<ApiResponse<PeriodDelta>>> {
    let link = state.links.resolve(&key).await?;
    let delta = state
        .analytics
        .period_summary(link.id, &query.from, &query.to)
        .await?;

    Ok(ApiResponse::new(delta))
}

/// Build the CSV export, stream it back as an attachment and remove the file
pub async fn export_stats(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<StatsQuery>,
) -> AnalyticsResult<Response> {
    let link = state.links.resolve(&key).await?;
    let key = link.key();
    let subject = ExportSubject {
        shorten_id: link.id,
        short_url: state.link_config.short_url(&key),
        key,
        title: link.title,
        long_url: link.original_url,
    };

    let path = state
        .analytics
        .export_stats_report(&subject, &query.from, &query.to)
        .await?;

    let body = tokio::fs::read(&path).await;
    if let Err(err) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), "failed to remove export file: {}", err);
    }
    let body = body.map_err(|e| AnalyticsError::internal("ExportStats.Read", e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.csv", subject.key));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response())
}
