use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::analytics::{extract_client_ip, AnalyticsError, AnalyticsService, RecordOutcome};
use crate::config::AnalyticsConfig;
use crate::links::LinkResolver;

pub struct RedirectState {
    pub links: LinkResolver,
    pub analytics: Arc<AnalyticsService>,
    pub analytics_config: AnalyticsConfig,
    pub default_redirect_url: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

/// Redirect to the original URL and record the click.
///
/// Unknown keys go to the default destination; recording problems are logged
/// and never change the response.
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(key): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let url = match state.links.resolve(&key).await {
        Ok(url) => url,
        Err(AnalyticsError::InvalidParams(_) | AnalyticsError::NotFound(_)) => {
            return Redirect::to(&state.default_redirect_url).into_response();
        }
        Err(err) => return err.into_response(),
    };

    if !url.is_active {
        return (StatusCode::GONE, "This link has been deactivated").into_response();
    }

    let client_ip = extract_client_ip(&headers, addr.ip(), &state.analytics_config);
    let recorded = state
        .analytics
        .record_redirect_event(
            url.id,
            header_str(&headers, header::USER_AGENT),
            header_str(&headers, header::REFERER),
            client_ip,
            Utc::now(),
        )
        .await;

    match recorded {
        Ok(RecordOutcome::Recorded) | Ok(RecordOutcome::Skipped) => {}
        Err(err) => {
            tracing::warn!(key = %key, error = %err, "failed to record click");
        }
    }

    Redirect::to(&url.original_url).into_response()
}

pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
