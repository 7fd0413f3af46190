use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::{AnalyticsResult, AnalyticsService};
use crate::config::LinkConfig;
use crate::links::LinkResolver;
use crate::models::{CreateUrlRequest, LinkResponse, ListQuery, UpdateUrlRequest};

pub struct AppState {
    pub links: LinkResolver,
    pub analytics: Arc<AnalyticsService>,
    pub link_config: LinkConfig,
}

/// Successful payloads are wrapped as `{"response": ...}`
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub response: T,
}

impl<T> ApiResponse<T> {
    pub fn new(response: T) -> Json<Self> {
        Json(Self { response })
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub async fn create_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUrlRequest>,
) -> AnalyticsResult<(StatusCode, Json<ApiResponse<LinkResponse>>)> {
    let url = state
        .links
        .create(payload.title.as_deref(), &payload.url, payload.key.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(LinkResponse::new(url, &state.link_config)),
    ))
}

pub async fn get_url(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> AnalyticsResult<Json<ApiResponse<LinkResponse>>> {
    let url = state.links.resolve(&key).await?;
    Ok(ApiResponse::new(LinkResponse::new(url, &state.link_config)))
}

pub async fn update_url(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(payload): Json<UpdateUrlRequest>,
) -> AnalyticsResult<Json<ApiResponse<LinkResponse>>> {
    let url = state.links.update(&key, &payload).await?;
    Ok(ApiResponse::new(LinkResponse::new(url, &state.link_config)))
}

pub async fn deactivate_url(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> AnalyticsResult<Json<ApiResponse<LinkResponse>>> {
    let url = state.links.set_active(&key, false).await?;
    Ok(ApiResponse::new(LinkResponse::new(url, &state.link_config)))
}

pub async fn reactivate_url(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> AnalyticsResult<Json<ApiResponse<LinkResponse>>> {
    let url = state.links.set_active(&key, true).await?;
    Ok(ApiResponse::new(LinkResponse::new(url, &state.link_config)))
}

pub async fn list_urls(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AnalyticsResult<Json<ApiResponse<Vec<LinkResponse>>>> {
    let urls = state
        .links
        .list(query.limit, query.offset, query.tags.as_deref())
        .await?;
    let urls = urls
        .into_iter()
        .map(|url| LinkResponse::new(url, &state.link_config))
        .collect();
    Ok(ApiResponse::new(urls))
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
) -> AnalyticsResult<Json<ApiResponse<Vec<String>>>> {
    Ok(ApiResponse::new(state.links.tags().await?))
}

pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
