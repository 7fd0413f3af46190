use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AuthService};

use super::analytics::{export_stats, get_stats, get_stats_summary};
use super::handlers::{
    create_url, deactivate_url, get_url, health_check, list_tags, list_urls, reactivate_url,
    update_url, AppState,
};

pub fn create_api_router(state: Arc<AppState>, auth_service: Arc<AuthService>) -> Router {
    let protected_routes = Router::new()
        .route("/urls", post(create_url).get(list_urls))
        .route("/urls/{key}", get(get_url).patch(update_url))
        .route("/urls/{key}/deactivate", put(deactivate_url))
        .route("/urls/{key}/reactivate", put(reactivate_url))
        .route("/urls/{key}/stats", get(get_stats))
        .route("/urls/{key}/stats/summary", get(get_stats_summary))
        .route("/urls/{key}/stats/export", get(export_stats))
        .route("/tags", get(list_tags))
        .route_layer(middleware::from_fn_with_state(auth_service, auth_middleware))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
