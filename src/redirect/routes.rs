use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, redirect_url, RedirectState};

pub fn create_redirect_router(state: Arc<RedirectState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/{key}", get(redirect_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
