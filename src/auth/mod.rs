use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::analytics::AnalyticsError;

/// API key check for the management API
pub struct AuthService {
    api_keys: Vec<String>,
}

impl AuthService {
    /// An empty key list disables authentication
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn validate_key(&self, key: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        // compare against every key so timing does not reveal which one matched
        self.api_keys.iter().fold(false, |matched, k| {
            let eq: bool = k.as_bytes().ct_eq(key.as_bytes()).into();
            matched | eq
        })
    }
}

/// `X-API-Key: <key>` or `Authorization: Bearer <key>`
fn presented_key(headers: &HeaderMap) -> &str {
    if let Some(key) = headers.get("x-api-key").and_then(|h| h.to_str().ok()) {
        return key.trim();
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("")
}

pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if auth_service.validate_key(presented_key(&headers)) {
        next.run(request).await
    } else {
        AnalyticsError::Unauthorized.into_response()
    }
}
