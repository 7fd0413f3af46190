use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::analytics::AnalyticsError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AnalyticsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyticsError::InvalidParams(_) | AnalyticsError::InvalidReferrer(_) => {
                StatusCode::BAD_REQUEST
            }
            AnalyticsError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalyticsError::Conflict(_) => StatusCode::CONFLICT,
            AnalyticsError::Unauthorized => StatusCode::UNAUTHORIZED,
            AnalyticsError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
            AnalyticsError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // internal causes are logged, not leaked
        let error = match &self {
            AnalyticsError::Internal { scope, .. } => {
                tracing::error!(error = %self, "request failed");
                format!("internal error in {scope}")
            }
            AnalyticsError::Cancelled { scope } => {
                tracing::warn!(scope, "request deadline exceeded");
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
