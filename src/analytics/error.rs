//! Error taxonomy for the analytics pipeline

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Malformed date, unit or key supplied by the caller
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    NotFound(String),

    /// The requested key is already taken
    #[error("{0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Storage or parsing failure below the API contract, tagged with the failing operation
    #[error("{scope}: {cause:#}")]
    Internal {
        scope: &'static str,
        cause: anyhow::Error,
    },

    /// The caller's deadline elapsed while a storage call was in flight
    #[error("{scope}: deadline exceeded")]
    Cancelled { scope: &'static str },

    #[error("referrer could not be parsed: {0}")]
    InvalidReferrer(#[from] url::ParseError),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

impl AnalyticsError {
    pub fn internal(scope: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            scope,
            cause: cause.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Re-tag an internal error with the scope of an outer call site.
    /// Other variants pass through unchanged.
    pub fn with_scope(self, scope: &'static str) -> Self {
        match self {
            Self::Internal { cause, .. } => Self::Internal { scope, cause },
            Self::Cancelled { .. } => Self::Cancelled { scope },
            other => other,
        }
    }

    pub fn scope(&self) -> Option<&'static str> {
        match self {
            Self::Internal { scope, .. } | Self::Cancelled { scope } => Some(scope),
            _ => None,
        }
    }
}
