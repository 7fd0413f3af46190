//! Click persistence

use std::sync::Arc;

use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::analytics::models::Click;
use crate::analytics::storage::ClickStore;

/// Writes classified clicks to the click log. No deduplication: identical
/// events are all stored.
#[derive(Clone)]
pub struct ClickRecorder {
    store: Arc<dyn ClickStore>,
}

impl ClickRecorder {
    pub fn new(store: Arc<dyn ClickStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, click: &Click) -> AnalyticsResult<()> {
        self.store
            .insert_click(click)
            .await
            .map_err(|e| AnalyticsError::internal("CreateClick", e))
    }
}
