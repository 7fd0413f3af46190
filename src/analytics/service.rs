//! Entry points the HTTP layer talks to

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::analytics::classifier::Classifier;
use crate::analytics::error::AnalyticsResult;
use crate::analytics::models::{Click, PeriodDelta, StatsReport};
use crate::analytics::recorder::ClickRecorder;
use crate::analytics::report::{ExportSubject, StatsReportBuilder};
use crate::analytics::window::{DateWindow, TimeUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Bot or unrecognised agent; nothing was stored
    Skipped,
}

/// Wires classification, recording and reporting together.
/// All collaborators are passed in; nothing here is global.
pub struct AnalyticsService {
    classifier: Classifier,
    recorder: ClickRecorder,
    reports: Arc<StatsReportBuilder>,
}

impl AnalyticsService {
    pub fn new(
        classifier: Classifier,
        recorder: ClickRecorder,
        reports: Arc<StatsReportBuilder>,
    ) -> Self {
        Self {
            classifier,
            recorder,
            reports,
        }
    }

    /// Classify a redirect and store it as a click unless it is a bot
    pub async fn record_redirect_event(
        &self,
        shorten_id: i64,
        user_agent: &str,
        referer: &str,
        source_ip: IpAddr,
        timestamp: DateTime<Utc>,
    ) -> AnalyticsResult<RecordOutcome> {
        let classification = self.classifier.classify(user_agent, referer)?;

        if !classification.is_recordable() {
            debug!(shorten_id, user_agent, "skipping click from bot or unknown agent");
            return Ok(RecordOutcome::Skipped);
        }

        let click = Click {
            shorten_id,
            platform: classification.platform,
            os: classification.os,
            referrer: classification.referrer,
            source_ip: source_ip.to_string(),
            timestamp,
        };
        self.recorder.record(&click).await?;

        Ok(RecordOutcome::Recorded)
    }

    /// Validate raw query parameters and build the live report
    pub async fn stats_report(
        &self,
        shorten_id: i64,
        from: &str,
        to: &str,
        unit: &str,
    ) -> AnalyticsResult<StatsReport> {
        let window = DateWindow::parse(from, to)?;
        let unit: TimeUnit = unit.parse()?;

        self.reports.build(shorten_id, &window, unit).await
    }

    pub async fn period_summary(
        &self,
        shorten_id: i64,
        from: &str,
        to: &str,
    ) -> AnalyticsResult<PeriodDelta> {
        let window = DateWindow::parse(from, to)?;
        self.reports.engine().period_delta(shorten_id, &window).await
    }

    pub async fn export_stats_report(
        &self,
        subject: &ExportSubject,
        from: &str,
        to: &str,
    ) -> AnalyticsResult<PathBuf> {
        let window = DateWindow::parse(from, to)?;
        self.reports.export(subject, &window).await
    }
}
