//! Stats report assembly and spreadsheet export

use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::analytics::aggregator::AggregationEngine;
use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::analytics::models::{Click, Dimension, PeriodDelta, StatsReport};
use crate::analytics::window::{DateWindow, TimeUnit};

const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
const FILE_DATE_FORMAT: &str = "%Y%m%d";
const FILE_SUFFIX_LEN: usize = 8;
const FILE_NAME_ATTEMPTS: usize = 5;

/// Identity of the link an export is produced for
#[derive(Debug, Clone)]
pub struct ExportSubject {
    pub shorten_id: i64,
    pub key: String,
    pub title: String,
    pub short_url: String,
    pub long_url: String,
}

pub struct StatsReportBuilder {
    engine: Arc<AggregationEngine>,
    export_dir: PathBuf,
}

impl StatsReportBuilder {
    pub fn new(engine: Arc<AggregationEngine>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            export_dir: export_dir.into(),
        }
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    /// Click series plus platform, OS and referrer breakdowns for one window.
    /// The four queries run concurrently; the first failure fails the report.
    pub async fn build(
        &self,
        shorten_id: i64,
        window: &DateWindow,
        unit: TimeUnit,
    ) -> AnalyticsResult<StatsReport> {
        let engine = &self.engine;
        let (click, platform, os, referrer) = tokio::try_join!(
            engine.click_series(shorten_id, window, unit),
            engine.breakdown(shorten_id, Dimension::Platform, window, unit),
            engine.breakdown(shorten_id, Dimension::Os, window, unit),
            engine.breakdown(shorten_id, Dimension::Referrer, window, unit),
        )?;

        Ok(StatsReport {
            click,
            platform,
            os,
            referrer,
        })
    }

    /// Write the two-section CSV export for the window and return its path.
    /// Removing the file after delivery is the caller's job.
    pub async fn export(
        &self,
        subject: &ExportSubject,
        window: &DateWindow,
    ) -> AnalyticsResult<PathBuf> {
        let delta = self
            .engine
            .period_delta(subject.shorten_id, window)
            .await
            .map_err(|e| e.with_scope("ExportStats.GetClicksSummary"))?;

        let clicks = self
            .engine
            .clicks(subject.shorten_id, window)
            .await
            .map_err(|e| e.with_scope("ExportStats.SelectClicks"))?;

        let document = render_export(subject, window, &delta, &clicks)
            .map_err(|e| AnalyticsError::internal("ExportStats.Render", e))?;

        let stem = export_file_stem(subject, window);
        let path = write_artifact(&self.export_dir, &stem, &document).await?;

        info!(
            key = %subject.key,
            rows = clicks.len(),
            path = %path.display(),
            "stats export written"
        );
        Ok(path)
    }
}

fn export_file_stem(subject: &ExportSubject, window: &DateWindow) -> String {
    let hour = Utc::now().timestamp() / 3600 * 3600;
    format!(
        "{}_{}_{}_{}",
        subject.key,
        window.from_date().format(FILE_DATE_FORMAT),
        window.to_date().format(FILE_DATE_FORMAT),
        hour
    )
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(FILE_SUFFIX_LEN)
        .map(char::from)
        .collect()
}

/// Create `{stem}_{suffix}.csv` in `dir` and write the document into it.
/// Files are opened with `create_new`, so concurrent exports never share a path.
async fn write_artifact(dir: &Path, stem: &str, document: &[u8]) -> AnalyticsResult<PathBuf> {
    for _ in 0..FILE_NAME_ATTEMPTS {
        let path = dir.join(format!("{stem}_{}.csv", random_suffix()));
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(AnalyticsError::internal("ExportStats.Write", err)),
        };

        let written = match file.write_all(document).await {
            Ok(()) => file.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            // never hand back a half-written file
            drop(file);
            if tokio::fs::remove_file(&path).await.is_ok() {
                debug!(path = %path.display(), "removed partial export");
            }
            return Err(AnalyticsError::internal("ExportStats.Write", err));
        }
        return Ok(path);
    }

    Err(AnalyticsError::internal(
        "ExportStats.Write",
        anyhow::anyhow!("no free export file name after {FILE_NAME_ATTEMPTS} attempts"),
    ))
}

/// Render the summary and detail sections into CSV bytes
pub fn render_export(
    subject: &ExportSubject,
    window: &DateWindow,
    delta: &PeriodDelta,
    clicks: &[Click],
) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let selected = window.to_string();
    let previous = window.previous().to_string();

    writer.write_record(["Title", subject.title.as_str()])?;
    writer.write_record(["Selected period", selected.as_str()])?;
    writer.write_record(["Previous period", previous.as_str()])?;
    writer.write_record(["Short URL", subject.short_url.as_str()])?;
    writer.write_record(["Original URL", subject.long_url.as_str()])?;
    writer.write_record([""])?;
    writer.write_record(["", "Previous period", "Selected period", "Change", "Change %"])?;
    writer.write_record([
        "Clicks".to_string(),
        delta.previous.to_string(),
        delta.total.to_string(),
        delta.diff.to_string(),
        delta.change_percent.to_string(),
    ])?;
    writer.write_record([""])?;

    writer.write_record(["Date", "Platform", "Operating system", "Referrer"])?;
    for click in clicks {
        writer.write_record([
            click.timestamp.format(EXPORT_TIMESTAMP_FORMAT).to_string(),
            click.platform.to_string(),
            click.os.clone(),
            click.referrer.clone(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush export: {}", e.error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::aggregator::tests::{click, MemoryStore};
    use crate::analytics::models::Platform;
    use chrono::TimeZone;

    fn subject() -> ExportSubject {
        ExportSubject {
            shorten_id: 42,
            key: "aZ3k9Q".to_string(),
            title: "Launch".to_string(),
            short_url: "http://localhost:3000/aZ3k9Q".to_string(),
            long_url: "https://example.com/launch".to_string(),
        }
    }

    #[test]
    fn test_render_export_sections() {
        let window = DateWindow::parse("2024-03-05", "2024-03-06").unwrap();
        let clicks = vec![click(
            42,
            Platform::Mobile,
            "Android",
            "https://example.com/",
            Utc.with_ymd_and_hms(2024, 3, 5, 9, 15, 42).unwrap(),
        )];
        let bytes = render_export(&subject(), &window, &PeriodDelta::new(5, 0), &clicks).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Title,Launch");
        assert_eq!(lines[1], "Selected period,2024-03-05 / 2024-03-06");
        assert_eq!(lines[2], "Previous period,2024-03-03 / 2024-03-04");
        assert_eq!(lines[7], "Clicks,0,5,5,100");
        assert_eq!(lines[9], "Date,Platform,Operating system,Referrer");
        assert_eq!(lines[10], "2024-03-05 09:15,Mobile,Android,https://example.com/");
        assert_eq!(lines.len(), 11);
    }

    #[tokio::test]
    async fn test_export_writes_file_in_export_dir() {
        let store = Arc::new(MemoryStore::default());
        store.clicks.lock().unwrap().push(click(
            42,
            Platform::Desktop,
            "Mac OSX",
            "Other",
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
        ));
        let dir = tempfile::tempdir().unwrap();
        let builder = StatsReportBuilder::new(Arc::new(AggregationEngine::new(store)), dir.path());
        let window = DateWindow::parse("2024-03-05", "2024-03-05").unwrap();

        let path = builder.export(&subject(), &window).await.unwrap();
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("aZ3k9Q_20240305_20240305_"));
        assert!(name.ends_with(".csv"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Clicks,0,1,1,100"));
        assert!(text.contains("2024-03-05 08:00,Desktop,Mac OSX,Other"));
    }

    #[tokio::test]
    async fn test_concurrent_exports_get_separate_files() {
        let store = Arc::new(MemoryStore::default());
        store.clicks.lock().unwrap().push(click(
            42,
            Platform::Mobile,
            "iOS",
            "Other",
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
        ));
        let dir = tempfile::tempdir().unwrap();
        let builder = StatsReportBuilder::new(Arc::new(AggregationEngine::new(store)), dir.path());
        let window = DateWindow::parse("2024-03-05", "2024-03-05").unwrap();
        let subject = subject();

        let (first, second) = tokio::join!(
            builder.export(&subject, &window),
            builder.export(&subject, &window)
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first, second);

        // removing one artifact leaves the other intact
        std::fs::remove_file(&first).unwrap();
        let text = std::fs::read_to_string(&second).unwrap();
        assert!(text.contains("2024-03-05 08:00,Mobile,iOS,Other"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_report_fails_as_a_whole() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let builder = StatsReportBuilder::new(Arc::new(AggregationEngine::new(store)), dir.path());
        let window = DateWindow::parse("2024-03-05", "2024-03-05").unwrap();

        let err = builder.build(42, &window, TimeUnit::Day).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Internal { .. }));

        let err = builder.export(&subject(), &window).await.unwrap_err();
        assert_eq!(err.scope(), Some("ExportStats.GetClicksSummary"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
