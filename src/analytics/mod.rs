//! Click analytics
//!
//! Redirects are classified (platform, OS, referrer) and written to the click
//! log; reports aggregate that log over a date window into dense time series
//! and per-dimension breakdowns, or export it as CSV.

pub mod aggregator;
pub mod classifier;
pub mod error;
pub mod ip_extractor;
pub mod models;
pub mod recorder;
pub mod report;
pub mod service;
pub mod storage;
pub mod window;

pub use aggregator::AggregationEngine;
pub use classifier::{Classification, Classifier};
pub use error::{AnalyticsError, AnalyticsResult};
pub use ip_extractor::extract_client_ip;
pub use models::{Click, Dimension, PeriodDelta, Platform, StatsReport};
pub use recorder::ClickRecorder;
pub use report::{ExportSubject, StatsReportBuilder};
pub use service::{AnalyticsService, RecordOutcome};
pub use storage::ClickStore;
pub use window::{DateWindow, TimeUnit};
