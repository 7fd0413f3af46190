//! Data models for click analytics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device family a click came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Mobile,
    Desktop,
    Tablet,
    Other,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mobile => "Mobile",
            Platform::Desktop => "Desktop",
            Platform::Tablet => "Tablet",
            Platform::Other => "Other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Platform {
    fn from(value: &str) -> Self {
        match value {
            "Mobile" => Platform::Mobile,
            "Desktop" => Platform::Desktop,
            "Tablet" => Platform::Tablet,
            _ => Platform::Other,
        }
    }
}

/// Dimension value used when the source signal is empty or unrecognised
pub const OTHER: &str = "Other";

/// A single recorded visit. Append-only: never updated or deleted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub shorten_id: i64,
    pub platform: Platform,
    pub os: String,
    pub referrer: String,
    pub source_ip: String,
    pub timestamp: DateTime<Utc>,
}

/// Breakdown dimensions. Each maps onto a fixed column of the clicks table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Platform,
    Os,
    Referrer,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Platform, Dimension::Os, Dimension::Referrer];

    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Platform => "platform",
            Dimension::Os => "os",
            Dimension::Referrer => "referer",
        }
    }

    /// Scope label used when a breakdown query fails
    pub(crate) fn scope(&self) -> &'static str {
        match self {
            Dimension::Platform => "GetStats.SelectPlatformMetrics",
            Dimension::Os => "GetStats.SelectOSMetrics",
            Dimension::Referrer => "GetStats.SelectRefererMetrics",
        }
    }
}

/// One point of a bucketed series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub count: i64,
}

/// One `(dimension value, bucket, count)` row of a breakdown query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSeriesPoint {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub count: i64,
}

/// Dense click series with its total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickMetric {
    pub total: i64,
    pub values: Vec<ClickSeriesPoint>,
}

/// Per-value breakdown. `values` only lists buckets where the value occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub total: i64,
    pub values: Vec<ClickSeriesPoint>,
}

/// Live stats payload. The `referer` key is part of the public wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub click: ClickMetric,
    pub platform: Vec<Metric>,
    pub os: Vec<Metric>,
    #[serde(rename = "referer")]
    pub referrer: Vec<Metric>,
}

/// Current window total compared with the preceding window of equal length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodDelta {
    pub total: i64,
    pub previous: i64,
    pub diff: i64,
    pub change_percent: f64,
}

impl PeriodDelta {
    pub fn new(total: i64, previous: i64) -> Self {
        let diff = total - previous;
        let change_percent = match (previous, total) {
            (0, 0) => 0.0,
            (0, _) => 100.0,
            _ => ((diff as f64 / previous as f64) * 100.0 * 100.0).round() / 100.0,
        };

        Self {
            total,
            previous,
            diff,
            change_percent,
        }
    }
}
