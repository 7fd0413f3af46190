//! Calendar windows and time-bucket arithmetic
//!
//! Callers pass calendar dates (`YYYY-MM-DD`); a window covers every instant from
//! `from 00:00:00` through `to 23:59:59` UTC. Buckets are aligned the same way
//! Postgres `date_trunc` aligns them: weeks start on Monday, months on the 1st,
//! years on January 1st.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analytics::error::{AnalyticsError, AnalyticsResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Upper bound on the number of buckets a single series may contain
pub const MAX_BUCKETS: usize = 100_000;

/// Seconds added to the last calendar day of a window to cover it entirely
const END_OF_DAY_SECS: i64 = 86_399;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 6] = [
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::Week,
        TimeUnit::Month,
        TimeUnit::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }

    /// Truncate an instant to the start of the bucket containing it
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let start: Option<NaiveDateTime> = match self {
            TimeUnit::Minute => date.and_hms_opt(ts.hour(), ts.minute(), 0),
            TimeUnit::Hour => date.and_hms_opt(ts.hour(), 0, 0),
            TimeUnit::Day => date.and_hms_opt(0, 0, 0),
            TimeUnit::Week => {
                let offset = i64::from(date.weekday().num_days_from_monday());
                (date - TimeDelta::days(offset)).and_hms_opt(0, 0, 0)
            }
            TimeUnit::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            TimeUnit::Year => {
                NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
        };

        start.map(|naive| naive.and_utc()).unwrap_or(ts)
    }

    /// Advance a bucket start by exactly one unit
    pub fn step(&self, bucket: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeUnit::Minute => bucket.checked_add_signed(TimeDelta::minutes(1)),
            TimeUnit::Hour => bucket.checked_add_signed(TimeDelta::hours(1)),
            TimeUnit::Day => bucket.checked_add_signed(TimeDelta::days(1)),
            TimeUnit::Week => bucket.checked_add_signed(TimeDelta::weeks(1)),
            TimeUnit::Month => bucket.checked_add_months(Months::new(1)),
            TimeUnit::Year => bucket.checked_add_months(Months::new(12)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| {
                AnalyticsError::invalid(
                    "unit is invalid, expected (minute, hour, day, week, month, year)",
                )
            })
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date
pub fn parse_date(field: &str, value: &str) -> AnalyticsResult<NaiveDate> {
    let invalid = || AnalyticsError::invalid(format!("{field} is invalid, expected 2006-01-02"));

    if value.len() != 10 {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> AnalyticsResult<Self> {
        if from > to {
            return Err(AnalyticsError::invalid("from must not be after to"));
        }
        Ok(Self { from, to })
    }

    pub fn parse(from: &str, to: &str) -> AnalyticsResult<Self> {
        Self::new(parse_date("from", from)?, parse_date("to", to)?)
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to
    }

    /// First instant of the window
    pub fn start(&self) -> DateTime<Utc> {
        self.from.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Last instant (inclusive, second precision) of the window
    pub fn end(&self) -> DateTime<Utc> {
        self.start() + TimeDelta::days(self.length_days()) + TimeDelta::seconds(END_OF_DAY_SECS)
    }

    pub fn start_ts(&self) -> i64 {
        self.start().timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end().timestamp()
    }

    /// Distance between `from` and `to` in days (0 for a single-day window)
    pub fn length_days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// The immediately preceding window of identical length:
    /// `[from - length - 1, from - 1]`
    pub fn previous(&self) -> Self {
        let to = self.from - TimeDelta::days(1);
        let from = to - TimeDelta::days(self.length_days());
        Self { from, to }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start() && ts <= self.end()
    }

    /// Every bucket boundary from `truncate(start)` to `truncate(end)` inclusive
    pub fn axis(&self, unit: TimeUnit) -> AnalyticsResult<Vec<DateTime<Utc>>> {
        let last = unit.truncate(self.end());
        let mut cursor = unit.truncate(self.start());
        let mut buckets = Vec::new();

        while cursor <= last {
            if buckets.len() == MAX_BUCKETS {
                return Err(AnalyticsError::invalid(format!(
                    "window is too large for unit {unit}, at most {MAX_BUCKETS} buckets are allowed"
                )));
            }
            buckets.push(cursor);
            cursor = match unit.step(cursor) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(buckets)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}",
            self.from.format(DATE_FORMAT),
            self.to.format(DATE_FORMAT)
        )
    }
}
