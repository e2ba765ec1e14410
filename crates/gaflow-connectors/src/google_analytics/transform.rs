//! Row transformation: time parsing, freshness and watermark filtering.
//!
//! Raw report rows carry the time-series value as a fixed-width local
//! wall-clock string (`YYYYMMDDHH`, `YYYYMMDD`, `YYYYMM`, `YYYY`) in the
//! view's reporting timezone. The transformer resolves it to an absolute
//! instant (hourly/daily) or a `YYYY-MM` / `YYYY` label (monthly/yearly),
//! drops buckets that are not finalized yet and buckets already covered by
//! the previous run's watermark.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

use crate::error::ConnectorError;

use super::config::TimeSeries;
use super::fetcher::ReportPage;

/// Upstream aggregation marker for rows that exceeded the report limits.
pub const ROLLUP_MARKER: &str = "(other)";

/// Step used to walk out of a DST gap.
const GAP_STEP_MINUTES: i64 = 15;

/// Upper bound on gap steps (one day).
const MAX_GAP_STEPS: usize = 96;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parsed value of the time-series column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeValue {
    /// Hourly/daily bucket, as an instant in the view's offset.
    Instant(DateTime<FixedOffset>),
    /// Monthly (`YYYY-MM`) or yearly (`YYYY`) bucket label.
    Label(String),
}

/// A row accepted by the transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    /// Raw values keyed by column id (time-series column excluded).
    pub values: HashMap<String, String>,
    /// Parsed time-series value.
    pub time: TimeValue,
    /// Start instant of the row's bucket in the view timezone.
    pub bucket_start: DateTime<FixedOffset>,
    /// View the row was read from.
    pub view_id: String,
}

/// Accepted rows of one page plus skip counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutcome {
    /// Accepted rows, in page order.
    pub rows: Vec<TransformedRow>,
    /// Rows dropped because their bucket is not finalized.
    pub skipped_too_early: u64,
    /// Rows dropped because they are at or before the watermark.
    pub skipped_watermark: u64,
}

/// Converts raw report rows into typed rows for one view.
pub struct RowTransformer {
    time_series: TimeSeries,
    timezone: Tz,
    view_id: String,
    clock: Arc<dyn Clock>,
    preview: bool,
    watermark: Option<DateTime<FixedOffset>>,
}

impl RowTransformer {
    /// Creates a transformer.
    #[must_use]
    pub fn new(
        time_series: TimeSeries,
        timezone: Tz,
        view_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            time_series,
            timezone,
            view_id: view_id.into(),
            clock,
            preview: false,
            watermark: None,
        }
    }

    /// Disables the freshness filter.
    #[must_use]
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// Skips rows at or before `watermark`.
    #[must_use]
    pub fn with_watermark(mut self, watermark: Option<DateTime<FixedOffset>>) -> Self {
        self.watermark = watermark;
        self
    }

    /// Returns the view timezone.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Transforms one page, preserving row order.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::DataError` on a roll-up marker, a missing
    /// time-series value or a time value not matching the granularity. The
    /// error rejects the whole page, rows before the bad one included, so a
    /// sink that already received earlier pages stops at the previous page
    /// boundary.
    pub fn transform(&self, page: &ReportPage) -> Result<TransformOutcome, ConnectorError> {
        let ts_name = self.time_series.api_name();
        let fresh_limit = self.fresh_limit();
        let mut outcome = TransformOutcome::default();

        for raw in &page.rows {
            let metric_values = raw
                .metrics
                .first()
                .map(|m| m.values.as_slice())
                .unwrap_or_default();
            let cells = || {
                page.dimension_names
                    .iter()
                    .zip(&raw.dimensions)
                    .chain(page.metric_names.iter().zip(metric_values))
            };

            // Page order, so the first marked column is reported.
            if let Some((column, _)) = cells().find(|(_, v)| v.as_str() == ROLLUP_MARKER) {
                return Err(ConnectorError::DataError(format!(
                    "column '{column}' contains the roll-up marker '{ROLLUP_MARKER}'; \
                     the query exceeds the report row limits, narrow the date range or dimensions"
                )));
            }

            let mut values: HashMap<String, String> =
                cells().map(|(k, v)| (k.clone(), v.clone())).collect();

            let raw_time = values.remove(ts_name).ok_or_else(|| {
                ConnectorError::DataError(format!("report row has no '{ts_name}' value"))
            })?;
            let local = parse_time_bucket(&raw_time, self.time_series)?;

            if fresh_limit.is_some_and(|limit| local >= limit) {
                outcome.skipped_too_early += 1;
                continue;
            }

            let bucket_start = resolve_local_time(self.timezone, local)?;
            if self.watermark.is_some_and(|w| bucket_start <= w) {
                outcome.skipped_watermark += 1;
                continue;
            }

            let time = match self.time_series {
                TimeSeries::DateHour | TimeSeries::Date => TimeValue::Instant(bucket_start),
                TimeSeries::YearMonth => {
                    TimeValue::Label(format!("{:04}-{:02}", local.year(), local.month()))
                }
                TimeSeries::Year => TimeValue::Label(format!("{:04}", local.year())),
            };

            outcome.rows.push(TransformedRow {
                values,
                time,
                bucket_start,
                view_id: self.view_id.clone(),
            });
        }
        Ok(outcome)
    }

    /// First local bucket that is not finalized yet, `None` in preview mode.
    fn fresh_limit(&self) -> Option<NaiveDateTime> {
        if self.preview {
            return None;
        }
        let now_local = self.clock.now().with_timezone(&self.timezone).naive_local();
        Some(truncate_to_granularity(now_local, self.time_series))
    }
}

impl std::fmt::Debug for RowTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowTransformer")
            .field("time_series", &self.time_series)
            .field("timezone", &self.timezone)
            .field("view_id", &self.view_id)
            .field("preview", &self.preview)
            .field("watermark", &self.watermark)
            .finish_non_exhaustive()
    }
}

/// Parses a raw time-series value into the local start of its bucket.
///
/// # Errors
///
/// Returns `ConnectorError::DataError` if `raw` does not match the fixed
/// layout of `time_series` or names an invalid date.
pub fn parse_time_bucket(raw: &str, time_series: TimeSeries) -> Result<NaiveDateTime, ConnectorError> {
    let layout = time_series.raw_layout();
    let invalid = || {
        ConnectorError::DataError(format!(
            "invalid {time_series} value '{raw}' (expected {layout})"
        ))
    };
    if raw.len() != layout.len() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let field = |range: std::ops::Range<usize>| -> Result<u32, ConnectorError> {
        raw[range].parse::<u32>().map_err(|_| invalid())
    };
    let year = i32::try_from(field(0..4)?).map_err(|_| invalid())?;

    let (month, day, hour) = match time_series {
        TimeSeries::DateHour => (field(4..6)?, field(6..8)?, field(8..10)?),
        TimeSeries::Date => (field(4..6)?, field(6..8)?, 0),
        TimeSeries::YearMonth => (field(4..6)?, 1, 0),
        TimeSeries::Year => (1, 1, 0),
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .ok_or_else(invalid)
}

/// Truncates a local time to the start of its bucket.
#[must_use]
pub fn truncate_to_granularity(local: NaiveDateTime, time_series: TimeSeries) -> NaiveDateTime {
    let date = local.date();
    let truncated = match time_series {
        TimeSeries::DateHour => date.and_hms_opt(local.hour(), 0, 0),
        TimeSeries::Date => date.and_hms_opt(0, 0, 0),
        TimeSeries::YearMonth => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        TimeSeries::Year => {
            NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    };
    truncated.unwrap_or(local)
}

/// Resolves a local wall-clock time in `timezone` to an absolute instant.
///
/// Ambiguous times (DST fall-back) resolve to the earliest instant;
/// non-existent times (DST gap) resolve to the next valid local time.
///
/// # Errors
///
/// Returns `ConnectorError::DataError` if no valid time exists within a day
/// of `local`.
pub fn resolve_local_time(
    timezone: Tz,
    local: NaiveDateTime,
) -> Result<DateTime<FixedOffset>, ConnectorError> {
    let mut candidate = local;
    for _ in 0..=MAX_GAP_STEPS {
        match timezone.from_local_datetime(&candidate) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => {
                return Ok(t.with_timezone(&t.offset().fix()));
            }
            LocalResult::None => candidate += TimeDelta::minutes(GAP_STEP_MINUTES),
        }
    }
    Err(ConnectorError::DataError(format!(
        "local time {local} does not exist in {timezone}"
    )))
}
