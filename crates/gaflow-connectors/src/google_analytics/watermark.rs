//! Incremental watermark state.
//!
//! A run observes the maximum time-series value of the rows it accepted.
//! From that maximum, [`compute_next_state`] derives the date range and
//! watermark of the next run: the next run re-queries the whole boundary
//! day (the API only accepts day-granular ranges) and the driver skips
//! every row at or before `last_record_time`, so the partial day already
//! ingested is neither duplicated nor dropped.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::checkpoint::SourceCheckpoint;
use crate::config::ConnectorConfig;
use crate::error::ConnectorError;

/// Layout of a persisted `last_record_time`.
pub const LAST_RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Sentinel end date meaning "now at execution time".
pub const END_DATE_TODAY: &str = "today";

const START_DATE_KEY: &str = "start_date";
const END_DATE_KEY: &str = "end_date";
const LAST_RECORD_TIME_KEY: &str = "last_record_time";

/// State persisted between runs and re-injected as the next run's config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkState {
    /// First report date of the next run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Last report date of the next run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Rows at or before this instant are skipped by the next run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_record_time: Option<String>,
}

impl WatermarkState {
    /// Builds a state, dropping blank fields.
    #[must_use]
    pub fn new(
        start_date: Option<String>,
        end_date: Option<String>,
        last_record_time: Option<String>,
    ) -> Self {
        Self {
            start_date: non_blank(start_date),
            end_date: non_blank(end_date),
            last_record_time: non_blank(last_record_time),
        }
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.last_record_time.is_none()
    }

    /// Encodes the state as checkpoint offsets.
    #[must_use]
    pub fn to_checkpoint(&self) -> SourceCheckpoint {
        let mut cp = SourceCheckpoint::new();
        for (key, value) in self.fields() {
            if let Some(v) = value {
                cp.set_offset(key, v.clone());
            }
        }
        cp
    }

    /// Decodes a state from checkpoint offsets. Unknown offsets are ignored.
    #[must_use]
    pub fn from_checkpoint(checkpoint: &SourceCheckpoint) -> Self {
        let get = |key: &str| checkpoint.get_offset(key).map(str::to_string);
        Self::new(
            get(START_DATE_KEY),
            get(END_DATE_KEY),
            get(LAST_RECORD_TIME_KEY),
        )
    }

    /// Merges the state into a connector config, overriding the keys it
    /// carries and leaving every other key untouched.
    pub fn apply_to(&self, config: &mut ConnectorConfig) {
        for (key, value) in self.fields() {
            if let Some(v) = value {
                config.set(key, v.clone());
            }
        }
    }

    fn fields(&self) -> [(&'static str, &Option<String>); 3] {
        [
            (START_DATE_KEY, &self.start_date),
            (END_DATE_KEY, &self.end_date),
            (LAST_RECORD_TIME_KEY, &self.last_record_time),
        ]
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses a persisted `last_record_time`.
///
/// Accepts `%Y-%m-%d %H:%M:%S %z` (the layout this crate writes) and
/// RFC 3339.
///
/// # Errors
///
/// Returns `ConnectorError::ConfigurationError` for any other input.
pub fn parse_last_record_time(raw: &str) -> Result<DateTime<FixedOffset>, ConnectorError> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, LAST_RECORD_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map_err(|e| {
            ConnectorError::ConfigurationError(format!(
                "invalid last_record_time '{raw}' (expected 'YYYY-MM-DD HH:MM:SS +ZZZZ'): {e}"
            ))
        })
}

/// Computes the state of the next run.
///
/// With no observation the previous state is passed through unchanged
/// (blank fields omitted). Otherwise `start_date` is the calendar date of
/// `observed_max` in the view `timezone`, `last_record_time` is
/// `observed_max` in its own offset, and `end_date` becomes `today` unless
/// the previous end date was a relative expression (no `YYYY-MM-DD` in it),
/// which is preserved.
#[must_use]
pub fn compute_next_state(
    previous: &WatermarkState,
    timezone: Tz,
    observed_max: Option<DateTime<FixedOffset>>,
) -> WatermarkState {
    let Some(max) = observed_max else {
        return WatermarkState::new(
            previous.start_date.clone(),
            previous.end_date.clone(),
            previous.last_record_time.clone(),
        );
    };

    let start_date = max.with_timezone(&timezone).format("%Y-%m-%d").to_string();

    // A static end date would end up before the new start date.
    let end_date = match previous.end_date.as_deref() {
        Some(end) if !end.trim().is_empty() && !contains_iso_date(end) => end.to_string(),
        _ => END_DATE_TODAY.to_string(),
    };

    WatermarkState {
        start_date: Some(start_date),
        end_date: Some(end_date),
        last_record_time: Some(max.format(LAST_RECORD_TIME_FORMAT).to_string()),
    }
}

/// Returns `true` if `s` contains a `DDDD-DD-DD` substring.
fn contains_iso_date(s: &str) -> bool {
    const PATTERN: &[u8; 10] = b"dddd-dd-dd";
    s.as_bytes().windows(PATTERN.len()).any(|w| {
        w.iter().zip(PATTERN).all(|(c, p)| match p {
            b'd' => c.is_ascii_digit(),
            _ => c == p,
        })
    })
}

/// Running maximum of the time values accepted during a run.
#[derive(Debug, Clone, Default)]
pub struct WatermarkTracker {
    max: Option<DateTime<FixedOffset>>,
}

impl WatermarkTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one accepted time value into the maximum.
    pub fn observe(&mut self, value: DateTime<FixedOffset>) {
        match self.max {
            Some(current) if current >= value => {}
            _ => self.max = Some(value),
        }
    }

    /// Returns the maximum observed so far.
    #[must_use]
    pub fn max(&self) -> Option<DateTime<FixedOffset>> {
        self.max
    }
}
