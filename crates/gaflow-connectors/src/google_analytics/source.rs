//! Google Analytics source connector implementation.
//!
//! [`GoogleAnalyticsSource`] implements the [`SourceConnector`] trait: `open`
//! resolves the requested columns against the catalog and looks up the
//! view's timezone, `poll_batch` turns each fetched report page into one
//! Arrow `RecordBatch`, and `checkpoint` yields the watermark state of the
//! next run.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use arrow_array::builder::{Float64Builder, Int64Builder, StringBuilder, TimestampSecondBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{Schema, SchemaRef};
use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::checkpoint::SourceCheckpoint;
use crate::config::{ConnectorConfig, ConnectorState};
use crate::connector::{SourceBatch, SourceConnector};
use crate::error::{ConnectorError, SerdeError};
use crate::health::HealthStatus;
use crate::metrics::ConnectorMetrics;
use crate::sdk::with_retry_if_and_handler;

use super::api::ReportingApi;
use super::catalog::{
    expand_templates, requested_columns, resolve_columns, to_arrow_schema, ColumnDescriptor,
    ColumnType, VIEW_ID_COLUMN,
};
use super::config::{GoogleAnalyticsConfig, TimeSeries};
use super::fetcher::ReportFetcher;
use super::metrics::GoogleAnalyticsSourceMetrics;
use super::transform::{Clock, RowTransformer, TimeValue, TransformedRow};
use super::watermark::{compute_next_state, parse_last_record_time, WatermarkState, WatermarkTracker};

/// Google Analytics report source producing one Arrow batch per page.
///
/// # Lifecycle
///
/// 1. Create with [`GoogleAnalyticsSource::new`]
/// 2. Optionally call `restore()` with the previous run's checkpoint
/// 3. Call `open()` to resolve columns and the view timezone
/// 4. Call `poll_batch()` until it returns `Ok(None)`
/// 5. Call `checkpoint()` for the next run's state, then `close()`
pub struct GoogleAnalyticsSource {
    /// Parsed configuration.
    config: GoogleAnalyticsConfig,
    /// Upstream API.
    api: Arc<dyn ReportingApi>,
    /// Time source for the freshness filter.
    clock: Arc<dyn Clock>,
    /// State restored before `open()`, re-applied when `open()` re-parses.
    restored: Option<WatermarkState>,
    /// Connector lifecycle state.
    state: ConnectorState,
    /// Output schema (empty until opened).
    schema: SchemaRef,
    /// Resolved columns, in schema order.
    columns: Vec<ColumnDescriptor>,
    /// Reporting timezone of the view.
    timezone: Option<Tz>,
    fetcher: Option<ReportFetcher>,
    transformer: Option<RowTransformer>,
    /// Maximum accepted time value.
    tracker: WatermarkTracker,
    /// Retries already folded into `metrics`.
    retries_seen: u64,
    metrics: GoogleAnalyticsSourceMetrics,
}

impl GoogleAnalyticsSource {
    /// Creates a new source for the given configuration.
    #[must_use]
    pub fn new(
        config: GoogleAnalyticsConfig,
        api: Arc<dyn ReportingApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            api,
            clock,
            restored: None,
            state: ConnectorState::Created,
            schema: Arc::new(Schema::empty()),
            columns: Vec::new(),
            timezone: None,
            fetcher: None,
            transformer: None,
            tracker: WatermarkTracker::new(),
            retries_seen: 0,
            metrics: GoogleAnalyticsSourceMetrics::new(),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &GoogleAnalyticsConfig {
        &self.config
    }

    /// Returns the resolved columns (empty until opened).
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Returns the view timezone, once opened.
    #[must_use]
    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    /// Returns the watermark state the next run should start from.
    ///
    /// Empty when incremental mode is off. A preview run accepts buckets
    /// that are not final yet, so it hands back the previous state as is.
    #[must_use]
    pub fn next_state(&self) -> WatermarkState {
        if !self.config.incremental {
            return WatermarkState::default();
        }
        let previous = WatermarkState::new(
            self.config.start_date.clone(),
            self.config.end_date.clone(),
            self.config.last_record_time.clone(),
        );
        if self.config.preview {
            return previous;
        }
        // Without an open view there is no observation; the timezone is unused.
        let timezone = self.timezone.unwrap_or(Tz::UTC);
        compute_next_state(&previous, timezone, self.tracker.max())
    }

    /// Looks up the reporting timezone of the configured view.
    async fn resolve_timezone(&self) -> Result<Tz, ConnectorError> {
        let api = Arc::clone(&self.api);
        let views = with_retry_if_and_handler(
            &self.config.retry_policy(),
            "management.profiles.list",
            || api.list_views(),
            ConnectorError::is_transient,
            |_, _| self.metrics.record_retries(1),
        )
        .await?;

        let view = views
            .into_iter()
            .find(|v| v.id == self.config.view_id)
            .ok_or_else(|| {
                ConnectorError::DataError(format!(
                    "view '{}' not found or not accessible with these credentials",
                    self.config.view_id
                ))
            })?;

        view.timezone.parse::<Tz>().map_err(|e| {
            ConnectorError::DataError(format!(
                "view '{}' has unknown timezone '{}': {e}",
                view.id, view.timezone
            ))
        })
    }

    /// Fetches the catalog and resolves the requested columns.
    async fn resolve_schema(&self) -> Result<Vec<ColumnDescriptor>, ConnectorError> {
        let api = Arc::clone(&self.api);
        let catalog = with_retry_if_and_handler(
            &self.config.retry_policy(),
            "metadata.columns.list",
            || api.list_columns(),
            ConnectorError::is_transient,
            |_, _| self.metrics.record_retries(1),
        )
        .await?;

        let catalog = expand_templates(&catalog);
        resolve_columns(
            &requested_columns(&self.config),
            &catalog,
            self.config.time_series,
        )
    }

    fn fail(&mut self, err: ConnectorError) -> ConnectorError {
        self.metrics.record_error();
        self.state = ConnectorState::Failed;
        err
    }
}

#[async_trait]
impl SourceConnector for GoogleAnalyticsSource {
    async fn open(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError> {
        self.state = ConnectorState::Initializing;

        // If config provided, re-parse (supports runtime config override).
        if !config.properties().is_empty() {
            let mut merged = config.clone();
            if let Some(state) = &self.restored {
                state.apply_to(&mut merged);
            }
            self.config = GoogleAnalyticsConfig::from_config(&merged).map_err(|e| self.fail(e))?;
        }

        info!(
            view_id = %self.config.view_id,
            time_series = %self.config.time_series,
            dimensions = ?self.config.dimensions,
            metrics = ?self.config.metrics,
            start_date = ?self.config.start_date,
            end_date = ?self.config.end_date,
            incremental = self.config.incremental,
            preview = self.config.preview,
            "opening Google Analytics source connector"
        );

        let columns = match self.resolve_schema().await {
            Ok(c) => c,
            Err(e) => return Err(self.fail(e)),
        };
        let timezone = match self.resolve_timezone().await {
            Ok(tz) => tz,
            Err(e) => return Err(self.fail(e)),
        };
        info!(
            view_id = %self.config.view_id,
            timezone = %timezone,
            columns = columns.len(),
            "resolved view"
        );

        self.schema = to_arrow_schema(&columns, self.config.time_series);
        self.columns = columns;
        self.timezone = Some(timezone);
        self.fetcher = Some(ReportFetcher::new(Arc::clone(&self.api), &self.config));
        self.transformer = Some(
            RowTransformer::new(
                self.config.time_series,
                timezone,
                self.config.view_id.clone(),
                Arc::clone(&self.clock),
            )
            .with_preview(self.config.preview)
            .with_watermark(self.config.watermark),
        );
        self.tracker = WatermarkTracker::new();
        self.state = ConnectorState::Running;
        info!("Google Analytics source connector opened successfully");
        Ok(())
    }

    /// Returns one batch per report page; `max_records` is ignored since the
    /// page size is fixed by the query. A page that fails to transform
    /// yields an error and none of its rows.
    async fn poll_batch(
        &mut self,
        _max_records: usize,
    ) -> Result<Option<SourceBatch>, ConnectorError> {
        if self.state == ConnectorState::Exhausted {
            return Ok(None);
        }
        if self.state != ConnectorState::Running {
            return Err(ConnectorError::InvalidState {
                expected: "Running".into(),
                actual: self.state.to_string(),
            });
        }

        loop {
            let (Some(fetcher), Some(transformer)) = (self.fetcher.as_mut(), self.transformer.as_ref())
            else {
                return Err(ConnectorError::InvalidState {
                    expected: "fetcher initialized".into(),
                    actual: "fetcher is None".into(),
                });
            };

            let fetched = fetcher.next_page().await;
            let retries = fetcher.retries();
            self.metrics.record_retries(retries - self.retries_seen);
            self.retries_seen = retries;

            let page = match fetched {
                Ok(Some(page)) => page,
                Ok(None) => {
                    self.state = ConnectorState::Exhausted;
                    debug!("report exhausted");
                    return Ok(None);
                }
                Err(e) => return Err(self.fail(e)),
            };

            let outcome = match transformer.transform(&page) {
                Ok(o) => o,
                Err(e) => return Err(self.fail(e)),
            };
            for row in &outcome.rows {
                self.tracker.observe(row.bucket_start);
            }

            let bytes: usize = outcome
                .rows
                .iter()
                .flat_map(|r| r.values.values())
                .map(String::len)
                .sum();
            self.metrics.record_page(
                outcome.rows.len() as u64,
                bytes as u64,
                outcome.skipped_too_early,
                outcome.skipped_watermark,
            );
            debug!(
                rows = page.rows.len(),
                accepted = outcome.rows.len(),
                skipped_too_early = outcome.skipped_too_early,
                skipped_watermark = outcome.skipped_watermark,
                "transformed report page"
            );

            if outcome.rows.is_empty() {
                continue;
            }

            let batch = match build_batch(
                &self.schema,
                &self.columns,
                self.config.time_series,
                &outcome.rows,
            ) {
                Ok(b) => b,
                Err(e) => return Err(self.fail(e)),
            };

            return Ok(Some(match page.next_page_token {
                Some(token) => SourceBatch::with_page_token(batch, token),
                None => SourceBatch::new(batch),
            }));
        }
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn checkpoint(&self) -> SourceCheckpoint {
        self.next_state().to_checkpoint()
    }

    async fn restore(&mut self, checkpoint: &SourceCheckpoint) -> Result<(), ConnectorError> {
        if self.state != ConnectorState::Created {
            return Err(ConnectorError::InvalidState {
                expected: "Created".into(),
                actual: self.state.to_string(),
            });
        }

        let state = WatermarkState::from_checkpoint(checkpoint);
        info!(
            start_date = ?state.start_date,
            end_date = ?state.end_date,
            last_record_time = ?state.last_record_time,
            "restoring Google Analytics source from checkpoint"
        );
        if state.is_empty() {
            return Ok(());
        }

        if let Some(raw) = &state.last_record_time {
            self.config.watermark = Some(parse_last_record_time(raw)?);
            self.config.last_record_time = Some(raw.clone());
        }
        if state.start_date.is_some() {
            self.config.start_date.clone_from(&state.start_date);
        }
        if state.end_date.is_some() {
            self.config.end_date.clone_from(&state.end_date);
        }
        self.restored = Some(state);
        Ok(())
    }

    fn health_check(&self) -> HealthStatus {
        let retries = self.metrics.retries.load(Ordering::Relaxed);
        if self.state == ConnectorState::Running && retries > 0 {
            return HealthStatus::Degraded(format!("{retries} transient errors retried"));
        }
        HealthStatus::from_state(self.state)
    }

    fn metrics(&self) -> ConnectorMetrics {
        self.metrics.to_connector_metrics()
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        info!(view_id = %self.config.view_id, "closing Google Analytics source connector");
        if self.state == ConnectorState::Running {
            warn!("closing before the report was exhausted");
        }
        self.fetcher = None;
        self.transformer = None;
        self.state = ConnectorState::Closed;
        Ok(())
    }
}

impl std::fmt::Debug for GoogleAnalyticsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAnalyticsSource")
            .field("state", &self.state)
            .field("view_id", &self.config.view_id)
            .field("time_series", &self.config.time_series)
            .field("timezone", &self.timezone)
            .field("columns", &self.columns.len())
            .finish_non_exhaustive()
    }
}

/// Builds one batch from accepted rows, in column order.
fn build_batch(
    schema: &SchemaRef,
    columns: &[ColumnDescriptor],
    time_series: TimeSeries,
    rows: &[TransformedRow],
) -> Result<RecordBatch, ConnectorError> {
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for column in columns {
        let array: ArrayRef = match column.column_type {
            ColumnType::Timestamp if time_series.is_instant() => {
                let mut b = TimestampSecondBuilder::with_capacity(rows.len()).with_timezone("UTC");
                for row in rows {
                    match &row.time {
                        TimeValue::Instant(t) => b.append_value(t.timestamp()),
                        TimeValue::Label(_) => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            ColumnType::Timestamp => {
                let mut b = StringBuilder::new();
                for row in rows {
                    match &row.time {
                        TimeValue::Label(label) => b.append_value(label),
                        TimeValue::Instant(_) => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            ColumnType::Long => {
                let mut b = Int64Builder::with_capacity(rows.len());
                for row in rows {
                    b.append_option(parse_numeric::<i64>(column, raw_value(row, column), "Int64")?);
                }
                Arc::new(b.finish())
            }
            ColumnType::Double => {
                let mut b = Float64Builder::with_capacity(rows.len());
                for row in rows {
                    b.append_option(parse_numeric::<f64>(
                        column,
                        raw_value(row, column),
                        "Float64",
                    )?);
                }
                Arc::new(b.finish())
            }
            ColumnType::String => {
                let mut b = StringBuilder::new();
                for row in rows {
                    b.append_option(raw_value(row, column));
                }
                Arc::new(b.finish())
            }
        };
        arrays.push(array);
    }

    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| ConnectorError::Internal(format!("failed to build record batch: {e}")))
}

fn raw_value<'a>(row: &'a TransformedRow, column: &ColumnDescriptor) -> Option<&'a str> {
    if column.id == VIEW_ID_COLUMN {
        Some(row.view_id.as_str())
    } else {
        row.values.get(&column.id).map(String::as_str)
    }
}

/// Parses a numeric metric; missing or empty values become null.
fn parse_numeric<T>(
    column: &ColumnDescriptor,
    raw: Option<&str>,
    expected: &str,
) -> Result<Option<T>, ConnectorError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<T>().map(Some).map_err(|e| {
            ConnectorError::Serde(SerdeError::TypeConversion {
                field: column.name.clone(),
                expected: expected.to_string(),
                message: format!("'{v}': {e}"),
            })
        }),
    }
}
