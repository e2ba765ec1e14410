//! Testing utilities for connector implementations.
//!
//! Provides an in-memory [`ReportingApi`], a recording [`PageSink`], a
//! fixed [`Clock`] and helpers for building report responses.

use std::collections::VecDeque;
use std::sync::Arc;

use arrow_schema::SchemaRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::connector::{FieldValue, PageSink};
use crate::error::ConnectorError;
use crate::google_analytics::api::{
    BatchGetRequest, BatchGetResponse, ColumnHeader, DateRangeValues, MetricHeader,
    MetricHeaderEntry, Report, ReportData, ReportRow, ReportingApi, ViewProfile,
};
use crate::google_analytics::catalog::{CatalogEntry, ColumnAttributes};
use crate::google_analytics::transform::Clock;

/// A small catalog covering every time series, a few dimensions and
/// metrics of each type, and one templated custom dimension (`1..=3`).
#[must_use]
pub fn sample_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("ga:dateHour", "STRING"),
        CatalogEntry::new("ga:date", "STRING"),
        CatalogEntry::new("ga:yearMonth", "STRING"),
        CatalogEntry::new("ga:year", "STRING"),
        CatalogEntry::new("ga:browser", "STRING"),
        CatalogEntry::new("ga:country", "STRING"),
        CatalogEntry::new("ga:sessions", "INTEGER"),
        CatalogEntry::new("ga:users", "INTEGER"),
        CatalogEntry::new("ga:bounceRate", "PERCENT"),
        CatalogEntry::new("ga:avgSessionDuration", "TIME"),
        CatalogEntry {
            id: "ga:dimensionXX".into(),
            attributes: Some(ColumnAttributes {
                data_type: Some("STRING".into()),
                min_template_index: Some(1),
                max_template_index: Some(3),
                ..ColumnAttributes::default()
            }),
        },
    ]
}

/// View `101` reporting in `America/Los_Angeles`.
#[must_use]
pub fn sample_view() -> ViewProfile {
    ViewProfile {
        id: "101".into(),
        timezone: "America/Los_Angeles".into(),
        name: Some("All Web Site Data".into()),
    }
}

/// Builds a single-report response.
///
/// Each row is `(dimension values, metric values)`.
#[must_use]
pub fn report_response(
    dimension_names: &[&str],
    metric_names: &[&str],
    rows: &[(Vec<&str>, Vec<&str>)],
    next_page_token: Option<&str>,
    row_count: Option<u64>,
) -> BatchGetResponse {
    let to_strings = |v: &[&str]| v.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
    let rows: Vec<ReportRow> = rows
        .iter()
        .map(|(dims, metrics)| ReportRow {
            dimensions: to_strings(dims.as_slice()),
            metrics: vec![DateRangeValues {
                values: to_strings(metrics.as_slice()),
            }],
        })
        .collect();

    BatchGetResponse {
        reports: vec![Report {
            column_header: ColumnHeader {
                dimensions: to_strings(dimension_names),
                metric_header: MetricHeader {
                    metric_header_entries: metric_names
                        .iter()
                        .map(|name| MetricHeaderEntry {
                            name: (*name).to_string(),
                            metric_type: None,
                        })
                        .collect(),
                },
            },
            data: ReportData {
                rows: if rows.is_empty() { None } else { Some(rows) },
                row_count,
            },
            next_page_token: next_page_token.map(str::to_string),
        }],
    }
}

/// Builds an hourly `ga:dateHour, ga:browser / ga:sessions` response from
/// `(date_hour, browser, sessions)` rows.
#[must_use]
pub fn report_page(
    rows: &[(&str, &str, &str)],
    next_page_token: Option<&str>,
    row_count: Option<u64>,
) -> BatchGetResponse {
    let rows: Vec<(Vec<&str>, Vec<&str>)> = rows
        .iter()
        .map(|(t, browser, sessions)| (vec![*t, *browser], vec![*sessions]))
        .collect();
    report_response(
        &["ga:dateHour", "ga:browser"],
        &["ga:sessions"],
        &rows,
        next_page_token,
        row_count,
    )
}

/// In-memory [`ReportingApi`] replaying scripted responses.
///
/// Report responses and errors are served in push order; once the script
/// runs out, every call returns a report without rows.
#[derive(Debug, Default)]
pub struct MockReportingApi {
    catalog: Vec<CatalogEntry>,
    views: Vec<ViewProfile>,
    columns_errors: Mutex<VecDeque<ConnectorError>>,
    responses: Mutex<VecDeque<Result<BatchGetResponse, ConnectorError>>>,
    requests: Mutex<Vec<BatchGetRequest>>,
}

impl MockReportingApi {
    /// Creates a mock with an empty catalog and no views.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the catalog returned by `list_columns`.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the views returned by `list_views`.
    #[must_use]
    pub fn with_views(mut self, views: Vec<ViewProfile>) -> Self {
        self.views = views;
        self
    }

    /// Queues a report response.
    pub fn push_page(&self, response: BatchGetResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a report error.
    pub fn push_error(&self, error: ConnectorError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Queues an error for the next `list_columns` call.
    pub fn push_columns_error(&self, error: ConnectorError) {
        self.columns_errors.lock().push_back(error);
    }

    /// Returns every report request received so far.
    #[must_use]
    pub fn batch_requests(&self) -> Vec<BatchGetRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ReportingApi for MockReportingApi {
    async fn list_columns(&self) -> Result<Vec<CatalogEntry>, ConnectorError> {
        if let Some(err) = self.columns_errors.lock().pop_front() {
            return Err(err);
        }
        Ok(self.catalog.clone())
    }

    async fn list_views(&self) -> Result<Vec<ViewProfile>, ConnectorError> {
        Ok(self.views.clone())
    }

    async fn batch_get(
        &self,
        request: &BatchGetRequest,
    ) -> Result<BatchGetResponse, ConnectorError> {
        self.requests.lock().push(request.clone());
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Ok(BatchGetResponse {
                reports: vec![Report::default()],
            })
        })
    }
}

/// Recording [`PageSink`].
///
/// Clones share the same buffers, so a test can keep one handle while the
/// runtime owns another.
#[derive(Debug, Clone, Default)]
pub struct MockPageSink {
    columns: Arc<Mutex<Vec<String>>>,
    rows: Arc<Mutex<Vec<Vec<FieldValue>>>>,
    finished: Arc<Mutex<usize>>,
    fail_after: Option<usize>,
}

impl MockPageSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink whose `add` fails once `n` rows were accepted.
    #[must_use]
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Returns the column names announced by `begin`.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.columns.lock().clone()
    }

    /// Returns the rows received so far.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<FieldValue>> {
        self.rows.lock().clone()
    }

    /// Returns how many times `finish` was called.
    #[must_use]
    pub fn finish_count(&self) -> usize {
        *self.finished.lock()
    }
}

impl PageSink for MockPageSink {
    fn begin(&mut self, schema: &SchemaRef) -> Result<(), ConnectorError> {
        *self.columns.lock() = schema.fields().iter().map(|f| f.name().clone()).collect();
        Ok(())
    }

    fn add(&mut self, values: Vec<FieldValue>) -> Result<(), ConnectorError> {
        let mut rows = self.rows.lock();
        if self.fail_after.is_some_and(|n| rows.len() >= n) {
            return Err(ConnectorError::WriteError("sink rejected row".into()));
        }
        rows.push(values);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConnectorError> {
        *self.finished.lock() += 1;
        Ok(())
    }
}

/// [`Clock`] frozen at a given instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_api_replays_script() {
        let api = MockReportingApi::new().with_views(vec![sample_view()]);
        api.push_error(ConnectorError::RateLimited("quota".into()));
        api.push_page(report_page(&[("2016060100", "Chrome", "1")], None, Some(1)));

        let req = BatchGetRequest {
            report_requests: Vec::new(),
        };
        assert!(api.batch_get(&req).await.is_err());
        let resp = api.batch_get(&req).await.unwrap();
        assert_eq!(resp.reports[0].data.rows.as_ref().unwrap().len(), 1);
        let resp = api.batch_get(&req).await.unwrap();
        assert!(resp.reports[0].data.rows.is_none());
        assert_eq!(api.batch_requests().len(), 3);
        assert_eq!(api.list_views().await.unwrap()[0].id, "101");
    }

    #[test]
    fn test_mock_sink_shares_buffers() {
        let handle = MockPageSink::new();
        let mut sink = handle.clone();
        sink.add(vec![FieldValue::Long(1)]).unwrap();
        sink.finish().unwrap();
        assert_eq!(handle.rows(), vec![vec![FieldValue::Long(1)]]);
        assert_eq!(handle.finish_count(), 1);
    }

    #[test]
    fn test_failing_sink() {
        let mut sink = MockPageSink::failing_after(1);
        sink.add(vec![FieldValue::Null]).unwrap();
        assert!(sink.add(vec![FieldValue::Null]).is_err());
    }

    #[test]
    fn test_fixed_clock() {
        let t = DateTime::from_timestamp(1_464_782_400, 0).unwrap();
        let clock = FixedClock::new(t);
        assert_eq!(clock.now(), t);
        let later = DateTime::from_timestamp(1_464_786_000, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
