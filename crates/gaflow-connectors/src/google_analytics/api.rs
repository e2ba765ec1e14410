//! Google Analytics REST API client.
//!
//! [`ReportingApi`] is the seam between the connector and the upstream
//! service. [`HttpReportingApi`] implements it over `reqwest` against the
//! Reporting v4, Metadata v3 and Management v3 endpoints; tests substitute
//! an in-memory implementation.
//!
//! Implementations perform a single attempt per call and classify failures
//! through [`ConnectorError`]; retrying is the caller's concern.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConnectorError;

use super::auth::TokenProvider;
use super::catalog::CatalogEntry;

/// Default Reporting API v4 `batchGet` endpoint.
pub const DEFAULT_REPORTING_URL: &str =
    "https://analyticsreporting.googleapis.com/v4/reports:batchGet";

/// Default Analytics v3 base URL (metadata and management).
pub const DEFAULT_ANALYTICS_V3_URL: &str = "https://www.googleapis.com/analytics/v3";

// ── Report request ──

/// Body of a `reports:batchGet` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetRequest {
    /// Report requests; this connector always sends exactly one.
    pub report_requests: Vec<ReportRequest>,
}

/// A single report query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// View id.
    pub view_id: String,
    /// Dimensions, time series first.
    pub dimensions: Vec<Dimension>,
    /// Metric expressions.
    pub metrics: Vec<Metric>,
    /// Always `true`: buckets without data are still reported.
    pub include_empty_rows: bool,
    /// Rows per page.
    pub page_size: u32,
    /// Date range, when either bound is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_ranges: Option<Vec<DateRange>>,
    /// Continuation token of the page to fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    /// Metric filter clauses, passed through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_filter_clauses: Option<serde_json::Value>,
    /// Dimension filter clauses, passed through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_filter_clauses: Option<serde_json::Value>,
    /// Segments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    /// Filter expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters_expression: Option<String>,
    /// Sampling level (`DEFAULT`, `SMALL`, `LARGE`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_level: Option<String>,
}

/// A requested dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    /// Dimension id.
    pub name: String,
}

/// A requested metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    /// Metric id or expression.
    pub expression: String,
}

/// A report date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    /// Inclusive start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Inclusive end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// A segment reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Segment id, e.g. `gaid::-1`.
    pub segment_id: String,
}

// ── Report response ──

/// Response of a `reports:batchGet` call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchGetResponse {
    /// One report per request.
    #[serde(default)]
    pub reports: Vec<Report>,
}

/// One report page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Column header.
    #[serde(default)]
    pub column_header: ColumnHeader,
    /// Rows and totals.
    #[serde(default)]
    pub data: ReportData,
    /// Token of the next page, absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Names of the dimensions and metrics of a report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    /// Dimension ids, in row order.
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric header.
    #[serde(default)]
    pub metric_header: MetricHeader,
}

/// Metric header of a report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeader {
    /// Metric entries, in row order.
    #[serde(default)]
    pub metric_header_entries: Vec<MetricHeaderEntry>,
}

/// One metric header entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricHeaderEntry {
    /// Metric id or expression.
    pub name: String,
    /// Declared metric type.
    #[serde(default, rename = "type")]
    pub metric_type: Option<String>,
}

/// Data section of a report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    /// Rows; absent when the report is empty.
    #[serde(default)]
    pub rows: Option<Vec<ReportRow>>,
    /// Total rows matching the query across all pages.
    #[serde(default)]
    pub row_count: Option<u64>,
}

/// One raw report row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRow {
    /// Dimension values.
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric values, one entry per date range.
    #[serde(default)]
    pub metrics: Vec<DateRangeValues>,
}

/// Metric values of one date range.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRangeValues {
    /// Values, in metric header order.
    #[serde(default)]
    pub values: Vec<String>,
}

// ── Metadata / management ──

#[derive(Debug, Deserialize)]
struct ColumnsResponse {
    #[serde(default)]
    items: Vec<CatalogEntry>,
}

/// A reporting view (profile).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewProfile {
    /// Numeric view id.
    pub id: String,
    /// IANA timezone of the view.
    pub timezone: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilesResponse {
    #[serde(default)]
    items: Vec<ViewProfile>,
    #[serde(default)]
    next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    error: GoogleError,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleErrorItem {
    #[serde(default)]
    reason: String,
}

const RATE_LIMIT_REASONS: [&str; 3] = ["rateLimitExceeded", "userRateLimitExceeded", "quotaExceeded"];

/// Upstream API operations used by the connector.
#[async_trait]
pub trait ReportingApi: Send + Sync {
    /// Lists the dimension/metric catalog (templates not expanded).
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on transport or API failure.
    async fn list_columns(&self) -> Result<Vec<CatalogEntry>, ConnectorError>;

    /// Lists every view the credentials can access.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on transport or API failure.
    async fn list_views(&self) -> Result<Vec<ViewProfile>, ConnectorError>;

    /// Runs one `reports:batchGet` call.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on transport or API failure.
    async fn batch_get(&self, request: &BatchGetRequest)
        -> Result<BatchGetResponse, ConnectorError>;
}

/// Classifies a non-success HTTP response.
///
/// 429 and 403 responses carrying a rate-limit reason are
/// [`ConnectorError::RateLimited`]; other 401/403 responses are
/// [`ConnectorError::AuthenticationFailed`]; 5xx responses are
/// [`ConnectorError::ServerError`]; every other status is
/// [`ConnectorError::RequestRejected`].
#[must_use]
pub fn error_for_status(status: u16, body: &str) -> ConnectorError {
    let parsed: GoogleErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.error.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.error.message.clone()
    };
    let rate_limited = parsed
        .error
        .errors
        .iter()
        .any(|e| RATE_LIMIT_REASONS.contains(&e.reason.as_str()))
        || parsed.error.status.as_deref() == Some("RESOURCE_EXHAUSTED");

    match status {
        429 => ConnectorError::RateLimited(message),
        403 if rate_limited => ConnectorError::RateLimited(message),
        401 | 403 => ConnectorError::AuthenticationFailed(format!("HTTP {status}: {message}")),
        500..=599 => ConnectorError::ServerError { status, message },
        _ => ConnectorError::RequestRejected { status, message },
    }
}

/// `reqwest`-backed [`ReportingApi`].
pub struct HttpReportingApi {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    reporting_url: String,
    analytics_v3_url: String,
}

impl HttpReportingApi {
    /// Creates a client against the public Google endpoints.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_endpoints(tokens, DEFAULT_REPORTING_URL, DEFAULT_ANALYTICS_V3_URL)
    }

    /// Creates a client against custom endpoints.
    #[must_use]
    pub fn with_endpoints(
        tokens: Arc<dyn TokenProvider>,
        reporting_url: impl Into<String>,
        analytics_v3_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            tokens,
            reporting_url: reporting_url.into(),
            analytics_v3_url: analytics_v3_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Performs an authorized GET request and deserializes JSON.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ConnectorError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ConnectorError::ConnectionFailed(format!("google analytics: {e}")))?;
        Self::decode(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ConnectorError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status.as_u16(), &text));
        }
        if status == StatusCode::NO_CONTENT {
            return Err(ConnectorError::Internal(
                "google analytics returned an empty body".into(),
            ));
        }
        resp.json::<T>().await.map_err(|e| {
            ConnectorError::Internal(format!("failed to parse google analytics response: {e}"))
        })
    }
}

#[async_trait]
impl ReportingApi for HttpReportingApi {
    async fn list_columns(&self) -> Result<Vec<CatalogEntry>, ConnectorError> {
        let url = format!("{}/metadata/ga/columns", self.analytics_v3_url);
        debug!(%url, "fetching column catalog");
        let resp: ColumnsResponse = self.get_json(&url).await?;
        Ok(resp.items)
    }

    async fn list_views(&self) -> Result<Vec<ViewProfile>, ConnectorError> {
        let mut url = format!(
            "{}/management/accounts/~all/webproperties/~all/profiles",
            self.analytics_v3_url
        );
        let mut views = Vec::new();
        loop {
            debug!(%url, "fetching views");
            let resp: ProfilesResponse = self.get_json(&url).await?;
            views.extend(resp.items);
            match resp.next_link {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }
        Ok(views)
    }

    async fn batch_get(
        &self,
        request: &BatchGetRequest,
    ) -> Result<BatchGetResponse, ConnectorError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .post(&self.reporting_url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| ConnectorError::ConnectionFailed(format!("google analytics: {e}")))?;
        Self::decode(resp).await
    }
}

impl std::fmt::Debug for HttpReportingApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReportingApi")
            .field("reporting_url", &self.reporting_url)
            .field("analytics_v3_url", &self.analytics_v3_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req = BatchGetRequest {
            report_requests: vec![ReportRequest {
                view_id: "101".into(),
                dimensions: vec![Dimension {
                    name: "ga:dateHour".into(),
                }],
                metrics: vec![Metric {
                    expression: "ga:sessions".into(),
                }],
                include_empty_rows: true,
                page_size: 10_000,
                date_ranges: Some(vec![DateRange {
                    start_date: Some("2016-06-01".into()),
                    end_date: Some("today".into()),
                }]),
                page_token: None,
                metric_filter_clauses: None,
                dimension_filter_clauses: None,
                segments: Some(vec![Segment {
                    segment_id: "gaid::-1".into(),
                }]),
                filters_expression: None,
                sampling_level: Some("LARGE".into()),
            }],
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"reportRequests": [{
                "viewId": "101",
                "dimensions": [{"name": "ga:dateHour"}],
                "metrics": [{"expression": "ga:sessions"}],
                "includeEmptyRows": true,
                "pageSize": 10000,
                "dateRanges": [{"startDate": "2016-06-01", "endDate": "today"}],
                "segments": [{"segmentId": "gaid::-1"}],
                "samplingLevel": "LARGE"
            }]})
        );
    }

    #[test]
    fn test_response_parsing() {
        let body = json!({"reports": [{
            "columnHeader": {
                "dimensions": ["ga:dateHour", "ga:browser"],
                "metricHeader": {"metricHeaderEntries": [{"name": "ga:sessions", "type": "INTEGER"}]}
            },
            "data": {
                "rows": [{"dimensions": ["2016060100", "Chrome"], "metrics": [{"values": ["3"]}]}],
                "rowCount": 12
            },
            "nextPageToken": "1"
        }]});
        let resp: BatchGetResponse = serde_json::from_value(body).unwrap();
        let report = &resp.reports[0];
        assert_eq!(report.column_header.dimensions, vec!["ga:dateHour", "ga:browser"]);
        assert_eq!(
            report.column_header.metric_header.metric_header_entries[0].name,
            "ga:sessions"
        );
        assert_eq!(report.data.row_count, Some(12));
        assert_eq!(report.data.rows.as_ref().unwrap()[0].metrics[0].values, vec!["3"]);
        assert_eq!(report.next_page_token.as_deref(), Some("1"));
    }

    #[test]
    fn test_response_without_rows() {
        let body = json!({"reports": [{"columnHeader": {"dimensions": ["ga:date"]}, "data": {}}]});
        let resp: BatchGetResponse = serde_json::from_value(body).unwrap();
        assert!(resp.reports[0].data.rows.is_none());
        assert!(resp.reports[0].next_page_token.is_none());
    }

    #[test]
    fn test_profiles_parsing() {
        let body = json!({
            "items": [{"id": "101", "timezone": "America/Los_Angeles", "name": "All Web Site Data"}],
            "nextLink": "https://www.googleapis.com/analytics/v3/management/accounts/~all/webproperties/~all/profiles?start-index=1001"
        });
        let resp: ProfilesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.items[0].timezone, "America/Los_Angeles");
        assert!(resp.next_link.is_some());
    }

    #[test]
    fn test_error_for_status_rate_limit() {
        let body = r#"{"error":{"code":403,"message":"Quota Error","errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        assert!(matches!(
            error_for_status(403, body),
            ConnectorError::RateLimited(ref m) if m == "Quota Error"
        ));
        assert!(matches!(
            error_for_status(429, "slow down"),
            ConnectorError::RateLimited(_)
        ));
        let exhausted = r#"{"error":{"code":403,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(error_for_status(403, exhausted).is_transient());
    }

    #[test]
    fn test_error_for_status_auth() {
        let body = r#"{"error":{"code":403,"message":"User does not have sufficient permissions for this profile.","errors":[{"reason":"insufficientPermissions"}]}}"#;
        let err = error_for_status(403, body);
        assert!(matches!(err, ConnectorError::AuthenticationFailed(_)));
        assert!(!err.is_transient());
        assert!(matches!(
            error_for_status(401, ""),
            ConnectorError::AuthenticationFailed(_)
        ));
    }

    #[test]
    fn test_error_for_status_server_and_client() {
        let err = error_for_status(503, "backend unavailable");
        assert!(matches!(err, ConnectorError::ServerError { status: 503, .. }));
        assert!(err.is_transient());

        let err = error_for_status(400, r#"{"error":{"message":"Unknown metric(s): ga:foo"}}"#);
        match err {
            ConnectorError::RequestRejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Unknown metric(s): ga:foo");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
