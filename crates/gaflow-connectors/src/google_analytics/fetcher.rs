//! Paginated report fetching.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ConnectorError;
use crate::sdk::{with_retry_if_and_handler, RetryPolicy};

use super::api::{
    BatchGetRequest, DateRange, Dimension, Metric, ReportRequest, ReportRow, ReportingApi,
    Segment,
};
use super::config::GoogleAnalyticsConfig;

/// One page of a report, normalized from the API response.
#[derive(Debug, Clone, Default)]
pub struct ReportPage {
    /// Dimension ids, in row order.
    pub dimension_names: Vec<String>,
    /// Metric ids, in row order.
    pub metric_names: Vec<String>,
    /// Raw rows.
    pub rows: Vec<ReportRow>,
    /// Continuation token, if more pages follow.
    pub next_page_token: Option<String>,
    /// Total rows matching the query, as reported by the API.
    pub row_count: Option<u64>,
}

/// Builds the report query for a configuration (without page token).
#[must_use]
pub fn build_report_request(config: &GoogleAnalyticsConfig) -> ReportRequest {
    let dimensions = std::iter::once(config.time_series.api_name().to_string())
        .chain(config.dimensions.iter().cloned())
        .map(|name| Dimension { name })
        .collect();
    let metrics = config
        .metrics
        .iter()
        .map(|m| Metric {
            expression: m.clone(),
        })
        .collect();

    let date_ranges = if config.start_date.is_some() || config.end_date.is_some() {
        Some(vec![DateRange {
            start_date: config.start_date.clone(),
            end_date: config.end_date.clone(),
        }])
    } else {
        None
    };

    let segments = if config.segment_ids.is_empty() {
        None
    } else {
        Some(
            config
                .segment_ids
                .iter()
                .map(|id| Segment {
                    segment_id: id.clone(),
                })
                .collect(),
        )
    };

    ReportRequest {
        view_id: config.view_id.clone(),
        dimensions,
        metrics,
        include_empty_rows: true,
        page_size: config.page_size(),
        date_ranges,
        page_token: None,
        metric_filter_clauses: config.metric_filter_clauses.clone(),
        dimension_filter_clauses: config.dimension_filter_clauses.clone(),
        segments,
        filters_expression: config.filters_expression.clone(),
        sampling_level: config
            .sampling_level
            .map(|s| s.as_api_str().to_string()),
    }
}

/// Lazily walks the pages of one report query.
///
/// The sequence is finite and cannot be restarted: it ends after a page
/// without continuation token, after an empty page, or after the first page
/// in preview mode.
pub struct ReportFetcher {
    api: Arc<dyn ReportingApi>,
    request: ReportRequest,
    policy: RetryPolicy,
    preview: bool,
    next_token: Option<String>,
    pages_fetched: u64,
    retries: u64,
    exhausted: bool,
}

impl ReportFetcher {
    /// Creates a fetcher for the query described by `config`.
    #[must_use]
    pub fn new(api: Arc<dyn ReportingApi>, config: &GoogleAnalyticsConfig) -> Self {
        Self {
            api,
            request: build_report_request(config),
            policy: config.retry_policy(),
            preview: config.preview,
            next_token: None,
            pages_fetched: 0,
            retries: 0,
            exhausted: false,
        }
    }

    /// Fetches the next page, or `None` once the report is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the last transient `ConnectorError` once retries are
    /// exhausted, or the first non-transient one. A response without a
    /// report is a `ConnectorError::DataError`.
    pub async fn next_page(&mut self) -> Result<Option<ReportPage>, ConnectorError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut request = self.request.clone();
        request.page_token = self.next_token.clone();
        let batch = BatchGetRequest {
            report_requests: vec![request],
        };

        let api = Arc::clone(&self.api);
        let mut retried = 0u64;
        let result = with_retry_if_and_handler(
            &self.policy,
            "reports.batchGet",
            || api.batch_get(&batch),
            ConnectorError::is_transient,
            |_, _| retried += 1,
        )
        .await;
        self.retries += retried;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        let Some(report) = response.reports.into_iter().next() else {
            self.exhausted = true;
            return Err(ConnectorError::DataError(
                "reports:batchGet returned no report".into(),
            ));
        };

        if self.pages_fetched == 0 {
            info!(
                view_id = %self.request.view_id,
                total_rows = report.data.row_count.unwrap_or(0),
                "report query accepted"
            );
        }
        self.pages_fetched += 1;

        let rows = report.data.rows.unwrap_or_default();
        if rows.is_empty() {
            info!(view_id = %self.request.view_id, "report returned no rows");
            self.exhausted = true;
            return Ok(None);
        }

        let next_page_token = report.next_page_token.filter(|t| !t.is_empty());
        if self.preview {
            debug!("preview mode, stopping after the first page");
            self.exhausted = true;
        } else if let Some(token) = &next_page_token {
            info!(page_token = %token, "fetching next page");
            self.next_token = Some(token.clone());
        } else {
            self.exhausted = true;
        }

        Ok(Some(ReportPage {
            dimension_names: report.column_header.dimensions,
            metric_names: report
                .column_header
                .metric_header
                .metric_header_entries
                .into_iter()
                .map(|e| e.name)
                .collect(),
            rows,
            next_page_token,
            row_count: report.data.row_count,
        }))
    }

    /// Returns the number of pages fetched so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Returns the number of retried calls so far.
    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Returns `true` once no further page will be fetched.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl std::fmt::Debug for ReportFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportFetcher")
            .field("view_id", &self.request.view_id)
            .field("pages_fetched", &self.pages_fetched)
            .field("next_token", &self.next_token)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use crate::testing::{report_page, MockReportingApi};

    fn config(extra: &[(&str, &str)]) -> GoogleAnalyticsConfig {
        let mut cfg = ConnectorConfig::new("google-analytics");
        cfg.set("view_id", "101");
        cfg.set("time_series", "ga:dateHour");
        cfg.set("dimensions", "ga:browser");
        cfg.set("metrics", "ga:sessions");
        cfg.set("client_id", "id");
        cfg.set("client_secret", "secret");
        cfg.set("refresh_token", "token");
        cfg.set("retry_initial_wait_sec", "0");
        for (k, v) in extra {
            cfg.set(*k, *v);
        }
        GoogleAnalyticsConfig::from_config(&cfg).unwrap()
    }

    fn rows(n: usize) -> Vec<(&'static str, &'static str, &'static str)> {
        vec![("2016060100", "Chrome", "1"); n]
    }

    #[test]
    fn test_build_report_request() {
        let cfg = config(&[
            ("start_date", "2016-06-01"),
            ("segment_ids", "gaid::-1"),
            ("sampling_level", "LARGE"),
        ]);
        let req = build_report_request(&cfg);
        assert_eq!(req.view_id, "101");
        assert_eq!(req.dimensions[0].name, "ga:dateHour");
        assert_eq!(req.dimensions[1].name, "ga:browser");
        assert_eq!(req.metrics[0].expression, "ga:sessions");
        assert!(req.include_empty_rows);
        assert_eq!(req.page_size, 10_000);
        let range = &req.date_ranges.unwrap()[0];
        assert_eq!(range.start_date.as_deref(), Some("2016-06-01"));
        assert!(range.end_date.is_none());
        assert_eq!(req.segments.unwrap()[0].segment_id, "gaid::-1");
        assert_eq!(req.sampling_level.as_deref(), Some("LARGE"));
    }

    #[test]
    fn test_build_report_request_without_range() {
        let req = build_report_request(&config(&[("preview", "true")]));
        assert!(req.date_ranges.is_none());
        assert!(req.segments.is_none());
        assert_eq!(req.page_size, 10);
    }

    #[tokio::test]
    async fn test_follows_tokens_in_order() {
        let api = Arc::new(MockReportingApi::new());
        api.push_page(report_page(&rows(2), Some("a"), Some(5)));
        api.push_page(report_page(&rows(2), Some("b"), Some(5)));
        api.push_page(report_page(&rows(1), None, Some(5)));

        let mut fetcher = ReportFetcher::new(api.clone(), &config(&[]));
        let mut total = 0;
        while let Some(page) = fetcher.next_page().await.unwrap() {
            assert_eq!(page.dimension_names, vec!["ga:dateHour", "ga:browser"]);
            total += page.rows.len();
        }
        assert_eq!(total, 5);
        assert_eq!(fetcher.pages_fetched(), 3);
        assert!(fetcher.next_page().await.unwrap().is_none());

        let tokens: Vec<Option<String>> = api
            .batch_requests()
            .iter()
            .map(|r| r.report_requests[0].page_token.clone())
            .collect();
        assert_eq!(tokens, vec![None, Some("a".into()), Some("b".into())]);
    }

    #[tokio::test]
    async fn test_empty_page_ends_sequence() {
        let api = Arc::new(MockReportingApi::new());
        api.push_page(report_page(&[], Some("a"), Some(0)));
        api.push_page(report_page(&rows(1), None, None));

        let mut fetcher = ReportFetcher::new(api.clone(), &config(&[]));
        assert!(fetcher.next_page().await.unwrap().is_none());
        assert!(fetcher.is_exhausted());
        assert_eq!(api.batch_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_preview_stops_after_first_page() {
        let api = Arc::new(MockReportingApi::new());
        api.push_page(report_page(&rows(3), Some("a"), Some(30)));
        api.push_page(report_page(&rows(3), None, Some(30)));

        let mut fetcher = ReportFetcher::new(api.clone(), &config(&[("preview", "true")]));
        assert_eq!(fetcher.next_page().await.unwrap().unwrap().rows.len(), 3);
        assert!(fetcher.next_page().await.unwrap().is_none());
        assert_eq!(api.batch_requests().len(), 1);
        assert_eq!(api.batch_requests()[0].report_requests[0].page_size, 10);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let api = Arc::new(MockReportingApi::new());
        api.push_error(ConnectorError::ServerError {
            status: 503,
            message: "unavailable".into(),
        });
        api.push_error(ConnectorError::RateLimited("quota".into()));
        api.push_page(report_page(&rows(1), None, Some(1)));

        let mut fetcher = ReportFetcher::new(api.clone(), &config(&[]));
        assert_eq!(fetcher.next_page().await.unwrap().unwrap().rows.len(), 1);
        assert_eq!(fetcher.retries(), 2);
        assert_eq!(api.batch_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_limit_reraises_last_error() {
        let api = Arc::new(MockReportingApi::new());
        for _ in 0..3 {
            api.push_error(ConnectorError::ServerError {
                status: 500,
                message: "boom".into(),
            });
        }

        let mut fetcher = ReportFetcher::new(api.clone(), &config(&[("retry_limit", "2")]));
        let err = fetcher.next_page().await.unwrap_err();
        assert!(matches!(err, ConnectorError::ServerError { status: 500, .. }));
        assert_eq!(api.batch_requests().len(), 3);
        assert!(fetcher.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auth_errors_are_not_retried() {
        let api = Arc::new(MockReportingApi::new());
        api.push_error(ConnectorError::AuthenticationFailed("denied".into()));
        api.push_page(report_page(&rows(1), None, None));

        let mut fetcher = ReportFetcher::new(api.clone(), &config(&[]));
        let err = fetcher.next_page().await.unwrap_err();
        assert!(matches!(err, ConnectorError::AuthenticationFailed(_)));
        assert_eq!(api.batch_requests().len(), 1);
        assert_eq!(fetcher.retries(), 0);
    }
}
