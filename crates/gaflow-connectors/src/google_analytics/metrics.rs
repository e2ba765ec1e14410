//! Google Analytics source connector metrics.
//!
//! [`GoogleAnalyticsSourceMetrics`] provides lock-free atomic counters for
//! tracking extraction statistics, convertible to the SDK's
//! [`ConnectorMetrics`] type.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::ConnectorMetrics;

/// Atomic counters for Google Analytics source statistics.
#[derive(Debug)]
pub struct GoogleAnalyticsSourceMetrics {
    /// Report pages fetched.
    pub pages_fetched: AtomicU64,
    /// Rows handed downstream.
    pub rows_emitted: AtomicU64,
    /// Approximate bytes of the raw values of emitted rows.
    pub bytes_emitted: AtomicU64,
    /// Rows dropped because their bucket was not finalized.
    pub rows_skipped_too_early: AtomicU64,
    /// Rows dropped because they were at or before the watermark.
    pub rows_skipped_watermark: AtomicU64,
    /// Retried API calls.
    pub retries: AtomicU64,
    /// Failed polls.
    pub errors: AtomicU64,
}

impl GoogleAnalyticsSourceMetrics {
    /// Creates a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            bytes_emitted: AtomicU64::new(0),
            rows_skipped_too_early: AtomicU64::new(0),
            rows_skipped_watermark: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Records one fetched page and its filtering outcome.
    pub fn record_page(&self, emitted: u64, bytes: u64, too_early: u64, watermark: u64) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.rows_emitted.fetch_add(emitted, Ordering::Relaxed);
        self.bytes_emitted.fetch_add(bytes, Ordering::Relaxed);
        self.rows_skipped_too_early
            .fetch_add(too_early, Ordering::Relaxed);
        self.rows_skipped_watermark
            .fetch_add(watermark, Ordering::Relaxed);
    }

    /// Records `n` retried calls.
    pub fn record_retries(&self, n: u64) {
        self.retries.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a failed poll.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Converts to the SDK's [`ConnectorMetrics`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_connector_metrics(&self) -> ConnectorMetrics {
        let mut m = ConnectorMetrics {
            records_total: self.rows_emitted.load(Ordering::Relaxed),
            bytes_total: self.bytes_emitted.load(Ordering::Relaxed),
            errors_total: self.errors.load(Ordering::Relaxed),
            custom: Vec::new(),
        };
        m.add_custom(
            "ga.pages_fetched",
            self.pages_fetched.load(Ordering::Relaxed) as f64,
        );
        m.add_custom(
            "ga.rows_skipped_too_early",
            self.rows_skipped_too_early.load(Ordering::Relaxed) as f64,
        );
        m.add_custom(
            "ga.rows_skipped_watermark",
            self.rows_skipped_watermark.load(Ordering::Relaxed) as f64,
        );
        m.add_custom("ga.retries", self.retries.load(Ordering::Relaxed) as f64);
        m
    }
}

impl Default for GoogleAnalyticsSourceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
