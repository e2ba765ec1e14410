//! Connector metrics types.
//!
//! Provides metrics reporting for connectors:
//! - `ConnectorMetrics`: Metrics reported by a connector implementation
//! - `RuntimeMetrics`: Metrics tracked by the extraction runtime

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics reported by a connector implementation.
///
/// Connectors return this from their `metrics()` method to expose
/// internal state to the runtime and to logs.
#[derive(Debug, Clone, Default)]
pub struct ConnectorMetrics {
    /// Total number of records processed.
    pub records_total: u64,

    /// Total bytes processed.
    pub bytes_total: u64,

    /// Number of errors encountered.
    pub errors_total: u64,

    /// Additional connector-specific metrics.
    pub custom: Vec<(String, f64)>,
}

impl ConnectorMetrics {
    /// Creates empty metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom metric.
    pub fn add_custom(&mut self, name: impl Into<String>, value: f64) {
        self.custom.push((name.into(), value));
    }

    /// Looks up a custom metric by name.
    #[must_use]
    pub fn custom_value(&self, name: &str) -> Option<f64> {
        self.custom
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Metrics tracked by the extraction runtime.
///
/// Maintained by the runtime driving a source, independent of the
/// connector implementation.
#[derive(Debug)]
pub struct RuntimeMetrics {
    /// Total records handed to the sink.
    pub records_total: AtomicU64,

    /// Total in-memory bytes of the batches handed to the sink.
    pub bytes_total: AtomicU64,

    /// Total errors encountered.
    pub errors_total: AtomicU64,

    /// Total number of batches processed.
    pub batches_total: AtomicU64,
}

impl RuntimeMetrics {
    /// Creates a new runtime metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records_total: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            batches_total: AtomicU64::new(0),
        }
    }

    /// Records that a batch of records was processed.
    pub fn record_batch(&self, record_count: u64, byte_count: u64) {
        self.records_total
            .fetch_add(record_count, Ordering::Relaxed);
        self.bytes_total.fetch_add(byte_count, Ordering::Relaxed);
        self.batches_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an error.
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> RuntimeMetricsSnapshot {
        RuntimeMetricsSnapshot {
            records_total: self.records_total.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            batches_total: self.batches_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of runtime metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeMetricsSnapshot {
    /// Total records processed.
    pub records_total: u64,

    /// Total bytes processed.
    pub bytes_total: u64,

    /// Total errors.
    pub errors_total: u64,

    /// Total batches.
    pub batches_total: u64,
}
