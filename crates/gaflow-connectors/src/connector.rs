//! Core connector traits.
//!
//! Defines the seams between the extraction runtime and the outside world:
//! - `SourceConnector`: Reads pages from an external system as Arrow batches
//! - `PageSink`: Receives typed rows, in order, once they are accepted
//! - `FieldValue`: One typed cell handed to a `PageSink`

use std::fmt;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::checkpoint::SourceCheckpoint;
use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::health::HealthStatus;
use crate::metrics::ConnectorMetrics;

/// A batch of records read from a source connector.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    /// The records as an Arrow `RecordBatch`.
    pub records: RecordBatch,

    /// Continuation token of the page this batch was built from, if any.
    pub page_token: Option<String>,
}

impl SourceBatch {
    /// Creates a new source batch.
    #[must_use]
    pub fn new(records: RecordBatch) -> Self {
        Self {
            records,
            page_token: None,
        }
    }

    /// Creates a source batch tagged with the page token that produced it.
    #[must_use]
    pub fn with_page_token(records: RecordBatch, page_token: impl Into<String>) -> Self {
        Self {
            records,
            page_token: Some(page_token.into()),
        }
    }

    /// Returns the number of records in the batch.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.records.num_rows()
    }
}

/// Trait for source connectors that read data from external systems.
///
/// # Lifecycle
///
/// 1. `restore()` - Optionally seed the source with persisted state
/// 2. `open()` - Authenticate, resolve columns, discover schema
/// 3. `poll_batch()` - Read batches until `Ok(None)`
/// 4. `checkpoint()` - Capture state for the next run
/// 5. `close()` - Clean shutdown
///
/// # Example
///
/// ```rust,ignore
/// struct MySource { /* ... */ }
///
/// #[async_trait]
/// impl SourceConnector for MySource {
///     async fn open(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError> {
///         Ok(())
///     }
///
///     async fn poll_batch(&mut self, max_records: usize) -> Result<Option<SourceBatch>, ConnectorError> {
///         Ok(None) // None = source exhausted
///     }
///
///     // ... other methods
/// }
/// ```
#[async_trait]
pub trait SourceConnector: Send {
    /// Opens the connector and initializes the connection.
    ///
    /// Called once before any polling begins. An empty `config` keeps the
    /// configuration the connector was constructed with.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if connection or initialization fails.
    async fn open(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError>;

    /// Polls for the next batch of records.
    ///
    /// Returns `Ok(Some(batch))` when records are available, or `Ok(None)`
    /// once the source is exhausted.
    ///
    /// The `max_records` parameter is a hint; implementations may return
    /// fewer or more.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on read failure.
    async fn poll_batch(
        &mut self,
        max_records: usize,
    ) -> Result<Option<SourceBatch>, ConnectorError>;

    /// Returns the schema of records produced by this source.
    fn schema(&self) -> SchemaRef;

    /// Creates a checkpoint of the current source position.
    ///
    /// The returned checkpoint contains enough information to resume
    /// reading from this position on the next run.
    fn checkpoint(&self) -> SourceCheckpoint;

    /// Restores the source to a previously checkpointed position.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the checkpoint is invalid or the source
    /// is not in a state that accepts a restore.
    async fn restore(&mut self, checkpoint: &SourceCheckpoint) -> Result<(), ConnectorError>;

    /// Returns the current health status of the connector.
    fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    /// Returns current metrics from the connector.
    fn metrics(&self) -> ConnectorMetrics {
        ConnectorMetrics::default()
    }

    /// Closes the connector and releases all resources.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if cleanup fails.
    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// A single typed value handed to a [`PageSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Missing or empty value.
    Null,
    /// 64-bit integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Absolute point in time.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Returns `true` for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the string payload, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Long(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Timestamp(t) => {
                write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

/// Receiver of accepted rows.
///
/// `add` is called once per row, in row order, with values in resolved
/// column order. `finish` is called exactly once after the last row of a
/// successful run (also when no row was accepted) and never after a failure.
pub trait PageSink: Send {
    /// Announces the schema of the rows that follow.
    ///
    /// Called once, after the source is opened and before the first `add`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the sink cannot accept this schema.
    fn begin(&mut self, _schema: &SchemaRef) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Consumes one record.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the record cannot be written.
    fn add(&mut self, values: Vec<FieldValue>) -> Result<(), ConnectorError>;

    /// Flushes and seals the sink.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if buffered output cannot be flushed.
    fn finish(&mut self) -> Result<(), ConnectorError>;
}
