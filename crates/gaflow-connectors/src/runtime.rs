//! Extraction runtime.
//!
//! [`run_extraction`] drives one source to exhaustion and hands every
//! accepted row to a [`PageSink`]:
//!
//! ```text
//! open -> begin(schema) -> poll_batch* -> add(row)* -> finish -> checkpoint -> close
//! ```
//!
//! A run either completes (sink finished, next state returned) or fails
//! (sink never finished, no state returned). The source is closed in both
//! cases. On failure the sink holds exactly the rows of the pages polled
//! before the failing one.

use tracing::{debug, info, warn};

use crate::config::ConnectorConfig;
use crate::connector::{PageSink, SourceConnector};
use crate::error::ConnectorError;
use crate::google_analytics::watermark::WatermarkState;
use crate::metrics::{RuntimeMetrics, RuntimeMetricsSnapshot};
use crate::serde::batch_to_rows;

/// Configuration for the extraction runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum records per source poll batch (a hint to the source).
    pub max_poll_batch_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_poll_batch_size: 10_000,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// State to persist and re-inject into the next run's config. Empty
    /// when incremental mode is off.
    pub state: WatermarkState,
    /// Counters of the run.
    pub metrics: RuntimeMetricsSnapshot,
}

/// Runs one extraction.
///
/// `config` is passed to `open`; an empty config keeps the configuration
/// the source was constructed with.
///
/// # Errors
///
/// Returns the first `ConnectorError` raised by the source or the sink.
/// The sink's `finish` is not called in that case.
pub async fn run_extraction<S>(
    source: &mut S,
    sink: &mut dyn PageSink,
    config: &ConnectorConfig,
    runtime: &RuntimeConfig,
) -> Result<ExtractionOutcome, ConnectorError>
where
    S: SourceConnector + ?Sized,
{
    let metrics = RuntimeMetrics::new();

    match drive(source, sink, config, runtime, &metrics).await {
        Ok(()) => {
            let state = WatermarkState::from_checkpoint(&source.checkpoint());
            if let Err(e) = source.close().await {
                warn!(error = %e, "failed to close source after a successful run");
            }
            let snapshot = metrics.snapshot();
            info!(
                records = snapshot.records_total,
                batches = snapshot.batches_total,
                start_date = ?state.start_date,
                end_date = ?state.end_date,
                last_record_time = ?state.last_record_time,
                "extraction finished"
            );
            Ok(ExtractionOutcome {
                state,
                metrics: snapshot,
            })
        }
        Err(e) => {
            metrics.record_error();
            if let Err(close_err) = source.close().await {
                warn!(error = %close_err, "failed to close source after a failed run");
            }
            warn!(error = %e, class = ?e.class(), "extraction failed");
            Err(e)
        }
    }
}

async fn drive<S>(
    source: &mut S,
    sink: &mut dyn PageSink,
    config: &ConnectorConfig,
    runtime: &RuntimeConfig,
    metrics: &RuntimeMetrics,
) -> Result<(), ConnectorError>
where
    S: SourceConnector + ?Sized,
{
    source.open(config).await?;
    sink.begin(&source.schema())?;

    while let Some(batch) = source.poll_batch(runtime.max_poll_batch_size).await? {
        let bytes = batch.records.get_array_memory_size() as u64;
        let rows = batch_to_rows(&batch.records)?;
        let count = rows.len() as u64;
        for row in rows {
            sink.add(row)?;
        }
        metrics.record_batch(count, bytes);
        debug!(
            records = count,
            page_token = ?batch.page_token,
            "delivered batch"
        );
    }

    sink.finish()
}
