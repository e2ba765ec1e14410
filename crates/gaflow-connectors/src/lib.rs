//! # gaflow Connectors
//!
//! Connector SDK and the Google Analytics report source.
//!
//! ## Connector SDK
//!
//! The SDK provides traits and utilities for building extraction
//! connectors:
//!
//! - [`connector`] - Core traits (`SourceConnector`, `PageSink`)
//! - [`serde`] - Batch-to-row conversion and NDJSON output
//! - [`runtime`] - Drives a source into a sink for one run
//! - [`sdk`] - Retry with exponential backoff
//! - [`testing`] - Mock API, sink and clock
//!
//! ## Architecture
//!
//! ```text
//! ReportingApi ─> ReportFetcher ─> RowTransformer ─> RecordBatch
//!                                                        │
//!   run_extraction: SourceConnector(poll) ─> rows ─> PageSink(add/finish)
//!                   SourceConnector(checkpoint) ─> WatermarkState (next run)
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::float_cmp,
        clippy::unreadable_literal,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
    )
)]

// ── Connector SDK ──

/// Connector error types.
pub mod error;

/// Connector configuration types.
pub mod config;

/// Core connector traits (`SourceConnector`, `PageSink`).
pub mod connector;

/// Connector checkpoint types.
pub mod checkpoint;

/// Connector health status types.
pub mod health;

/// Connector metrics types.
pub mod metrics;

/// Batch-to-row conversion and NDJSON output.
pub mod serde;

/// Extraction runtime driving a source into a sink.
pub mod runtime;

/// Testing utilities (mock API, sink, clock).
pub mod testing;

/// Connector SDK - retry and backoff.
pub mod sdk;

// ── Connectors ──

/// Google Analytics report source connector.
pub mod google_analytics;
