//! Connector SDK - operational resilience.
//!
//! The SDK provides higher-level utilities built on top of the core connector
//! traits:
//!
//! - **Retry & Resilience**: [`RetryPolicy`], [`with_retry_if_and_handler`]
//!
//! # Example: Using Retry Policy
//!
//! ```rust,ignore
//! use gaflow_connectors::sdk::{RetryPolicy, with_retry_if_and_handler};
//!
//! let policy = RetryPolicy::exponential(5, Duration::from_secs(2));
//! let result = with_retry_if_and_handler(&policy, "op", || async {
//!     // Operation that might fail transiently
//!     Ok::<_, ConnectorError>(42)
//! }, ConnectorError::is_transient, |_, _| {}).await;
//! ```

pub mod retry;

pub use retry::{with_retry_if_and_handler, RetryPolicy};
