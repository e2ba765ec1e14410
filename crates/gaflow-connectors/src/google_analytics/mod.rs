//! Google Analytics report source connector.
//!
//! Extracts time-series reports from the Reporting API v4 and produces
//! Arrow `RecordBatch` data through the [`SourceConnector`] trait, one
//! batch per report page.
//!
//! # Features
//!
//! - Column resolution against the metadata catalog, including templated
//!   (`XX`) custom dimensions and metrics
//! - Timezone-correct parsing of the time-series dimension (DST aware)
//! - Freshness filter dropping buckets that are not finalized yet
//! - Incremental watermark state carried between runs
//! - Exponential backoff on rate limits, 5xx and transport failures
//! - Service-account and refresh-token authentication
//!
//! # Usage
//!
//! ```rust,ignore
//! use gaflow_connectors::google_analytics::{GoogleAnalyticsConfig, GoogleAnalyticsSource};
//!
//! let config = GoogleAnalyticsConfig::from_config(&connector_config)?;
//! let tokens = Arc::new(OAuthTokenProvider::from_credentials(&config.credentials).await?);
//! let api = Arc::new(HttpReportingApi::new(tokens));
//! let source = GoogleAnalyticsSource::new(config, api, Arc::new(SystemClock));
//! ```
//!
//! [`SourceConnector`]: crate::connector::SourceConnector

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod metrics;
pub mod source;
pub mod transform;
pub mod watermark;

pub use api::{HttpReportingApi, ReportingApi};
pub use auth::{OAuthTokenProvider, TokenProvider};
pub use config::{Credentials, GoogleAnalyticsConfig, SamplingLevel, TimeSeries};
pub use source::GoogleAnalyticsSource;
pub use transform::{Clock, SystemClock};
pub use watermark::WatermarkState;
