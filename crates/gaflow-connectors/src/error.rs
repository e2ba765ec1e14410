//! Connector SDK error types.
//!
//! Provides a unified error hierarchy for all connector operations:
//! - `ConnectorError`: Top-level error for source/sink connector operations
//! - `ErrorClass`: Coarse classification used by retry policies
//! - `SerdeError`: Serialization/deserialization errors

use thiserror::Error;

/// Coarse classification of a [`ConnectorError`].
///
/// Retry policies only ever retry [`ErrorClass::Transient`] errors; every
/// other class aborts the run immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid configuration, unknown columns, rejected credentials.
    Config,
    /// Upstream data that cannot be ingested safely.
    Data,
    /// Server-side failures and rate limits that may succeed on retry.
    Transient,
    /// Anything else (client bugs, rejected requests, I/O).
    Fatal,
}

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to reach the external system.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication or authorization error.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid connector configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// A requested dimension or metric is not present in the column catalog.
    #[error("unknown metric/dimension '{0}'")]
    UnknownColumn(String),

    /// Upstream data could not be ingested (unparseable time, roll-up marker,
    /// missing view).
    #[error("data error: {0}")]
    DataError(String),

    /// The upstream API throttled the request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The upstream API failed with a 5xx status.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The upstream API rejected the request (4xx other than auth/throttling).
    #[error("request rejected ({status}): {message}")]
    RequestRejected {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Error reading data from a source.
    #[error("read error: {0}")]
    ReadError(String),

    /// Error writing data to a sink.
    #[error("write error: {0}")]
    WriteError(String),

    /// Serialization or deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] SerdeError),

    /// The connector is not in the expected state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// The expected state.
        expected: String,
        /// The actual state.
        actual: String,
    },

    /// An internal error that doesn't fit other categories.
    #[error("internal error: {0}")]
    Internal(String),

    /// An I/O error from the underlying system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Returns the class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectorError::ConfigurationError(_)
            | ConnectorError::MissingConfig(_)
            | ConnectorError::UnknownColumn(_)
            | ConnectorError::AuthenticationFailed(_) => ErrorClass::Config,
            ConnectorError::DataError(_) => ErrorClass::Data,
            ConnectorError::RateLimited(_)
            | ConnectorError::ServerError { .. }
            | ConnectorError::ConnectionFailed(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if retrying the failed operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Errors that occur during record serialization or deserialization.
#[derive(Debug, Error)]
pub enum SerdeError {
    /// JSON parsing or encoding error.
    #[error("JSON error: {0}")]
    Json(String),

    /// A required field is missing from the input.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A field value could not be converted to the target Arrow type.
    #[error("type conversion error: field '{field}', expected {expected}: {message}")]
    TypeConversion {
        /// The field name.
        field: String,
        /// The expected Arrow data type.
        expected: String,
        /// Details about the conversion failure.
        message: String,
    },

    /// The input data is malformed.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl From<serde_json::Error> for SerdeError {
    fn from(e: serde_json::Error) -> Self {
        SerdeError::Json(e.to_string())
    }
}
