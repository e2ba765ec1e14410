//! Connector configuration types.
//!
//! Provides a generic configuration model for connectors:
//! - [`ConnectorConfig`]: Key-value configuration with validation
//! - [`ConfigKeySpec`]: Specification for a configuration key
//! - [`ConnectorState`]: Lifecycle state of a running connector

use std::collections::HashMap;
use std::fmt;

use crate::error::ConnectorError;

/// Configuration for a connector instance.
///
/// Connectors receive their configuration as a string key-value map,
/// typically flattened from a job file plus the persisted state of the
/// previous run.
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    /// The connector type identifier (e.g., "google-analytics").
    connector_type: String,

    /// Configuration properties.
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates a new connector config with the given type.
    #[must_use]
    pub fn new(connector_type: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            properties: HashMap::new(),
        }
    }

    /// Creates a config from existing properties.
    #[must_use]
    pub fn with_properties(
        connector_type: impl Into<String>,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            connector_type: connector_type.into(),
            properties,
        }
    }

    /// Returns the connector type identifier.
    #[must_use]
    pub fn connector_type(&self) -> &str {
        &self.connector_type
    }

    /// Sets a configuration property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a configuration property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets a property, treating blank values as absent.
    #[must_use]
    pub fn get_non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Gets a required configuration property, returning an error if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if the key is not set.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.get(key)
            .ok_or_else(|| ConnectorError::MissingConfig(key.to_string()))
    }

    /// Gets a property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|e| {
                ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Gets a comma-separated list property. Missing keys yield an empty list.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns all properties as a reference.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Validates the configuration against a set of key specifications.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` for missing required keys.
    pub fn validate(&self, specs: &[ConfigKeySpec]) -> Result<(), ConnectorError> {
        for spec in specs {
            if spec.required && spec.default.is_none() && self.get(&spec.key).is_none() {
                return Err(ConnectorError::MissingConfig(spec.key.clone()));
            }
        }
        Ok(())
    }
}

/// Specification for a configuration key.
///
/// Used by connectors to declare their expected configuration.
#[derive(Debug, Clone)]
pub struct ConfigKeySpec {
    /// The configuration key name.
    pub key: String,

    /// Human-readable description.
    pub description: String,

    /// Whether this key is required.
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,
}

impl ConfigKeySpec {
    /// Creates a required configuration key spec.
    #[must_use]
    pub fn required(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional configuration key spec with a default value.
    #[must_use]
    pub fn optional(
        key: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: Some(default.into()),
        }
    }

    /// Creates an optional configuration key spec without a default.
    #[must_use]
    pub fn optional_no_default(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: None,
        }
    }
}

/// Lifecycle state of a running connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Connector has been created but not yet opened.
    Created,

    /// Connector is initializing (authenticating, resolving columns).
    Initializing,

    /// Connector is running and processing data.
    Running,

    /// Connector has drained every page of its report.
    Exhausted,

    /// Connector has been closed.
    Closed,

    /// Connector has failed and cannot recover.
    Failed,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorState::Created => write!(f, "Created"),
            ConnectorState::Initializing => write!(f, "Initializing"),
            ConnectorState::Running => write!(f, "Running"),
            ConnectorState::Exhausted => write!(f, "Exhausted"),
            ConnectorState::Closed => write!(f, "Closed"),
            ConnectorState::Failed => write!(f, "Failed"),
        }
    }
}
