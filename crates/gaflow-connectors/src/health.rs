//! Connector health status types.

use std::fmt;

use crate::config::ConnectorState;

/// Health status of a connector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Connector is healthy and operating normally.
    Healthy,

    /// Connector is degraded but still operational.
    /// Contains a description of the degradation.
    Degraded(String),

    /// Connector is unhealthy and not processing data.
    /// Contains a description of the failure.
    Unhealthy(String),

    /// Health status is unknown (e.g., connector not yet opened).
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Returns `true` if the connector is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Returns `true` if the connector can still process data.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded(_))
    }

    /// Maps a lifecycle state to its default health.
    #[must_use]
    pub fn from_state(state: ConnectorState) -> Self {
        match state {
            ConnectorState::Running | ConnectorState::Exhausted => HealthStatus::Healthy,
            ConnectorState::Created | ConnectorState::Initializing => HealthStatus::Unknown,
            ConnectorState::Closed => HealthStatus::Unhealthy("closed".into()),
            ConnectorState::Failed => HealthStatus::Unhealthy("failed".into()),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded(msg) => write!(f, "Degraded: {msg}"),
            HealthStatus::Unhealthy(msg) => write!(f, "Unhealthy: {msg}"),
            HealthStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_checks() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Healthy.is_operational());

        let degraded = HealthStatus::Degraded("rate limited".into());
        assert!(!degraded.is_healthy());
        assert!(degraded.is_operational());

        let unhealthy = HealthStatus::Unhealthy("closed".into());
        assert!(!unhealthy.is_healthy());
        assert!(!unhealthy.is_operational());

        assert!(!HealthStatus::Unknown.is_operational());
    }

    #[test]
    fn test_health_from_state() {
        assert_eq!(
            HealthStatus::from_state(ConnectorState::Created),
            HealthStatus::Unknown
        );
        assert!(HealthStatus::from_state(ConnectorState::Exhausted).is_healthy());
        assert!(matches!(
            HealthStatus::from_state(ConnectorState::Failed),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "Healthy");
        assert!(HealthStatus::Degraded("slow".into())
            .to_string()
            .contains("slow"));
    }
}
