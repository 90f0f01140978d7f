//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize tracing.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An instrument was requested while metrics are disabled.
    #[error("Metrics are disabled: no meter is configured")]
    MetricsDisabled,

    /// Metric name does not match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    #[error("Invalid metric name: {0:?}")]
    InvalidMetricName(String),

    /// The name is already registered as a different instrument kind.
    #[error("Metric {name:?} is registered as a {existing}, not a {requested}")]
    InstrumentKindMismatch {
        /// Metric name.
        name: String,
        /// Kind already cached under the name.
        existing: &'static str,
        /// Kind that was requested.
        requested: &'static str,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration factory could not resolve a dependency.
    #[error(transparent)]
    Injection(#[from] telemetron_core::di::InjectionError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Returns `true` for [`TelemetryError::MetricsDisabled`].
    #[must_use]
    pub const fn is_metrics_disabled(&self) -> bool {
        matches!(self, Self::MetricsDisabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::MetricsInit("failed".to_string());
        assert_eq!(err.to_string(), "Failed to initialize metrics: failed");

        let err = TelemetryError::InstrumentKindMismatch {
            name: "jobs".to_string(),
            existing: "counter",
            requested: "histogram",
        };
        assert_eq!(
            err.to_string(),
            "Metric \"jobs\" is registered as a counter, not a histogram"
        );
    }

    #[test]
    fn test_is_metrics_disabled() {
        assert!(TelemetryError::MetricsDisabled.is_metrics_disabled());
        assert!(!TelemetryError::InvalidMetricName("1x".into()).is_metrics_disabled());
    }
}
