//! Telemetry configuration.
//!
//! A [`TelemetryConfig`] is resolved once, at module registration, and is
//! read-only afterwards. It can come from literal values (the builder), a
//! TOML file, or the process environment (see [`crate::env`]).

use crate::error::TelemetryError;
use crate::logging::{LogConfig, LogLevel};
use crate::metrics::MetricsConfig;
use crate::tracing::TracingConfig;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default service name.
pub const DEFAULT_SERVICE_NAME: &str = "unknown-service";

/// Default service version.
pub const DEFAULT_SERVICE_VERSION: &str = "1.0.0";

/// Default deployment environment.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default OTLP trace endpoint.
pub const DEFAULT_TRACE_ENDPOINT: &str = "http://localhost:4317";

/// Default Prometheus listener address.
pub const DEFAULT_METRICS_ENDPOINT: &str = "0.0.0.0:9464";

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name (used in metrics, traces, and logs).
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Environment (production, staging, development).
    pub environment: String,

    /// OTLP endpoint spans are exported to.
    pub trace_endpoint: String,

    /// Address the Prometheus scrape endpoint listens on.
    pub metrics_endpoint: String,

    /// Logging configuration.
    pub logging: LogConfig,

    /// Tracing configuration.
    pub tracing: TracingConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> TelemetryResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TelemetryResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Clamps out-of-range values.
    ///
    /// The sample rate is clamped to `[0.0, 1.0]` (NaN becomes `1.0`) and a
    /// zero metrics interval is replaced by the default. Each correction is
    /// logged.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let rate = self.tracing.sample_rate;
        if rate.is_nan() {
            tracing::warn!(sample_rate = rate, "sample rate is NaN, using 1.0");
            self.tracing.sample_rate = 1.0;
        } else if !(0.0..=1.0).contains(&rate) {
            let clamped = rate.clamp(0.0, 1.0);
            tracing::warn!(
                sample_rate = rate,
                clamped,
                "sample rate out of range, clamping"
            );
            self.tracing.sample_rate = clamped;
        }

        if self.metrics.interval_ms == 0 {
            tracing::warn!(
                default = MetricsConfig::DEFAULT_INTERVAL_MS,
                "metrics interval is zero, using default"
            );
            self.metrics.interval_ms = MetricsConfig::DEFAULT_INTERVAL_MS;
        }

        self
    }

    /// Validates the configuration without modifying it.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "service_name must not be empty".to_string(),
            ));
        }
        if self.metrics.enabled && self.metrics_endpoint.parse::<std::net::SocketAddr>().is_err() {
            return Err(TelemetryError::InvalidAddress(self.metrics_endpoint.clone()));
        }
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_version: DEFAULT_SERVICE_VERSION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            trace_endpoint: DEFAULT_TRACE_ENDPOINT.to_string(),
            metrics_endpoint: DEFAULT_METRICS_ENDPOINT.to_string(),
            logging: LogConfig::default(),
            tracing: TracingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.config.service_name = name.to_string();
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn service_version(mut self, version: &str) -> Self {
        self.config.service_version = version.to_string();
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.config.environment = env.to_string();
        self
    }

    /// Sets the OTLP trace endpoint.
    #[must_use]
    pub fn trace_endpoint(mut self, endpoint: &str) -> Self {
        self.config.trace_endpoint = endpoint.to_string();
        self
    }

    /// Sets the Prometheus listener address.
    #[must_use]
    pub fn metrics_endpoint(mut self, addr: &str) -> Self {
        self.config.metrics_endpoint = addr.to_string();
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.config.logging = config;
        self
    }

    /// Sets the tracing configuration.
    #[must_use]
    pub fn tracing(mut self, config: TracingConfig) -> Self {
        self.config.tracing = config;
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.config.metrics = config;
        self
    }

    /// Sets the log level.
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Sets the trace sample rate.
    #[must_use]
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.tracing.sample_rate = rate;
        self
    }

    /// Sets the metrics collection interval in milliseconds.
    #[must_use]
    pub fn metrics_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.metrics.interval_ms = interval_ms;
        self
    }

    /// Enables or disables tracing.
    #[must_use]
    pub fn tracing_enabled(mut self, enabled: bool) -> Self {
        self.config.tracing.enabled = enabled;
        self
    }

    /// Enables or disables metrics.
    #[must_use]
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    /// Enables or disables logging.
    #[must_use]
    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.config.logging.enabled = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}
