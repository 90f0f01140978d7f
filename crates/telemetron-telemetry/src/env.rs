//! Environment-driven configuration.
//!
//! Every variable is optional. Absent, empty or malformed values fall back to
//! the defaults of [`TelemetryConfig`]; resolution never fails.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `OTEL_SERVICE_NAME` | `service_name` |
//! | `OTEL_SERVICE_VERSION` | `service_version` |
//! | `OTEL_ENVIRONMENT` / `DEPLOYMENT_ENVIRONMENT` | `environment` |
//! | `OTEL_EXPORTER_JAEGER_ENDPOINT` / `OTEL_EXPORTER_OTLP_ENDPOINT` | `trace_endpoint` |
//! | `OTEL_EXPORTER_PROMETHEUS_ENDPOINT` | `metrics_endpoint` |
//! | `OTEL_LOGGING_ENABLED` | `logging.enabled` |
//! | `OTEL_LOG_LEVEL` | `logging.level` |
//! | `OTEL_LOG_CONSOLE` | `logging.console` |
//! | `OTEL_LOG_FORMAT` (`json`/`pretty`) | `logging.json_format` |
//! | `OTEL_LOG_FILE_ENABLED` | `logging.file.enabled` |
//! | `OTEL_LOG_DIR` | `logging.file.directory` |
//! | `OTEL_LOG_FILENAME` | `logging.file.filename` |
//! | `OTEL_LOG_MAX_SIZE` | `logging.file.max_size` |
//! | `OTEL_LOG_MAX_FILES` | `logging.file.max_files` |
//! | `OTEL_LOG_DATE_PATTERN` | `logging.file.date_pattern` |
//! | `OTEL_TRACING_ENABLED` | `tracing.enabled` |
//! | `OTEL_TRACE_SAMPLE_RATE` | `tracing.sample_rate` |
//! | `OTEL_METRICS_ENABLED` | `metrics.enabled` |
//! | `OTEL_METRICS_INTERVAL` | `metrics.interval_ms` |

use crate::config::TelemetryConfig;
use std::path::PathBuf;

/// Environment variable names.
pub mod vars {
    /// Service name.
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    /// Service version.
    pub const SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
    /// Deployment environment.
    pub const ENVIRONMENT: &str = "OTEL_ENVIRONMENT";
    /// Fallback for [`ENVIRONMENT`].
    pub const DEPLOYMENT_ENVIRONMENT: &str = "DEPLOYMENT_ENVIRONMENT";
    /// Trace exporter endpoint.
    pub const JAEGER_ENDPOINT: &str = "OTEL_EXPORTER_JAEGER_ENDPOINT";
    /// Fallback for [`JAEGER_ENDPOINT`].
    pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    /// Prometheus listener address.
    pub const PROMETHEUS_ENDPOINT: &str = "OTEL_EXPORTER_PROMETHEUS_ENDPOINT";
    /// Logging toggle.
    pub const LOGGING_ENABLED: &str = "OTEL_LOGGING_ENABLED";
    /// Log level.
    pub const LOG_LEVEL: &str = "OTEL_LOG_LEVEL";
    /// Console sink toggle.
    pub const LOG_CONSOLE: &str = "OTEL_LOG_CONSOLE";
    /// Console format.
    pub const LOG_FORMAT: &str = "OTEL_LOG_FORMAT";
    /// File sink toggle.
    pub const LOG_FILE_ENABLED: &str = "OTEL_LOG_FILE_ENABLED";
    /// Log directory.
    pub const LOG_DIR: &str = "OTEL_LOG_DIR";
    /// Log file prefix.
    pub const LOG_FILENAME: &str = "OTEL_LOG_FILENAME";
    /// Maximum file size.
    pub const LOG_MAX_SIZE: &str = "OTEL_LOG_MAX_SIZE";
    /// Retained file count.
    pub const LOG_MAX_FILES: &str = "OTEL_LOG_MAX_FILES";
    /// Rotation date pattern.
    pub const LOG_DATE_PATTERN: &str = "OTEL_LOG_DATE_PATTERN";
    /// Tracing toggle.
    pub const TRACING_ENABLED: &str = "OTEL_TRACING_ENABLED";
    /// Trace sample rate.
    pub const TRACE_SAMPLE_RATE: &str = "OTEL_TRACE_SAMPLE_RATE";
    /// Metrics toggle.
    pub const METRICS_ENABLED: &str = "OTEL_METRICS_ENABLED";
    /// Metrics interval in milliseconds.
    pub const METRICS_INTERVAL: &str = "OTEL_METRICS_INTERVAL";
}

impl TelemetryConfig {
    /// Resolves configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration from an arbitrary lookup function.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(vars::SERVICE_NAME) {
            config.service_name = v;
        }
        if let Some(v) = get(vars::SERVICE_VERSION) {
            config.service_version = v;
        }
        if let Some(v) = get(vars::ENVIRONMENT).or_else(|| get(vars::DEPLOYMENT_ENVIRONMENT)) {
            config.environment = v;
        }
        if let Some(v) = get(vars::JAEGER_ENDPOINT).or_else(|| get(vars::OTLP_ENDPOINT)) {
            config.trace_endpoint = v;
        }
        if let Some(v) = get(vars::PROMETHEUS_ENDPOINT) {
            config.metrics_endpoint = v;
        }

        let logging = &mut config.logging;
        if let Some(v) = get(vars::LOGGING_ENABLED).as_deref().and_then(parse_bool) {
            logging.enabled = v;
        }
        if let Some(v) = get(vars::LOG_LEVEL).and_then(|v| v.parse().ok()) {
            logging.level = v;
        }
        if let Some(v) = get(vars::LOG_CONSOLE).as_deref().and_then(parse_bool) {
            logging.console = v;
        }
        match get(vars::LOG_FORMAT).map(|v| v.to_lowercase()).as_deref() {
            Some("json") => logging.json_format = true,
            Some("pretty") => logging.json_format = false,
            _ => {}
        }
        if let Some(v) = get(vars::LOG_FILE_ENABLED).as_deref().and_then(parse_bool) {
            logging.file.enabled = v;
        }
        if let Some(v) = get(vars::LOG_DIR) {
            logging.file.directory = v;
        }
        if let Some(v) = get(vars::LOG_FILENAME) {
            logging.file.filename = v;
        }
        if let Some(v) = get(vars::LOG_MAX_SIZE) {
            logging.file.max_size = v;
        }
        if let Some(v) = get(vars::LOG_MAX_FILES) {
            logging.file.max_files = v;
        }
        if let Some(v) = get(vars::LOG_DATE_PATTERN) {
            logging.file.date_pattern = v;
        }

        if let Some(v) = get(vars::TRACING_ENABLED).as_deref().and_then(parse_bool) {
            config.tracing.enabled = v;
        }
        if let Some(v) = get(vars::TRACE_SAMPLE_RATE).and_then(|v| v.trim().parse::<f64>().ok()) {
            config.tracing.sample_rate = v;
        }

        if let Some(v) = get(vars::METRICS_ENABLED).as_deref().and_then(parse_bool) {
            config.metrics.enabled = v;
        }
        if let Some(v) = get(vars::METRICS_INTERVAL).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.metrics.interval_ms = v;
        }

        config
    }
}

/// Resolves configuration from the process environment.
#[must_use]
pub fn config_from_env() -> TelemetryConfig {
    TelemetryConfig::from_env()
}

/// Loads a `.env` file into the process environment, if one exists.
///
/// Returns the path that was loaded.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(err) if err.not_found() => None,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load .env file");
            None
        }
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{FileLogConfig, LogConfig, LogLevel};
    use crate::metrics::MetricsConfig;
    use crate::tracing::TracingConfig;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = TelemetryConfig::from_lookup(|_| None);
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.tracing.sample_rate, 1.0);
        assert_eq!(config.metrics.interval_ms, 30_000);
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_literal_and_env_are_equal() {
        let from_env = TelemetryConfig::from_lookup(lookup(&[
            (vars::SERVICE_NAME, "orders"),
            (vars::SERVICE_VERSION, "2.3.1"),
            (vars::DEPLOYMENT_ENVIRONMENT, "staging"),
            (vars::OTLP_ENDPOINT, "http://collector:4317"),
            (vars::PROMETHEUS_ENDPOINT, "127.0.0.1:9100"),
            (vars::LOG_LEVEL, "DEBUG"),
            (vars::LOG_FORMAT, "pretty"),
            (vars::LOG_FILE_ENABLED, "yes"),
            (vars::LOG_DIR, "/var/log/orders"),
            (vars::LOG_MAX_FILES, "7d"),
            (vars::TRACE_SAMPLE_RATE, "0.2"),
            (vars::METRICS_ENABLED, "false"),
            (vars::METRICS_INTERVAL, "15000"),
        ]));

        let literal = TelemetryConfig::builder()
            .service_name("orders")
            .service_version("2.3.1")
            .environment("staging")
            .trace_endpoint("http://collector:4317")
            .metrics_endpoint("127.0.0.1:9100")
            .logging(LogConfig {
                level: LogLevel::Debug,
                json_format: false,
                file: FileLogConfig {
                    enabled: true,
                    directory: "/var/log/orders".to_string(),
                    max_files: "7d".to_string(),
                    ..FileLogConfig::default()
                },
                ..LogConfig::default()
            })
            .tracing(TracingConfig {
                enabled: true,
                sample_rate: 0.2,
            })
            .metrics(MetricsConfig {
                enabled: false,
                interval_ms: 15_000,
            })
            .build();

        assert_eq!(from_env, literal);
    }

    #[test]
    fn test_primary_variables_win_over_fallbacks() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            (vars::ENVIRONMENT, "production"),
            (vars::DEPLOYMENT_ENVIRONMENT, "staging"),
            (vars::JAEGER_ENDPOINT, "http://jaeger:4317"),
            (vars::OTLP_ENDPOINT, "http://otlp:4317"),
        ]));
        assert_eq!(config.environment, "production");
        assert_eq!(config.trace_endpoint, "http://jaeger:4317");
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            (vars::TRACE_SAMPLE_RATE, "lots"),
            (vars::METRICS_INTERVAL, "-5"),
            (vars::TRACING_ENABLED, "maybe"),
            (vars::LOG_LEVEL, "chatty"),
            (vars::LOG_FORMAT, "xml"),
            (vars::SERVICE_NAME, "   "),
        ]));
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_out_of_range_is_kept_until_normalized() {
        let config = TelemetryConfig::from_lookup(lookup(&[(vars::TRACE_SAMPLE_RATE, "5")]));
        assert_eq!(config.tracing.sample_rate, 5.0);
        assert_eq!(config.normalized().tracing.sample_rate, 1.0);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
