//! Structured logging with trace correlation.
//!
//! [`init_logging`] installs the global `tracing` subscriber: a console sink
//! (JSON or pretty), an optional rolling file sink written through a
//! non-blocking worker, and the OpenTelemetry bridge layer when a tracer is
//! supplied.
//!
//! [`LoggingService`] is the handle application code logs through. Every
//! record carries the service name and, when an OpenTelemetry span is active
//! in the current context, its `trace_id` and `span_id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use telemetron_telemetry::logging::LoggingService;
//!
//! let log = LoggingService::new("orders");
//! log.http("GET", "/orders/7", 200, 12.5, None);
//! log.error("payment declined", None, Some(&serde_json::json!({"order": 7})));
//! ```

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::TelemetryResult;
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors.
    Error,
    /// Warnings.
    Warn,
    /// Informational records.
    Info,
    /// HTTP access records.
    Http,
    /// Verbose diagnostics.
    Verbose,
    /// Debug output.
    Debug,
}

impl LogLevel {
    /// Returns the lowercase level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Http => "http",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        }
    }

    /// Returns the `tracing` level records at this level are emitted with.
    #[must_use]
    pub const fn tracing_level(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info | Self::Http => tracing::Level::INFO,
            Self::Verbose | Self::Debug => tracing::Level::DEBUG,
        }
    }

    /// Returns the `EnvFilter` directive for this threshold.
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info | Self::Http => "info",
            Self::Verbose | Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "http" => Ok(Self::Http),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Minimum level.
    pub level: LogLevel,

    /// Whether to write to stdout.
    pub console: bool,

    /// Whether console output is JSON (otherwise pretty).
    pub json_format: bool,

    /// Rolling file sink.
    pub file: FileLogConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            console: true,
            json_format: true,
            file: FileLogConfig::default(),
        }
    }
}

/// Rolling file sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// Whether the file sink is enabled.
    pub enabled: bool,

    /// Directory log files are written to.
    pub directory: String,

    /// File name prefix.
    pub filename: String,

    /// Maximum file size (e.g. `20m`).
    pub max_size: String,

    /// Retention, as a file count (`14`) or days (`14d`).
    pub max_files: String,

    /// Date pattern selecting the rotation period.
    pub date_pattern: String,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "logs".to_string(),
            filename: "app".to_string(),
            max_size: "20m".to_string(),
            max_files: "14d".to_string(),
            date_pattern: "YYYY-MM-DD".to_string(),
        }
    }
}

impl FileLogConfig {
    /// Maps the date pattern to a rotation period.
    #[must_use]
    pub fn rotation(&self) -> Rotation {
        match self.date_pattern.as_str() {
            "YYYY-MM-DD-HH-mm" => Rotation::MINUTELY,
            "YYYY-MM-DD-HH" => Rotation::HOURLY,
            "YYYY-MM-DD" => Rotation::DAILY,
            _ => Rotation::NEVER,
        }
    }

    /// Parses the retention into a file count.
    #[must_use]
    pub fn retained_files(&self) -> Option<usize> {
        let trimmed = self.max_files.trim();
        trimmed
            .strip_suffix('d')
            .unwrap_or(trimmed)
            .parse()
            .ok()
            .filter(|n| *n > 0)
    }
}

/// Worker guards for non-blocking sinks.
///
/// Dropping the guards flushes buffered records.
#[derive(Debug, Default)]
pub struct LogGuards {
    guards: Vec<WorkerGuard>,
}

impl LogGuards {
    /// Returns the number of active background writers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Returns `true` if no background writer is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initializes the logging subsystem.
///
/// Installs the global subscriber. Disabled logging installs nothing.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the file appender cannot be
/// created or a global subscriber is already installed.
pub fn init_logging(
    config: &TelemetryConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> TelemetryResult<LogGuards> {
    let log = &config.logging;
    if !log.enabled {
        return Ok(LogGuards::default());
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = LogGuards::default();

    if log.console {
        let layer: BoxedLayer = if log.json_format {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_filter(env_filter(log.level))
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_filter(env_filter(log.level))
                .boxed()
        };
        layers.push(layer);
    }

    if log.file.enabled {
        let appender = file_appender(&log.file)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter(log.level))
                .boxed(),
        );
    }

    if let Some(tracer) = tracer {
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    if log.file.enabled && !log.file.max_size.trim().is_empty() {
        tracing::info!(
            max_size = %log.file.max_size,
            date_pattern = %log.file.date_pattern,
            "size-based log rotation is not supported, rotating by date only"
        );
    }

    Ok(guards)
}

/// Builds the level filter. `RUST_LOG` wins when set.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.filter_directive()))
}

fn file_appender(config: &FileLogConfig) -> TelemetryResult<RollingFileAppender> {
    let mut builder = RollingFileAppender::builder()
        .rotation(config.rotation())
        .filename_prefix(config.filename.clone())
        .filename_suffix("log");
    if let Some(max) = config.retained_files() {
        builder = builder.max_log_files(max);
    }
    builder
        .build(&config.directory)
        .map_err(|e| TelemetryError::LoggingInit(format!("{}: {e}", config.directory)))
}

/// Standard log field names.
pub mod fields {
    /// Service name field.
    pub const SERVICE: &str = "service";

    /// Feature scope field.
    pub const FEATURE: &str = "feature";

    /// Trace ID field.
    pub const TRACE_ID: &str = "trace_id";

    /// Span ID field.
    pub const SPAN_ID: &str = "span_id";

    /// Level name field (keeps `http`/`verbose` distinguishable).
    pub const LEVEL_NAME: &str = "level_name";

    /// JSON context field.
    pub const CONTEXT: &str = "context";

    /// Stack trace field.
    pub const STACK: &str = "stack";

    /// HTTP method field.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP URL field.
    pub const HTTP_URL: &str = "http.url";

    /// HTTP status code field.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration field (milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Database statement field.
    pub const DB_QUERY: &str = "db.query";
}

macro_rules! emit {
    ($level:expr, $($rest:tt)+) => {
        match $level {
            LogLevel::Error => tracing::error!($($rest)+),
            LogLevel::Warn => tracing::warn!($($rest)+),
            LogLevel::Info | LogLevel::Http => tracing::info!($($rest)+),
            LogLevel::Verbose | LogLevel::Debug => tracing::debug!($($rest)+),
        }
    };
}

/// Leveled structured logger enriched with trace identifiers.
///
/// Records above the logger's threshold are dropped before they reach
/// `tracing`, so `http` and `verbose` keep their own rank even though they
/// share `tracing` levels with `info` and `debug`.
///
/// Cloning is cheap. No method blocks on sink I/O or returns an error.
#[derive(Debug, Clone)]
pub struct LoggingService {
    service: Arc<str>,
    feature: Option<Arc<str>>,
    threshold: LogLevel,
}

impl LoggingService {
    /// Creates a logger for `service_name`.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service: Arc::from(service_name.into()),
            feature: None,
            threshold: LogLevel::Debug,
        }
    }

    /// Sets the most verbose level this logger emits.
    #[must_use]
    pub fn with_level(mut self, threshold: LogLevel) -> Self {
        self.threshold = threshold;
        self
    }

    /// Returns the logger's threshold.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.threshold
    }

    /// Returns `true` if records at `level` pass the threshold.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.threshold
    }

    /// Returns a logger whose records carry a `feature` field.
    #[must_use]
    pub fn with_scope(&self, feature: impl Into<String>) -> Self {
        Self {
            service: Arc::clone(&self.service),
            feature: Some(Arc::from(feature.into())),
            threshold: self.threshold,
        }
    }

    /// Returns the feature scope, if any.
    #[must_use]
    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    /// Writes one structured record.
    pub fn log(&self, level: LogLevel, message: &str, context: Option<&Value>) {
        if !self.enabled(level) {
            return;
        }
        let (trace_id, span_id) = current_ids();
        let context = context.map(Value::to_string);
        emit!(
            level,
            service = %self.service,
            feature = self.feature.as_deref(),
            trace_id = trace_id.as_deref(),
            span_id = span_id.as_deref(),
            level_name = level.as_str(),
            context = context.as_deref(),
            "{message}"
        );
    }

    /// Logs an error and marks the active span as failed.
    ///
    /// When a span is active in the current context, an `exception` event is
    /// recorded on it and its status is set to `Error(message)`.
    pub fn error(&self, message: &str, stack: Option<&str>, context: Option<&Value>) {
        let (trace_id, span_id) = current_ids();
        let context = context.map(Value::to_string);
        tracing::error!(
            service = %self.service,
            feature = self.feature.as_deref(),
            trace_id = trace_id.as_deref(),
            span_id = span_id.as_deref(),
            level_name = LogLevel::Error.as_str(),
            stack,
            context = context.as_deref(),
            "{message}"
        );

        let cx = Context::current();
        if cx.has_active_span() {
            let span = cx.span();
            let mut attributes = vec![
                KeyValue::new("exception.type", "Error"),
                KeyValue::new("exception.message", message.to_string()),
            ];
            if let Some(stack) = stack {
                attributes.push(KeyValue::new("exception.stacktrace", stack.to_string()));
            }
            span.add_event("exception", attributes);
            span.set_status(Status::error(message.to_string()));
        }
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str, context: Option<&Value>) {
        self.log(LogLevel::Warn, message, context);
    }

    /// Logs at info level.
    pub fn info(&self, message: &str, context: Option<&Value>) {
        self.log(LogLevel::Info, message, context);
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str, context: Option<&Value>) {
        self.log(LogLevel::Debug, message, context);
    }

    /// Logs at verbose level.
    pub fn verbose(&self, message: &str, context: Option<&Value>) {
        self.log(LogLevel::Verbose, message, context);
    }

    /// Writes an HTTP access record.
    pub fn http(
        &self,
        method: &str,
        url: &str,
        status: u16,
        duration_ms: f64,
        context: Option<&Value>,
    ) {
        if !self.enabled(LogLevel::Http) {
            return;
        }
        let (trace_id, span_id) = current_ids();
        let context = context.map(Value::to_string);
        tracing::info!(
            service = %self.service,
            feature = self.feature.as_deref(),
            trace_id = trace_id.as_deref(),
            span_id = span_id.as_deref(),
            level_name = LogLevel::Http.as_str(),
            http.method = method,
            http.url = url,
            http.status_code = status,
            duration_ms,
            context = context.as_deref(),
            "{method} {url} {status} {duration_ms}ms"
        );
    }

    /// Writes a database query record at debug level.
    pub fn db_query(&self, query: &str, duration_ms: f64, context: Option<&Value>) {
        if !self.enabled(LogLevel::Debug) {
            return;
        }
        let (trace_id, span_id) = current_ids();
        let context = context.map(Value::to_string);
        tracing::debug!(
            service = %self.service,
            feature = self.feature.as_deref(),
            trace_id = trace_id.as_deref(),
            span_id = span_id.as_deref(),
            level_name = LogLevel::Debug.as_str(),
            db.query = query,
            duration_ms,
            context = context.as_deref(),
            "database query took {duration_ms}ms"
        );
    }
}

/// Trace and span ids of the active span in the current context.
fn current_ids() -> (Option<String>, Option<String>) {
    let cx = Context::current();
    let span = cx.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        (
            Some(span_context.trace_id().to_string()),
            Some(span_context.span_id().to_string()),
        )
    } else {
        (None, None)
    }
}
