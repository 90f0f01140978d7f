//! OpenTelemetry adapters for Telemetron.
//!
//! This crate wraps the OpenTelemetry SDK and the `metrics` ecosystem behind
//! three small services, plus the configuration and bootstrap that create them:
//!
//! - **Configuration** ([`config`], [`env`]): typed configuration from literals,
//!   TOML or environment variables
//! - **Logging** ([`logging`]): structured JSON logs enriched with trace ids
//! - **Metrics** ([`metrics`]): named counter/histogram/gauge cache over a
//!   Prometheus recorder
//! - **Tracing** ([`tracing`]): span lifecycle helpers over OTLP export
//! - **Bootstrap** ([`sdk`]): starts and stops all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    telemetron-telemetry                   │
//! │                                                           │
//! │  ┌────────────────┐ ┌────────────────┐ ┌───────────────┐ │
//! │  │ TracingService │ │ MetricsService │ │LoggingService │ │
//! │  └───────┬────────┘ └───────┬────────┘ └───────┬───────┘ │
//! │          │                  │                  │         │
//! └──────────┼──────────────────┼──────────────────┼─────────┘
//!            ▼                  ▼                  ▼
//!      ┌──────────┐       ┌──────────┐      ┌────────────┐
//!      │   OTLP   │       │Prometheus│      │stdout/files│
//!      │ Collector│       │ /metrics │      │   (JSON)   │
//!      └──────────┘       └──────────┘      └────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use telemetron_telemetry::{config_from_env, load_dotenv, TelemetrySdk};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     load_dotenv();
//!     let sdk = TelemetrySdk::start(&config_from_env()).await?;
//!
//!     sdk.metrics_service().record_http_request("GET", "/health", 200, 1.2);
//!     sdk.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod sdk;
pub mod tracing;

pub use self::config::{TelemetryConfig, TelemetryConfigBuilder};
pub use self::env::{config_from_env, load_dotenv};
pub use self::error::TelemetryError;
pub use self::logging::{init_logging, FileLogConfig, LogConfig, LogLevel, LoggingService};
pub use self::metrics::{init_metrics, Meter, MetricsConfig, MetricsService};
pub use self::sdk::TelemetrySdk;
pub use self::tracing::{init_tracing, ActiveSpan, SpanOptions, TracingConfig, TracingService};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
