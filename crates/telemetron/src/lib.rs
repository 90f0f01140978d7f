//! # Telemetron
//!
//! **OpenTelemetry instrumentation for async Rust services**
//!
//! Telemetron bundles everything a service needs to emit traces, metrics and
//! structured logs:
//!
//! - **Configuration** – Defaults, TOML files and `OTEL_*` environment variables resolved into one config
//! - **Adapters** – Tracing, metrics and logging services over the OpenTelemetry and `metrics` SDKs
//! - **Declarative instrumentation** – `#[traced]`, `#[trace_http]`, `#[metered]` and friends
//! - **Interceptors** – A tracing then metrics chain that wraps any async handler
//! - **Module registration** – One call starts the SDK and exports every service as a provider
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use telemetron::prelude::*;
//!
//! struct UserController;
//!
//! impl UserController {
//!     #[trace_http(record_args)]
//!     #[metrics_http]
//!     async fn get_user(&self, id: u64) -> Result<User, AppError> {
//!         // ...
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TelemetryError> {
//!     let module = TelemetryModule::for_root(config_from_env()).await?;
//!     let chain = module.interceptor_chain();
//!
//!     let descriptor = Arc::new(
//!         HandlerDescriptor::new("UserController", "get_user")
//!             .with_trace(UserController::__telemetron_trace_get_user())
//!             .with_metrics(UserController::__telemetron_metrics_get_user()),
//!     );
//!     let mut ctx = InvocationContext::new(descriptor).with_arguments(vec![json!(42)]);
//!     let result = chain.invoke(&mut ctx, |_| Box::pin(async { Ok(json!({"id": 42})) })).await;
//!
//!     module.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! config ─▶ TelemetrySdk ─▶ TracingService / MetricsService / LoggingService
//!                                   │
//! #[traced] metadata ─▶ HandlerDescriptor ─▶ InterceptorChain ─▶ handler
//!                                             (tracing ─▶ metrics)
//! ```

#![doc(html_root_url = "https://docs.rs/telemetron/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod module;

// Re-export core types
pub use telemetron_core as core;

// Re-export telemetry adapters
pub use telemetron_telemetry as telemetry;

// Re-export interceptors
pub use telemetron_middleware as middleware;

// Re-export instrumentation attributes
pub use telemetron_macros::{
    metered, metrics_business, metrics_db, metrics_http, trace_business, trace_db,
    trace_external, trace_http, traced,
};

pub use module::{FeatureOptions, FeatureTelemetry, TelemetryModule};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use telemetron::prelude::*;
///
/// let descriptor = HandlerDescriptor::new("Billing", "charge");
/// assert_eq!(descriptor.span_name(), None);
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use telemetron_core::{
        AttrValue, Attributes, HandlerDescriptor, HandlerError, HandlerResult, MetricsMetadata,
        MetricsOptions, OperationKind, SpanKind, TraceMetadata, TraceOptions,
    };

    // Re-export DI types
    pub use telemetron_core::di::{Container, InjectionError};

    // Re-export adapters and bootstrap
    pub use telemetron_telemetry::{
        config_from_env, load_dotenv, LogLevel, LoggingService, MetricsService, SpanOptions,
        TelemetryConfig, TelemetryError, TelemetryResult, TelemetrySdk, TracingService,
    };

    // Re-export interceptors
    pub use telemetron_middleware::{
        HttpRequestInfo, Interceptor, InterceptorChain, InvocationContext, MetricsInterceptor,
        Next, TracingInterceptor,
    };

    // Re-export instrumentation attributes
    pub use telemetron_macros::{
        metered, metrics_business, metrics_db, metrics_http, trace_business, trace_db,
        trace_external, trace_http, traced,
    };

    pub use crate::module::{FeatureOptions, FeatureTelemetry, TelemetryModule};
}
