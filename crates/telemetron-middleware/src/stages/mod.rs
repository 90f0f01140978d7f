//! Built-in interceptors.
//!
//! 1. [`tracing`] - One span per traced invocation
//! 2. [`metrics`] - Counter and duration histogram per metered invocation
//!
//! The default chain runs tracing outermost, so the metrics interceptor and
//! the handler both see the invocation span as the active context.

pub mod metrics;
pub mod tracing;

pub use metrics::MetricsInterceptor;
pub use tracing::TracingInterceptor;
