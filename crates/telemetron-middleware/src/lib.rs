//! # Telemetron Middleware
//!
//! Interceptors that wrap instrumented handler invocations.
//!
//! Handlers are registered with a [`HandlerDescriptor`](telemetron_core::HandlerDescriptor)
//! carrying their trace and metrics metadata. Every call builds an
//! [`InvocationContext`] and runs through an [`InterceptorChain`]:
//!
//! ```text
//! invoke → Tracing → Metrics → Handler
//!                                 ↓
//! result ← Tracing ← Metrics ←────┘
//! ```
//!
//! | Interceptor | Purpose                                          |
//! |-------------|--------------------------------------------------|
//! | Tracing     | One span per traced call, active while it runs   |
//! | Metrics     | Invocation counter and duration histogram        |
//!
//! Interceptors observe results and never alter them: a handler error is
//! returned to the caller as the very same value.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use telemetron_core::{HandlerDescriptor, MetricsOptions};
//! use telemetron_middleware::{InterceptorChain, InvocationContext, MetricsInterceptor};
//! use telemetron_telemetry::MetricsService;
//!
//! # tokio_test::block_on(async {
//! let chain = InterceptorChain::builder()
//!     .interceptor(MetricsInterceptor::new(MetricsService::disabled()))
//!     .build();
//!
//! let descriptor = Arc::new(
//!     HandlerDescriptor::new("Calculator", "add").with_metrics(MetricsOptions::new().build("add")),
//! );
//! let mut ctx = InvocationContext::new(descriptor).with_arguments(vec![json!(2), json!(3)]);
//! let sum = chain
//!     .invoke(&mut ctx, |ctx| {
//!         let total: i64 = ctx.arguments().iter().filter_map(|v| v.as_i64()).sum();
//!         Box::pin(async move { Ok(json!(total)) })
//!     })
//!     .await;
//! assert_eq!(sum.unwrap(), json!(5));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/telemetron-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod context;
pub mod interceptor;
pub mod stages;

pub use chain::{BoxedInterceptor, InterceptorChain, InterceptorChainBuilder};
pub use context::{HttpRequestInfo, InvocationContext};
pub use interceptor::{BoxFuture, FnInterceptor, Handler, Interceptor, Next};
pub use stages::{MetricsInterceptor, TracingInterceptor};
