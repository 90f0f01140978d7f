//! Procedural macros for Telemetron instrumentation.
//!
//! This crate provides method-level attribute macros that attach tracing and
//! metrics metadata to handlers. Each attribute leaves the annotated function
//! untouched and emits a hidden sibling function returning the metadata, which
//! is then registered on a `HandlerDescriptor` and read by the interceptors.
//!
//! # Example
//!
//! ```rust,ignore
//! use telemetron_core::HandlerDescriptor;
//! use telemetron_macros::{metrics_http, trace_http};
//!
//! struct UserController;
//!
//! impl UserController {
//!     #[trace_http(record_args)]
//!     #[metrics_http]
//!     pub async fn get_user(&self, id: u64) -> Result<User, Error> {
//!         // ...
//!     }
//! }
//!
//! let descriptor = HandlerDescriptor::new("UserController", "get_user")
//!     .with_trace(UserController::__telemetron_trace_get_user())
//!     .with_metrics(UserController::__telemetron_metrics_get_user());
//! ```
//!
//! # Generated Code
//!
//! `#[trace_http(record_args)]` on `get_user(&self, id: u64)` generates
//! approximately:
//!
//! ```rust,ignore
//! #[doc(hidden)]
//! pub fn __telemetron_trace_get_user() -> ::telemetron_core::TraceMetadata {
//!     let argument_names: [&str; 1usize] = ["id"];
//!     ::telemetron_core::TraceOptions::new()
//!         .record_args(true)
//!         .argument_names(argument_names)
//!         .preset(::telemetron_core::OperationKind::Http, "get_user")
//! }
//! ```
//!
//! # Arguments
//!
//! | Argument                        | Trace | Metrics | Value                                |
//! |---------------------------------|-------|---------|--------------------------------------|
//! | `name`                          | yes   |         | span name                            |
//! | `kind`                          | `#[traced]` only | | `Internal`, `Server`, `Client`, ... |
//! | `record_args`                   | yes   | yes     | flag or bool                         |
//! | `record_result`                 | yes   |         | flag or bool                         |
//! | `record_status`                 |       | yes     | flag or bool                         |
//! | `counter` / `histogram`         |       | yes     | instrument name                      |
//! | `attributes("key" = value, ..)` | yes   | yes     | string, integer, float or bool       |
//!
//! The trace presets fix the span kind, so `#[trace_http(kind = Client)]`
//! and its siblings fail to compile rather than silently overriding the
//! caller's `kind`. Use `#[traced(kind = ...)]` when a different kind is
//! wanted. Every other argument merges over the preset as usual.
//!
//! Anything else is a compile error. Generated code refers to
//! `::telemetron_core`, so the calling crate must depend on it.

mod expand;
mod parse;

use expand::{expand_metrics, expand_trace, Preset};
use proc_macro::TokenStream;

fn trace(preset: Option<Preset>, attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_trace(preset, attr.into(), item.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn metrics(preset: Option<Preset>, attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_metrics(preset, attr.into(), item.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Traces a method. Span kind defaults to `Internal`.
///
/// ```rust,ignore
/// #[traced(name = "cache.refresh", kind = Internal, attributes("cache" = "users"))]
/// async fn refresh(&self) -> Result<(), Error> { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    trace(None, attr, item)
}

/// Traces an HTTP handler: `Server` span, `operation.type = "http"`.
///
/// Passing `kind` is a compile error: the span kind is fixed by the preset.
#[proc_macro_attribute]
pub fn trace_http(attr: TokenStream, item: TokenStream) -> TokenStream {
    trace(Some(Preset::Http), attr, item)
}

/// Traces a database call: `Client` span, `operation.type = "database"`.
/// Rejects `kind` like [`macro@trace_http`].
#[proc_macro_attribute]
pub fn trace_db(attr: TokenStream, item: TokenStream) -> TokenStream {
    trace(Some(Preset::Database), attr, item)
}

/// Traces an outbound call: `Client` span, `operation.type = "external"`.
/// Rejects `kind` like [`macro@trace_http`].
#[proc_macro_attribute]
pub fn trace_external(attr: TokenStream, item: TokenStream) -> TokenStream {
    trace(Some(Preset::External), attr, item)
}

/// Traces business logic: `Internal` span, `operation.type = "business"`.
/// Rejects `kind` like [`macro@trace_http`].
#[proc_macro_attribute]
pub fn trace_business(attr: TokenStream, item: TokenStream) -> TokenStream {
    trace(Some(Preset::Business), attr, item)
}

/// Counts and times a method with `method_invocations_total` /
/// `method_duration_ms` unless overridden.
///
/// ```rust,ignore
/// #[metered(counter = "imports_total", histogram = "import_duration_ms", record_args)]
/// async fn import(&self, batch: u32) -> Result<(), Error> { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn metered(attr: TokenStream, item: TokenStream) -> TokenStream {
    metrics(None, attr, item)
}

/// Meters an HTTP handler with `http_requests_total` / `http_request_duration_ms`.
#[proc_macro_attribute]
pub fn metrics_http(attr: TokenStream, item: TokenStream) -> TokenStream {
    metrics(Some(Preset::Http), attr, item)
}

/// Meters a database call with `db_queries_total` / `db_query_duration_ms`.
#[proc_macro_attribute]
pub fn metrics_db(attr: TokenStream, item: TokenStream) -> TokenStream {
    metrics(Some(Preset::Database), attr, item)
}

/// Meters business logic with `business_operations_total` /
/// `business_operation_duration_ms`.
#[proc_macro_attribute]
pub fn metrics_business(attr: TokenStream, item: TokenStream) -> TokenStream {
    metrics(Some(Preset::Business), attr, item)
}
