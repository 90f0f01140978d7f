//! # Telemetron Core
//!
//! Core types shared by every Telemetron crate:
//!
//! - [`TraceMetadata`] / [`MetricsMetadata`] - Declarative per-handler instrumentation records
//! - [`OperationKind`] - Closed set of instrumentation presets (HTTP, database, external, business)
//! - [`HandlerDescriptor`] - Explicit registration of a handler and its metadata
//! - [`AttrValue`] - Static attribute values attached to spans and metrics
//! - [`HandlerError`] - Business error wrapper that flows unchanged through interceptors
//! - [`di::Container`] - Provider container used by module registration

#![doc(html_root_url = "https://docs.rs/telemetron-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod attributes;
mod descriptor;
pub mod di;
mod error;
pub mod metadata;

pub use attributes::{merge_attributes, AttrValue, Attributes};
pub use descriptor::HandlerDescriptor;
pub use error::{HandlerError, HandlerResult};
pub use metadata::{
    MetricsMetadata, MetricsOptions, MetricsPreset, OperationKind, SpanKind, TraceMetadata,
    TraceOptions,
};
