//! Handler descriptors.
//!
//! A [`HandlerDescriptor`] is the registration record interceptors read on
//! every invocation. It names the handler (owning type and method) and carries
//! whatever trace and metrics metadata was attached to it.
//!
//! # Example
//!
//! ```
//! use telemetron_core::{HandlerDescriptor, OperationKind, TraceOptions};
//!
//! let descriptor = HandlerDescriptor::new("UserController", "get_user")
//!     .with_trace(TraceOptions::new().preset(OperationKind::Http, "get_user"));
//!
//! assert_eq!(descriptor.span_name(), Some("UserController.get_user".to_string()));
//! assert!(descriptor.metrics().is_none());
//! ```

use crate::metadata::{MetricsMetadata, TraceMetadata};

/// Registration record for one handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDescriptor {
    class_name: String,
    method_name: String,
    trace: Option<TraceMetadata>,
    metrics: Option<MetricsMetadata>,
}

impl HandlerDescriptor {
    /// Creates a descriptor without any instrumentation metadata.
    #[must_use]
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            trace: None,
            metrics: None,
        }
    }

    /// Attaches trace metadata.
    #[must_use]
    pub fn with_trace(mut self, metadata: TraceMetadata) -> Self {
        self.trace = Some(metadata);
        self
    }

    /// Attaches metrics metadata.
    #[must_use]
    pub fn with_metrics(mut self, metadata: MetricsMetadata) -> Self {
        self.metrics = Some(metadata);
        self
    }

    /// Returns the owning type name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the method name.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns the trace metadata, if any.
    #[must_use]
    pub fn trace(&self) -> Option<&TraceMetadata> {
        self.trace.as_ref()
    }

    /// Returns the metrics metadata, if any.
    #[must_use]
    pub fn metrics(&self) -> Option<&MetricsMetadata> {
        self.metrics.as_ref()
    }

    /// Returns the span name for traced handlers.
    #[must_use]
    pub fn span_name(&self) -> Option<String> {
        self.trace.as_ref().map(|t| t.span_name(&self.class_name))
    }
}
