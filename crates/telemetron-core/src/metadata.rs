//! Declarative instrumentation metadata.
//!
//! Handlers are described by two immutable records:
//!
//! - [`TraceMetadata`] - how a handler invocation becomes a span
//! - [`MetricsMetadata`] - which counter/histogram an invocation feeds
//!
//! Both are built once, when the handler is registered, and read on every
//! invocation by the interceptors. The attribute macros in `telemetron-macros`
//! expand into calls to the [`TraceOptions`] and [`MetricsOptions`] builders
//! below; code that prefers explicit registration can call them directly.
//!
//! # Presets
//!
//! [`OperationKind`] is the closed set of presets. A preset fixes the span
//! kind, contributes an `operation.type` attribute and (for metrics) default
//! instrument names:
//!
//! | Kind | Span kind | `operation.type` | Counter | Histogram |
//! |------|-----------|------------------|---------|-----------|
//! | `Http` | `Server` | `http` | `http_requests_total` | `http_request_duration_ms` |
//! | `Database` | `Client` | `database` | `db_queries_total` | `db_query_duration_ms` |
//! | `External` | `Client` | `external` | `external_calls_total` | `external_call_duration_ms` |
//! | `Business` | `Internal` | `business` | `business_operations_total` | `business_operation_duration_ms` |
//!
//! # Example
//!
//! ```
//! use telemetron_core::{OperationKind, SpanKind, TraceOptions};
//!
//! let metadata = TraceOptions::new()
//!     .kind(SpanKind::Client) // ignored: the preset fixes the kind
//!     .attribute("team", "accounts")
//!     .preset(OperationKind::Http, "get_user");
//!
//! assert_eq!(metadata.kind, SpanKind::Server);
//! assert_eq!(metadata.attributes.len(), 2);
//! ```

use crate::attributes::{merge_attributes, AttrValue, Attributes};

pub use opentelemetry::trace::SpanKind;

/// Attribute key carrying the preset's operation type.
pub const OPERATION_TYPE: &str = "operation.type";

/// Default counter name for handlers without a preset.
pub const DEFAULT_COUNTER: &str = "method_invocations_total";

/// Default histogram name for handlers without a preset.
pub const DEFAULT_HISTOGRAM: &str = "method_duration_ms";

/// The closed set of instrumentation presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Inbound HTTP request handling.
    Http,
    /// Database queries.
    Database,
    /// Calls to external services.
    External,
    /// Business operations.
    Business,
}

impl OperationKind {
    /// Returns the span kind fixed by this preset.
    #[must_use]
    pub fn span_kind(self) -> SpanKind {
        match self {
            Self::Http => SpanKind::Server,
            Self::Database | Self::External => SpanKind::Client,
            Self::Business => SpanKind::Internal,
        }
    }

    /// Returns the value of the `operation.type` attribute.
    #[must_use]
    pub const fn operation_type(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Database => "database",
            Self::External => "external",
            Self::Business => "business",
        }
    }

    /// Returns the default instrument names for this preset.
    #[must_use]
    pub const fn metrics_preset(self) -> MetricsPreset {
        match self {
            Self::Http => MetricsPreset {
                counter_name: "http_requests_total",
                histogram_name: "http_request_duration_ms",
            },
            Self::Database => MetricsPreset {
                counter_name: "db_queries_total",
                histogram_name: "db_query_duration_ms",
            },
            Self::External => MetricsPreset {
                counter_name: "external_calls_total",
                histogram_name: "external_call_duration_ms",
            },
            Self::Business => MetricsPreset {
                counter_name: "business_operations_total",
                histogram_name: "business_operation_duration_ms",
            },
        }
    }

    /// Returns the fixed attribute set contributed by this preset.
    #[must_use]
    pub fn preset_attributes(self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            OPERATION_TYPE.to_string(),
            AttrValue::from(self.operation_type()),
        );
        attributes
    }
}

/// Default instrument names of a metrics preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsPreset {
    /// Counter incremented once per invocation.
    pub counter_name: &'static str,
    /// Histogram recording invocation duration in milliseconds.
    pub histogram_name: &'static str,
}

/// Trace configuration attached to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceMetadata {
    /// Explicit span name. `None` means `Class.method`.
    pub name: Option<String>,
    /// Span kind.
    pub kind: SpanKind,
    /// Static span attributes.
    pub attributes: Attributes,
    /// Whether invocation arguments become span attributes.
    pub record_args: bool,
    /// Whether the serialized result becomes a span attribute.
    pub record_result: bool,
    /// Argument names, in declaration order.
    pub argument_names: Vec<String>,
    /// Name of the annotated function.
    pub original_method_name: String,
}

impl TraceMetadata {
    /// Returns the span name for a handler owned by `class_name`.
    #[must_use]
    pub fn span_name(&self, class_name: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if class_name.is_empty() => self.original_method_name.clone(),
            None => format!("{class_name}.{}", self.original_method_name),
        }
    }
}

/// Caller-supplied trace options.
///
/// Unset fields fall back to defaults (or to the preset, for
/// [`TraceOptions::preset`]).
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    name: Option<String>,
    kind: Option<SpanKind>,
    attributes: Attributes,
    record_args: Option<bool>,
    record_result: Option<bool>,
    argument_names: Vec<String>,
}

impl TraceOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit span name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the span kind. Presets ignore this value.
    #[must_use]
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Adds a static attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a set of static attributes.
    #[must_use]
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Enables or disables argument recording.
    #[must_use]
    pub fn record_args(mut self, enabled: bool) -> Self {
        self.record_args = Some(enabled);
        self
    }

    /// Enables or disables result recording.
    #[must_use]
    pub fn record_result(mut self, enabled: bool) -> Self {
        self.record_result = Some(enabled);
        self
    }

    /// Sets the argument names used for recorded arguments.
    #[must_use]
    pub fn argument_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builds metadata for the plain trace annotation.
    #[must_use]
    pub fn build(self, method_name: &str) -> TraceMetadata {
        TraceMetadata {
            name: self.name,
            kind: self.kind.unwrap_or(SpanKind::Internal),
            attributes: self.attributes,
            record_args: self.record_args.unwrap_or(false),
            record_result: self.record_result.unwrap_or(false),
            argument_names: self.argument_names,
            original_method_name: method_name.to_string(),
        }
    }

    /// Builds metadata for a preset.
    ///
    /// The preset's span kind always wins over a caller-supplied kind.
    /// Attributes are merged key by key, caller values overriding the preset.
    #[must_use]
    pub fn preset(self, kind: OperationKind, method_name: &str) -> TraceMetadata {
        let attributes = merge_attributes(&kind.preset_attributes(), &self.attributes);
        TraceMetadata {
            kind: kind.span_kind(),
            attributes,
            ..self.build(method_name)
        }
    }
}

/// Metrics configuration attached to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsMetadata {
    /// Counter incremented once per invocation.
    pub counter_name: String,
    /// Histogram recording duration in milliseconds.
    pub histogram_name: String,
    /// Static metric attributes.
    pub attributes: Attributes,
    /// Whether invocation arguments become metric attributes.
    pub record_args: bool,
    /// Argument names, in declaration order.
    pub argument_names: Vec<String>,
    /// Whether the outcome (`success`/`error`) becomes a metric attribute.
    pub record_status: bool,
    /// Name of the annotated function.
    pub original_method_name: String,
}

/// Caller-supplied metrics options.
#[derive(Debug, Clone, Default)]
pub struct MetricsOptions {
    counter_name: Option<String>,
    histogram_name: Option<String>,
    attributes: Attributes,
    record_args: Option<bool>,
    record_status: Option<bool>,
    argument_names: Vec<String>,
}

impl MetricsOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the counter name.
    #[must_use]
    pub fn counter(mut self, name: impl Into<String>) -> Self {
        self.counter_name = Some(name.into());
        self
    }

    /// Sets the histogram name.
    #[must_use]
    pub fn histogram(mut self, name: impl Into<String>) -> Self {
        self.histogram_name = Some(name.into());
        self
    }

    /// Adds a static attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a set of static attributes.
    #[must_use]
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Enables or disables argument recording.
    #[must_use]
    pub fn record_args(mut self, enabled: bool) -> Self {
        self.record_args = Some(enabled);
        self
    }

    /// Enables or disables outcome recording.
    #[must_use]
    pub fn record_status(mut self, enabled: bool) -> Self {
        self.record_status = Some(enabled);
        self
    }

    /// Sets the argument names used for recorded arguments.
    #[must_use]
    pub fn argument_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builds metadata for the plain metrics annotation.
    #[must_use]
    pub fn build(self, method_name: &str) -> MetricsMetadata {
        MetricsMetadata {
            counter_name: self
                .counter_name
                .unwrap_or_else(|| DEFAULT_COUNTER.to_string()),
            histogram_name: self
                .histogram_name
                .unwrap_or_else(|| DEFAULT_HISTOGRAM.to_string()),
            attributes: self.attributes,
            record_args: self.record_args.unwrap_or(false),
            argument_names: self.argument_names,
            record_status: self.record_status.unwrap_or(true),
            original_method_name: method_name.to_string(),
        }
    }

    /// Builds metadata for a preset.
    ///
    /// Caller-supplied instrument names win over the preset names;
    /// attributes are merged key by key with caller values overriding.
    #[must_use]
    pub fn preset(self, kind: OperationKind, method_name: &str) -> MetricsMetadata {
        let preset = kind.metrics_preset();
        let attributes = merge_attributes(&kind.preset_attributes(), &self.attributes);
        let counter_name = self
            .counter_name
            .clone()
            .unwrap_or_else(|| preset.counter_name.to_string());
        let histogram_name = self
            .histogram_name
            .clone()
            .unwrap_or_else(|| preset.histogram_name.to_string());
        MetricsMetadata {
            counter_name,
            histogram_name,
            attributes,
            ..self.build(method_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_http_preset_defaults() {
        let metadata = TraceOptions::new().preset(OperationKind::Http, "get_user");

        assert_eq!(metadata.kind, SpanKind::Server);
        assert_eq!(metadata.attributes.len(), 1);
        assert_eq!(
            metadata.attributes[OPERATION_TYPE],
            AttrValue::from("http")
        );
        assert_eq!(metadata.original_method_name, "get_user");
        assert!(metadata.name.is_none());
        assert!(!metadata.record_args);
        assert!(!metadata.record_result);
    }

    #[test]
    fn test_preset_kind_overrides_caller_kind() {
        let metadata = TraceOptions::new()
            .kind(SpanKind::Producer)
            .preset(OperationKind::Database, "find");
        assert_eq!(metadata.kind, SpanKind::Client);
    }

    #[test]
    fn test_preset_caller_attribute_wins() {
        let metadata = TraceOptions::new()
            .attribute(OPERATION_TYPE, "cache")
            .attribute("db.system", "postgres")
            .preset(OperationKind::Database, "find");

        assert_eq!(metadata.attributes[OPERATION_TYPE], AttrValue::from("cache"));
        assert_eq!(metadata.attributes["db.system"], AttrValue::from("postgres"));
    }

    #[test]
    fn test_plain_trace_defaults_to_internal() {
        let metadata = TraceOptions::new()
            .record_args(true)
            .argument_names(["id"])
            .build("load");
        assert_eq!(metadata.kind, SpanKind::Internal);
        assert!(metadata.record_args);
        assert_eq!(metadata.argument_names, vec!["id".to_string()]);
        assert!(metadata.attributes.is_empty());
    }

    #[test]
    fn test_span_name() {
        let metadata = TraceOptions::new().build("get_user");
        assert_eq!(metadata.span_name("UserController"), "UserController.get_user");
        assert_eq!(metadata.span_name(""), "get_user");

        let named = TraceOptions::new().name("users.fetch").build("get_user");
        assert_eq!(named.span_name("UserController"), "users.fetch");
    }

    #[test]
    fn test_metrics_plain_defaults() {
        let metadata = MetricsOptions::new().build("charge");
        assert_eq!(metadata.counter_name, DEFAULT_COUNTER);
        assert_eq!(metadata.histogram_name, DEFAULT_HISTOGRAM);
        assert!(metadata.record_status);
        assert!(!metadata.record_args);
    }

    #[test]
    fn test_metrics_preset_names() {
        let metadata = MetricsOptions::new().preset(OperationKind::Database, "find");
        assert_eq!(metadata.counter_name, "db_queries_total");
        assert_eq!(metadata.histogram_name, "db_query_duration_ms");
        assert_eq!(metadata.attributes[OPERATION_TYPE], AttrValue::from("database"));

        let custom = MetricsOptions::new()
            .counter("orders_total")
            .preset(OperationKind::Business, "place");
        assert_eq!(custom.counter_name, "orders_total");
        assert_eq!(custom.histogram_name, "business_operation_duration_ms");
    }

    proptest! {
        #[test]
        fn prop_preset_kind_is_fixed(kind_index in 0usize..5, preset_index in 0usize..4) {
            let kinds = [
                SpanKind::Client,
                SpanKind::Server,
                SpanKind::Producer,
                SpanKind::Consumer,
                SpanKind::Internal,
            ];
            let presets = [
                OperationKind::Http,
                OperationKind::Database,
                OperationKind::External,
                OperationKind::Business,
            ];
            let preset = presets[preset_index];
            let metadata = TraceOptions::new()
                .kind(kinds[kind_index].clone())
                .preset(preset, "m");
            prop_assert_eq!(metadata.kind, preset.span_kind());
        }

        #[test]
        fn prop_caller_attributes_survive_merge(key in "[a-z]{1,8}", value in "[a-z0-9]{0,8}") {
            let metadata = TraceOptions::new()
                .attribute(key.clone(), value.clone())
                .preset(OperationKind::Business, "m");
            prop_assert_eq!(&metadata.attributes[&key], &AttrValue::from(value));
            prop_assert!(metadata.attributes.contains_key(OPERATION_TYPE));
        }
    }
}
