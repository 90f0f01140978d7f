//! OpenTelemetry span lifecycle.
//!
//! [`TracingService`] offers two ways to trace work:
//!
//! - **Manual**: [`TracingService::create_span`] / [`TracingService::start_span`]
//!   return an [`ActiveSpan`] the caller ends.
//! - **Scoped**: [`TracingService::with_span`] / [`TracingService::with_span_sync`]
//!   run a unit of work inside a span and end it exactly once, on success, on
//!   error, and when the future is dropped before completion.
//!
//! The active span is always carried by an OpenTelemetry [`Context`], attached
//! to the future (or guard) that runs the work. Nothing is stored globally.
//!
//! # Example
//!
//! ```rust,ignore
//! use telemetron_telemetry::tracing::{SpanOptions, TracingService};
//!
//! let tracing = TracingService::new(provider);
//! let user = tracing
//!     .with_span("load_user", SpanOptions::new(), |_span| async { repo.load(7).await })
//!     .await?;
//! ```

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::TelemetryResult;
use opentelemetry::trace::noop::NoopTracer;
use opentelemetry::trace::{
    FutureExt as _, SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _,
};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Instrumentation scope name used for spans created by this crate.
pub const TRACER_NAME: &str = "telemetron";

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Whether tracing is enabled.
    pub enabled: bool,

    /// Sampling ratio (0.0 to 1.0).
    pub sample_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 1.0,
        }
    }
}

impl TracingConfig {
    /// Builds the sampler for the configured rate.
    #[must_use]
    pub fn sampler(&self) -> Sampler {
        if self.sample_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sample_rate <= 0.0 || self.sample_rate.is_nan() {
            Sampler::AlwaysOff
        } else {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(self.sample_rate)))
        }
    }
}

/// Handle over a span carried by a [`Context`].
///
/// Clones share the same end flag, so the span is ended at most once no
/// matter which clone ends it. Handles over an ambient span (see
/// [`TracingService::start_span`]) never end it.
#[derive(Debug, Clone)]
pub struct ActiveSpan {
    cx: Context,
    ended: Arc<AtomicBool>,
    owned: bool,
}

impl ActiveSpan {
    fn owned(cx: Context) -> Self {
        Self {
            cx,
            ended: Arc::new(AtomicBool::new(false)),
            owned: true,
        }
    }

    fn borrowed(cx: Context) -> Self {
        Self {
            cx,
            ended: Arc::new(AtomicBool::new(false)),
            owned: false,
        }
    }

    /// Returns the context carrying this span.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Sets one attribute.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Sets several attributes.
    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.cx.span().set_attributes(attributes);
    }

    /// Adds an event.
    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name, attributes);
    }

    /// Records an `exception` event for `error`.
    pub fn record_error(&self, error: &dyn std::error::Error) {
        self.cx.span().record_error(error);
    }

    /// Sets the span status.
    pub fn set_status(&self, status: Status) {
        self.cx.span().set_status(status);
    }

    /// Ends the span. Calls after the first are ignored.
    pub fn end(&self) {
        if self.owned && !self.ended.swap(true, Ordering::AcqRel) {
            self.cx.span().end();
        }
    }

    /// Returns `true` once [`ActiveSpan::end`] has run on an owned span.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Returns `true` if the span records data.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    /// Returns the hex trace id, if the span context is valid.
    #[must_use]
    pub fn trace_id(&self) -> Option<String> {
        let span = self.cx.span();
        let sc = span.span_context();
        sc.is_valid().then(|| sc.trace_id().to_string())
    }

    /// Returns the hex span id, if the span context is valid.
    #[must_use]
    pub fn span_id(&self) -> Option<String> {
        let span = self.cx.span();
        let sc = span.span_context();
        sc.is_valid().then(|| sc.span_id().to_string())
    }
}

/// Ends the span when dropped.
#[derive(Debug)]
pub struct SpanEndGuard(ActiveSpan);

impl SpanEndGuard {
    /// Guards `span`.
    #[must_use]
    pub fn new(span: ActiveSpan) -> Self {
        Self(span)
    }

    /// Returns the guarded span.
    #[must_use]
    pub fn span(&self) -> &ActiveSpan {
        &self.0
    }
}

impl Drop for SpanEndGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Options for a new span.
#[derive(Debug, Clone)]
pub struct SpanOptions {
    kind: SpanKind,
    attributes: Vec<KeyValue>,
    parent: Option<Context>,
    root: bool,
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self {
            kind: SpanKind::Internal,
            attributes: Vec::new(),
            parent: None,
            root: false,
        }
    }
}

impl SpanOptions {
    /// Creates default options: internal kind, parented to the current context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the span kind.
    #[must_use]
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds one attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds several attributes.
    #[must_use]
    pub fn attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Parents the span to `cx` instead of the current context.
    #[must_use]
    pub fn parent(mut self, cx: Context) -> Self {
        self.parent = Some(cx);
        self
    }

    /// Starts a new trace, ignoring any current span.
    #[must_use]
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }
}

/// Span creation and scoped execution.
///
/// Cloning is cheap. A service built with [`TracingService::disabled`] hands
/// out no-op spans.
#[derive(Debug, Clone)]
pub struct TracingService {
    provider: Option<TracerProvider>,
    tracer: Option<Tracer>,
    scope_attributes: Vec<KeyValue>,
}

impl TracingService {
    /// Creates an enabled service over `provider`.
    #[must_use]
    pub fn new(provider: TracerProvider) -> Self {
        let tracer = provider.tracer(TRACER_NAME);
        Self {
            provider: Some(provider),
            tracer: Some(tracer),
            scope_attributes: Vec::new(),
        }
    }

    /// Creates a disabled service.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            provider: None,
            tracer: None,
            scope_attributes: Vec::new(),
        }
    }

    /// Returns `true` when spans are recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    /// Returns a feature-scoped service.
    ///
    /// Spans come from a tracer named after the feature and carry
    /// `feature.name` plus `attributes`.
    #[must_use]
    pub fn with_scope(&self, name: &str, attributes: Vec<KeyValue>) -> Self {
        let tracer = self
            .provider
            .as_ref()
            .map(|provider| provider.tracer(name.to_string()));
        let mut scope_attributes = self.scope_attributes.clone();
        scope_attributes.push(KeyValue::new("feature.name", name.to_string()));
        scope_attributes.extend(attributes);
        Self {
            provider: self.provider.clone(),
            tracer,
            scope_attributes,
        }
    }

    /// Creates a new span. The caller ends it.
    ///
    /// Parent: `options.parent`, else the current context, unless
    /// `options.root` is set. Disabled services return a no-op span.
    pub fn create_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: SpanOptions,
    ) -> ActiveSpan {
        let parent = if options.root {
            Context::new()
        } else {
            options.parent.unwrap_or_else(Context::current)
        };

        match &self.tracer {
            Some(tracer) => {
                let mut attributes = self.scope_attributes.clone();
                attributes.extend(options.attributes);
                let span = tracer
                    .span_builder(name)
                    .with_kind(options.kind)
                    .with_attributes(attributes)
                    .start_with_context(tracer, &parent);
                ActiveSpan::owned(parent.with_span(span))
            }
            None => {
                let span = NoopTracer::new().start_with_context(name, &parent);
                ActiveSpan::owned(parent.with_span(span))
            }
        }
    }

    /// Starts a span. The caller ends it.
    ///
    /// Same as [`TracingService::create_span`], except that a disabled
    /// service returns the ambient active span when there is one.
    pub fn start_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: SpanOptions,
    ) -> ActiveSpan {
        if !self.is_enabled() {
            if let Some(active) = Self::active_span() {
                return active;
            }
        }
        self.create_span(name, options)
    }

    /// Runs `f` inside a new span.
    ///
    /// The span is the active context while the future runs. On `Ok` its
    /// status is set to `Ok`; on `Err` the error is recorded and the status set
    /// to `Error(message)`. The result is returned unchanged. The span ends
    /// exactly once, also when the returned future is dropped early.
    pub async fn with_span<F, Fut, T, E>(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: SpanOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ActiveSpan) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        let span = self.create_span(name, options);
        let guard = SpanEndGuard::new(span.clone());
        let result = f(span.clone()).with_context(span.context().clone()).await;
        finish(&span, &result);
        drop(guard);
        result
    }

    /// Runs `f` inside a new span, synchronously.
    ///
    /// Same contract as [`TracingService::with_span`]; the span also ends if
    /// `f` panics.
    pub fn with_span_sync<F, T, E>(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: SpanOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&ActiveSpan) -> Result<T, E>,
        E: std::error::Error,
    {
        let span = self.create_span(name, options);
        let _end = SpanEndGuard::new(span.clone());
        let _attached = span.context().clone().attach();
        let result = f(&span);
        finish(&span, &result);
        result
    }

    /// Returns the span active in the current context.
    #[must_use]
    pub fn active_span() -> Option<ActiveSpan> {
        let cx = Context::current();
        cx.has_active_span().then(|| ActiveSpan::borrowed(cx))
    }

    /// Returns the hex trace id of the active span.
    #[must_use]
    pub fn current_trace_id() -> Option<String> {
        Self::active_span().and_then(|span| span.trace_id())
    }

    /// Adds an event to the active span, if any.
    pub fn add_event(name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if let Some(span) = Self::active_span() {
            span.add_event(name, attributes);
        }
    }

    /// Sets attributes on the active span, if any.
    pub fn set_attributes(attributes: impl IntoIterator<Item = KeyValue>) {
        if let Some(span) = Self::active_span() {
            span.set_attributes(attributes);
        }
    }
}

fn finish<T, E: std::error::Error>(span: &ActiveSpan, result: &Result<T, E>) {
    match result {
        Ok(_) => span.set_status(Status::Ok),
        Err(err) => {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }
    }
}

/// Initializes the tracer provider.
///
/// Exports spans over OTLP/gRPC to `trace_endpoint` through a batch processor
/// on the Tokio runtime, installs the provider and the W3C trace-context
/// propagator globally. Returns `None` when tracing is disabled.
///
/// # Errors
///
/// Returns `TelemetryError::TracingInit` if the exporter cannot be built.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<Option<TracerProvider>> {
    if !config.tracing.enabled {
        return Ok(None);
    }

    let resource = Resource::new([
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            config.service_version.clone(),
        ),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.trace_endpoint)
        .build()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_sampler(config.tracing.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    tracing::info!(
        endpoint = %config.trace_endpoint,
        sample_rate = config.tracing.sample_rate,
        "tracing initialized"
    );

    Ok(Some(provider))
}

/// Extracts trace context from carrier headers.
pub fn extract_context<T: opentelemetry::propagation::Extractor>(headers: &T) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(headers))
}

/// Extracts trace context from an `http::HeaderMap`.
#[must_use]
pub fn extract_from_headers(headers: &http::HeaderMap) -> Context {
    extract_context(&HeaderExtractor(headers))
}

/// Injects trace context into carrier headers.
pub fn inject_context<T: opentelemetry::propagation::Injector>(cx: &Context, headers: &mut T) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, headers);
    });
}

/// HTTP header extractor for `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl opentelemetry::propagation::Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}

/// HTTP header injector for `http::HeaderMap`.
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl opentelemetry::propagation::Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            http::header::HeaderName::try_from(key),
            http::header::HeaderValue::try_from(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    fn service() -> (TracingService, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (TracingService::new(provider), exporter)
    }

    fn finished(exporter: &InMemorySpanExporter) -> Vec<SpanData> {
        exporter.get_finished_spans().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sample_rate, 1.0);
        assert!(matches!(config.sampler(), Sampler::AlwaysOn));
    }

    #[test]
    fn test_sampler_selection() {
        let off = TracingConfig { enabled: true, sample_rate: 0.0 };
        assert!(matches!(off.sampler(), Sampler::AlwaysOff));
        let ratio = TracingConfig { enabled: true, sample_rate: 0.5 };
        assert!(matches!(ratio.sampler(), Sampler::ParentBased(_)));
    }

    #[tokio::test]
    async fn test_with_span_success() {
        let (tracing, exporter) = service();
        let result = tracing
            .with_span("op", SpanOptions::new(), |_| async { Ok::<_, Boom>("done") })
            .await;

        assert_eq!(result.unwrap(), "done");
        let spans = finished(&exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "op");
        assert_eq!(spans[0].status, Status::Ok);
    }

    #[tokio::test]
    async fn test_with_span_error() {
        let (tracing, exporter) = service();
        let result = tracing
            .with_span("op", SpanOptions::new(), |_| async { Err::<(), _>(Boom) })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
        let spans = finished(&exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::error("boom"));
        assert!(spans[0].events.iter().any(|e| e.name == "exception"));
    }

    #[tokio::test]
    async fn test_with_span_is_active_inside() {
        let (tracing, exporter) = service();
        let inner_trace = tracing
            .with_span("outer", SpanOptions::new(), |span| async move {
                let child = TracingService::active_span().unwrap();
                assert_eq!(child.span_id(), span.span_id());
                Ok::<_, Boom>(TracingService::current_trace_id())
            })
            .await
            .unwrap();

        assert!(inner_trace.is_some());
        assert!(TracingService::active_span().is_none());
        assert_eq!(finished(&exporter).len(), 1);
    }

    #[tokio::test]
    async fn test_with_span_dropped_future_ends_span() {
        let (tracing, exporter) = service();
        let fut = tracing.with_span("cancelled", SpanOptions::new(), |_| async {
            std::future::pending::<Result<(), Boom>>().await
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), fut).await;

        assert!(timed_out.is_err());
        let spans = finished(&exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "cancelled");
    }

    #[test]
    fn test_with_span_sync() {
        let (tracing, exporter) = service();
        let ok = tracing.with_span_sync("sync", SpanOptions::new(), |span| {
            span.set_attribute(KeyValue::new("rows", 3_i64));
            Ok::<_, Boom>(3)
        });
        assert_eq!(ok.unwrap(), 3);

        let err = tracing.with_span_sync("sync", SpanOptions::new(), |_| Err::<(), _>(Boom));
        assert!(err.is_err());

        let spans = finished(&exporter);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].status, Status::Ok);
        assert!(spans[0].attributes.contains(&KeyValue::new("rows", 3_i64)));
        assert_eq!(spans[1].status, Status::error("boom"));
    }

    #[test]
    fn test_end_is_idempotent() {
        let (tracing, exporter) = service();
        let span = tracing.create_span("manual", SpanOptions::new().kind(SpanKind::Client));
        let clone = span.clone();
        span.end();
        clone.end();
        assert!(span.is_ended());

        let spans = finished(&exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_kind, SpanKind::Client);
    }

    #[test]
    fn test_parent_and_root() {
        let (tracing, exporter) = service();
        let parent = tracing.create_span("parent", SpanOptions::new());
        let child = tracing.create_span(
            "child",
            SpanOptions::new().parent(parent.context().clone()),
        );
        let root = {
            let _attached = parent.context().clone().attach();
            tracing.create_span("root", SpanOptions::new().root())
        };
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(root.trace_id(), parent.trace_id());
        child.end();
        root.end();
        parent.end();
        assert_eq!(finished(&exporter).len(), 3);
    }

    #[test]
    fn test_disabled_start_span_returns_ambient() {
        let (enabled, exporter) = service();
        let disabled = TracingService::disabled();

        let outer = enabled.create_span("outer", SpanOptions::new());
        {
            let _attached = outer.context().clone().attach();
            let ambient = disabled.start_span("ignored", SpanOptions::new());
            assert_eq!(ambient.span_id(), outer.span_id());
            ambient.end();
        }
        assert!(finished(&exporter).is_empty());
        outer.end();
        assert_eq!(finished(&exporter).len(), 1);
    }

    #[test]
    fn test_disabled_start_span_without_ambient_is_noop() {
        let disabled = TracingService::disabled();
        let span = disabled.start_span("noop", SpanOptions::new());
        assert!(!span.is_recording());
        assert!(span.trace_id().is_none());
        span.end();
    }

    #[test]
    fn test_scoped_service_attributes() {
        let (tracing, exporter) = service();
        let scoped = tracing.with_scope("payments", vec![KeyValue::new("team", "core")]);
        scoped.create_span("charge", SpanOptions::new()).end();

        let spans = finished(&exporter);
        assert!(spans[0]
            .attributes
            .contains(&KeyValue::new("feature.name", "payments")));
        assert!(spans[0].attributes.contains(&KeyValue::new("team", "core")));
    }

    #[test]
    fn test_header_extractor() {
        let mut headers = http::HeaderMap::new();
        headers.insert("traceparent", "test-value".parse().unwrap());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("test-value"));
        assert!(extractor.get("nonexistent").is_none());
    }

    #[test]
    fn test_header_injector() {
        let mut headers = http::HeaderMap::new();
        HeaderInjector(&mut headers).set("traceparent", "injected-value".to_string());
        assert_eq!(
            headers.get("traceparent").unwrap().to_str().unwrap(),
            "injected-value"
        );
    }

    #[test]
    fn test_trace_context_through_headers() {
        let (tracing, _exporter) = service();
        let span = tracing.create_span("client", SpanOptions::new());
        let propagator = TraceContextPropagator::new();

        let mut headers = http::HeaderMap::new();
        propagator.inject_context(span.context(), &mut HeaderInjector(&mut headers));
        assert!(headers.contains_key("traceparent"));

        let extracted = propagator.extract(&HeaderExtractor(&headers));
        assert_eq!(
            extracted.span().span_context().trace_id().to_string(),
            span.trace_id().unwrap()
        );
        span.end();
    }

    #[test]
    fn test_disabled_tracing() {
        let config = TelemetryConfig::builder().tracing_enabled(false).build();
        assert!(init_tracing(&config).unwrap().is_none());
    }
}
