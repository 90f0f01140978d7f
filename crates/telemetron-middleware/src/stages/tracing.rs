//! Tracing interceptor.
//!
//! Wraps every traced handler invocation in an OpenTelemetry span. Handlers
//! whose descriptor carries no trace metadata pass straight through.
//!
//! ## Span Attributes
//!
//! - Static attributes from the handler's trace metadata
//! - `code.namespace` / `code.function` - Owning type and method
//! - `arg.<name>` - Serialized arguments, when `record_args` is set
//! - `http.method`, `http.url`, `http.target`, `http.route`, `http.user_agent` -
//!   Request attributes for server-kind spans invoked over HTTP
//! - `duration_ms` - Wall time of the downstream chain (on completion)
//! - `result` - Serialized return value, when `record_result` is set
//! - `http.status_code` - Response status for server-kind spans
//! - `error.name`, `error.message`, `error.stack` - On failure
//!
//! ## Trace Context Propagation
//!
//! Server-kind spans continue the trace named by an incoming
//! [W3C Trace Context](https://www.w3.org/TR/trace-context/) `traceparent`
//! header, using the globally installed propagator.

use crate::context::{render_value, HttpRequestInfo, InvocationContext};
use crate::interceptor::{BoxFuture, Interceptor, Next};
use http::StatusCode;
use opentelemetry::trace::{FutureExt as _, SpanKind, Status};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Instant;
use telemetron_core::{AttrValue, HandlerDescriptor, HandlerError, HandlerResult, TraceMetadata};
use telemetron_telemetry::tracing::{
    extract_from_headers, ActiveSpan, SpanEndGuard, SpanOptions, TracingService,
};

/// The W3C Trace Context header for trace propagation.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Interceptor that records a span per traced invocation.
///
/// # Behavior
///
/// 1. Skip handlers without trace metadata
/// 2. Start a span named after the metadata (or `Class.method`)
/// 3. Run the rest of the chain with the span as the active context
/// 4. Record duration, outcome and status, then end the span
///
/// The span ends exactly once: on completion, or when the invocation future
/// is dropped before it completes.
#[derive(Debug, Clone)]
pub struct TracingInterceptor {
    tracing: TracingService,
}

impl TracingInterceptor {
    /// Creates a tracing interceptor over `tracing`.
    #[must_use]
    pub fn new(tracing: TracingService) -> Self {
        Self { tracing }
    }

    /// Returns the underlying tracing service.
    #[must_use]
    pub fn tracing_service(&self) -> &TracingService {
        &self.tracing
    }

    fn span_options(
        descriptor: &HandlerDescriptor,
        metadata: &TraceMetadata,
        ctx: &InvocationContext,
    ) -> SpanOptions {
        let mut attributes: Vec<KeyValue> = metadata
            .attributes
            .iter()
            .map(|(key, value)| AttrValue::key_value(key, value))
            .collect();
        attributes.push(KeyValue::new(
            "code.namespace",
            descriptor.class_name().to_string(),
        ));
        attributes.push(KeyValue::new(
            "code.function",
            descriptor.method_name().to_string(),
        ));

        if metadata.record_args {
            attributes.extend(
                ctx.named_arguments(&metadata.argument_names)
                    .map(|(name, value)| KeyValue::new(format!("arg.{name}"), render_value(value))),
            );
        }

        let mut options = SpanOptions::new().kind(metadata.kind.clone());
        if metadata.kind == SpanKind::Server {
            if let Some(http) = ctx.http() {
                attributes.extend(http_attributes(http));
                if http.headers.contains_key(TRACEPARENT_HEADER) {
                    options = options.parent(extract_from_headers(&http.headers));
                }
            }
        }
        options.attributes(attributes)
    }
}

impl Interceptor for TracingInterceptor {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let descriptor = Arc::clone(ctx.descriptor());
            let Some(metadata) = descriptor.trace() else {
                return next.run(ctx).await;
            };

            let started = Instant::now();
            let server = metadata.kind == SpanKind::Server;
            let options = Self::span_options(&descriptor, metadata, ctx);
            let span = self
                .tracing
                .create_span(metadata.span_name(descriptor.class_name()), options);
            let guard = SpanEndGuard::new(span.clone());

            let result = next.run(ctx).with_context(span.context().clone()).await;

            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            span.set_attribute(KeyValue::new("duration_ms", duration_ms));
            match &result {
                Ok(value) => {
                    if metadata.record_result {
                        span.set_attribute(KeyValue::new("result", render_value(value)));
                    }
                    if server {
                        let status = ctx.response_status().unwrap_or(StatusCode::OK);
                        span.set_attribute(status_code(status));
                    }
                    span.set_status(Status::Ok);
                }
                Err(error) => {
                    record_failure(&span, error);
                    if server {
                        let status = error
                            .status()
                            .or_else(|| ctx.response_status())
                            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                        span.set_attribute(status_code(status));
                    }
                }
            }

            drop(guard);
            result
        })
    }
}

fn http_attributes(http: &HttpRequestInfo) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new("http.method", http.method.as_str().to_string()),
        KeyValue::new("http.url", http.uri.to_string()),
        KeyValue::new("http.target", http.target().to_string()),
    ];
    if let Some(route) = &http.route {
        attributes.push(KeyValue::new("http.route", route.clone()));
    }
    if let Some(user_agent) = http.user_agent() {
        attributes.push(KeyValue::new("http.user_agent", user_agent.to_string()));
    }
    attributes
}

fn status_code(status: StatusCode) -> KeyValue {
    KeyValue::new("http.status_code", i64::from(status.as_u16()))
}

fn record_failure(span: &ActiveSpan, error: &HandlerError) {
    span.set_attributes([
        KeyValue::new("error.name", error.name()),
        KeyValue::new("error.message", error.message()),
        KeyValue::new("error.stack", error.stack()),
    ]);
    span.record_error(error);
    span.set_status(Status::error(error.message()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};
    use opentelemetry::trace::TraceContextExt;
    use opentelemetry::Value;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use opentelemetry_sdk::trace::TracerProvider;
    use serde_json::json;
    use telemetron_core::{OperationKind, TraceOptions};

    fn interceptor() -> (TracingInterceptor, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (
            TracingInterceptor::new(TracingService::new(provider)),
            exporter,
        )
    }

    fn attribute<'s>(span: &'s SpanData, key: &str) -> Option<&'s Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    async fn run(
        interceptor: &TracingInterceptor,
        ctx: &mut InvocationContext,
        result: HandlerResult,
    ) -> HandlerResult {
        let next = Next::new(interceptor, Next::handler(move |_| Box::pin(async move { result })));
        next.run(ctx).await
    }

    #[tokio::test]
    async fn test_untraced_handler_passes_through() {
        let (interceptor, exporter) = interceptor();
        let mut ctx = InvocationContext::new(Arc::new(HandlerDescriptor::new("Svc", "plain")));

        let result = run(&interceptor, &mut ctx, Ok(json!(1))).await;
        assert_eq!(result.unwrap(), json!(1));
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_span_name_and_code_attributes() {
        let (interceptor, exporter) = interceptor();
        let descriptor = HandlerDescriptor::new("Orders", "list")
            .with_trace(TraceOptions::new().attribute("team", "checkout").build("list"));
        let mut ctx = InvocationContext::new(Arc::new(descriptor));

        run(&interceptor, &mut ctx, Ok(json!([]))).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "Orders.list");
        assert_eq!(span.span_kind, SpanKind::Internal);
        assert_eq!(span.status, Status::Ok);
        assert_eq!(attribute(span, "team"), Some(&Value::from("checkout")));
        assert_eq!(attribute(span, "code.function"), Some(&Value::from("list")));
        assert_eq!(attribute(span, "code.namespace"), Some(&Value::from("Orders")));
        assert!(attribute(span, "duration_ms").is_some());
        assert!(attribute(span, "http.status_code").is_none());
        assert!(attribute(span, "result").is_none());
    }

    #[tokio::test]
    async fn test_records_arguments_and_result() {
        let (interceptor, exporter) = interceptor();
        let metadata = TraceOptions::new()
            .name("lookup")
            .record_args(true)
            .record_result(true)
            .argument_names(["id", "filter", "verbose"])
            .build("find");
        let mut ctx = InvocationContext::new(Arc::new(
            HandlerDescriptor::new("Repo", "find").with_trace(metadata),
        ))
        .with_arguments(vec![json!("u-1"), json!({"active": true}), json!(false)]);

        run(&interceptor, &mut ctx, Ok(json!({"id": "u-1"}))).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(span.name, "lookup");
        assert_eq!(attribute(span, "arg.id"), Some(&Value::from("u-1")));
        assert_eq!(
            attribute(span, "arg.filter"),
            Some(&Value::from(r#"{"active":true}"#))
        );
        assert_eq!(attribute(span, "arg.verbose"), Some(&Value::from("false")));
        assert_eq!(attribute(span, "result"), Some(&Value::from(r#"{"id":"u-1"}"#)));
    }

    #[tokio::test]
    async fn test_server_span_http_attributes() {
        let (interceptor, exporter) = interceptor();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "probe/1.0".parse().unwrap());
        let http = HttpRequestInfo::new(Method::GET, "/users/7?x=1".parse().unwrap())
            .with_headers(headers)
            .with_route("/users/{id}");
        let descriptor = HandlerDescriptor::new("UserController", "get_user")
            .with_trace(TraceOptions::new().preset(OperationKind::Http, "get_user"));
        let mut ctx = InvocationContext::new(Arc::new(descriptor)).with_http(http);
        ctx.set_response_status(StatusCode::CREATED);

        run(&interceptor, &mut ctx, Ok(json!(null))).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(attribute(span, "operation.type"), Some(&Value::from("http")));
        assert_eq!(attribute(span, "http.method"), Some(&Value::from("GET")));
        assert_eq!(attribute(span, "http.target"), Some(&Value::from("/users/7?x=1")));
        assert_eq!(attribute(span, "http.route"), Some(&Value::from("/users/{id}")));
        assert_eq!(attribute(span, "http.user_agent"), Some(&Value::from("probe/1.0")));
        assert_eq!(attribute(span, "http.status_code"), Some(&Value::I64(201)));
    }

    #[tokio::test]
    async fn test_failure_records_error_and_returns_same_value() {
        let (interceptor, exporter) = interceptor();
        let descriptor = HandlerDescriptor::new("UserController", "get_user")
            .with_trace(TraceOptions::new().preset(OperationKind::Http, "get_user"));
        let mut ctx = InvocationContext::new(Arc::new(descriptor));
        let error = HandlerError::msg("user not found").with_status(StatusCode::NOT_FOUND);

        let returned = run(&interceptor, &mut ctx, Err(error.clone()))
            .await
            .unwrap_err();
        assert!(returned.ptr_eq(&error));

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(span.status, Status::error("user not found"));
        assert_eq!(attribute(span, "error.name"), Some(&Value::from("Error")));
        assert_eq!(
            attribute(span, "error.message"),
            Some(&Value::from("user not found"))
        );
        assert!(attribute(span, "error.stack").is_some());
        assert_eq!(attribute(span, "http.status_code"), Some(&Value::I64(404)));
        assert!(span.events.iter().any(|e| e.name == "exception"));
    }

    #[tokio::test]
    async fn test_failure_without_status_defaults_to_500() {
        let (interceptor, exporter) = interceptor();
        let descriptor = HandlerDescriptor::new("Api", "post")
            .with_trace(TraceOptions::new().kind(SpanKind::Server).build("post"));
        let mut ctx = InvocationContext::new(Arc::new(descriptor));

        run(&interceptor, &mut ctx, Err(HandlerError::msg("boom")))
            .await
            .unwrap_err();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(attribute(&spans[0], "http.status_code"), Some(&Value::I64(500)));
    }

    #[tokio::test]
    async fn test_span_is_active_downstream() {
        let (interceptor, exporter) = interceptor();
        let descriptor = HandlerDescriptor::new("Svc", "op")
            .with_trace(TraceOptions::new().build("op"));
        let mut ctx = InvocationContext::new(Arc::new(descriptor));

        let next = Next::new(
            &interceptor,
            Next::handler(|_| {
                let trace_id = TracingService::current_trace_id();
                Box::pin(async move { Ok(json!(trace_id)) })
            }),
        );
        let seen = next.run(&mut ctx).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(
            seen,
            json!(spans[0].span_context.trace_id().to_string())
        );
        assert!(!opentelemetry::Context::current().has_active_span());
    }

    #[tokio::test]
    async fn test_span_ends_when_invocation_is_dropped() {
        let (interceptor, exporter) = interceptor();
        let descriptor = HandlerDescriptor::new("Svc", "slow")
            .with_trace(TraceOptions::new().build("slow"));
        let mut ctx = InvocationContext::new(Arc::new(descriptor));

        {
            let next = Next::new(
                &interceptor,
                Next::handler(|_| Box::pin(std::future::pending::<HandlerResult>())),
            );
            let invocation = next.run(&mut ctx);
            let timed_out =
                tokio::time::timeout(std::time::Duration::from_millis(10), invocation).await;
            assert!(timed_out.is_err());
        }

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "Svc.slow");
    }
}
