//! Module registration tests.
//!
//! A root module is assembled over in-memory exporters, a feature scope is
//! derived from it, and an attribute-instrumented handler runs through the
//! scoped chain.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use metrics_util::MetricKind;
use opentelemetry::KeyValue;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use serde_json::json;
use telemetron::prelude::*;
use telemetron::telemetry::metrics::Meter;

struct PaymentController;

impl PaymentController {
    #[trace_http(record_args)]
    #[metrics_http]
    async fn refund(&self, payment_id: String) -> Result<(), HandlerError> {
        let _ = payment_id;
        Ok(())
    }
}

fn refund_descriptor() -> Arc<HandlerDescriptor> {
    Arc::new(
        HandlerDescriptor::new("PaymentController", "refund")
            .with_trace(PaymentController::__telemetron_trace_refund())
            .with_metrics(PaymentController::__telemetron_metrics_refund()),
    )
}

fn module() -> (TelemetryModule, InMemorySpanExporter, Snapshotter) {
    let spans = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(spans.clone())
        .build();
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let config = TelemetryConfig::builder().service_name("payments-api").build();
    let sdk = TelemetrySdk::from_services(
        config,
        TracingService::new(provider),
        MetricsService::new(Some(Meter::new(recorder))),
        LoggingService::new("payments-api"),
    );
    (TelemetryModule::from_sdk(sdk), spans, snapshotter)
}

fn counter_labels(snapshotter: &Snapshotter, name: &str) -> Option<(u64, Vec<(String, String)>)> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .and_then(|(key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((
                count,
                key.key()
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect(),
            )),
            _ => None,
        })
}

#[tokio::test]
async fn test_root_chain_records_span_and_metric() {
    let (module, spans, snapshotter) = module();
    let chain = module.interceptor_chain();
    PaymentController.refund("pay_0".into()).await.unwrap();

    let mut ctx = InvocationContext::new(refund_descriptor()).with_arguments(vec![json!("pay_1")]);
    chain
        .invoke(&mut ctx, |_| Box::pin(async { Ok(json!(null)) }))
        .await
        .unwrap();

    let spans = spans.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "PaymentController.refund");
    assert!(spans[0]
        .attributes
        .contains(&KeyValue::new("arg.payment_id", "pay_1")));

    let (count, _) = counter_labels(&snapshotter, "http_requests_total").unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_feature_chain_is_scoped() {
    let (module, spans, snapshotter) = module();
    let feature = module.for_feature(FeatureOptions::new("refunds").attribute("team", "billing"));
    let chain = feature.interceptor_chain();

    let mut ctx = InvocationContext::new(refund_descriptor()).with_arguments(vec![json!("pay_2")]);
    chain
        .invoke(&mut ctx, |_| Box::pin(async { Ok(json!(null)) }))
        .await
        .unwrap();

    let spans = spans.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert!(spans[0]
        .attributes
        .contains(&KeyValue::new("feature.name", "refunds")));
    assert!(spans[0].attributes.contains(&KeyValue::new("team", "billing")));

    assert!(counter_labels(&snapshotter, "http_requests_total").is_none());
    let (count, labels) = counter_labels(&snapshotter, "refunds_http_requests_total").unwrap();
    assert_eq!(count, 1);
    assert!(labels.contains(&("team".to_string(), "billing".to_string())));
    assert!(labels.contains(&("handler".to_string(), "refund".to_string())));
}

#[tokio::test]
async fn test_dashed_feature_name_is_recorded() {
    let (module, _spans, snapshotter) = module();
    let feature = module.for_feature(FeatureOptions::new("user-service"));
    let chain = feature.interceptor_chain();

    let mut ctx = InvocationContext::new(refund_descriptor()).with_arguments(vec![json!("pay_4")]);
    chain
        .invoke(&mut ctx, |_| Box::pin(async { Ok(json!(null)) }))
        .await
        .unwrap();

    let (count, _) = counter_labels(&snapshotter, "user_service_http_requests_total").unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_feature_shares_root_sdk() {
    let (module, _spans, _snapshotter) = module();
    let feature = module.for_feature(FeatureOptions::new("refunds"));

    assert!(feature.tracing_service().is_enabled());
    assert!(feature.metrics_service().is_enabled());

    module.shutdown();
    assert!(module.sdk().is_shut_down());
}

#[tokio::test]
async fn test_container_resolution_drives_handlers() {
    let (module, spans, _snapshotter) = module();
    let mut container = Container::new();
    module.register(&mut container);

    let chain: Arc<InterceptorChain> = container.resolve_required().unwrap();
    let mut ctx = InvocationContext::new(refund_descriptor()).with_arguments(vec![json!("pay_3")]);
    let err = chain
        .invoke(&mut ctx, |_| {
            Box::pin(async { Err(HandlerError::msg("gateway timeout")) })
        })
        .await
        .unwrap_err();

    assert_eq!(err.message(), "gateway timeout");
    assert_eq!(spans.get_finished_spans().unwrap().len(), 1);
}
