//! Metrics interceptor.
//!
//! Counts metered handler invocations and records their duration.
//!
//! # Metrics Emitted
//!
//! Instrument names come from the handler's metrics metadata:
//!
//! - `<counter_name>` - Counter, +1 per invocation
//! - `<histogram_name>` - Histogram of invocation duration in milliseconds
//!
//! # Attributes
//!
//! - Static attributes from the metadata
//! - `class` / `handler` - Owning type and method name. The label is not
//!   `method` so the HTTP preset never collides with the verb label written by
//!   `MetricsService::record_http_request` on `http_requests_total`.
//! - `arg.<name>` - Serialized arguments, when `record_args` is set
//! - `status` - `success`, `error` or `cancelled`, when `record_status` is set
//! - `error.type` - Error type name on failure, when `record_status` is set

use crate::context::{render_value, InvocationContext};
use crate::interceptor::{BoxFuture, Interceptor, Next};
use std::sync::Arc;
use std::time::Instant;
use telemetron_core::{AttrValue, Attributes, HandlerDescriptor, HandlerResult, MetricsMetadata};
use telemetron_telemetry::metrics::{Counter, Histogram, MetricsService};
use telemetron_telemetry::TelemetryResult;
use tracing::warn;

/// `status` attribute value for completed invocations.
pub const STATUS_SUCCESS: &str = "success";
/// `status` attribute value for failed invocations.
pub const STATUS_ERROR: &str = "error";
/// `status` attribute value for invocations dropped before completion.
pub const STATUS_CANCELLED: &str = "cancelled";

/// Interceptor that records a counter and a duration histogram per
/// metered invocation.
///
/// Handlers without metrics metadata, and every handler while metrics are
/// disabled, pass straight through. If the instruments cannot be created the
/// failure is logged and the invocation runs unrecorded.
#[derive(Debug, Clone)]
pub struct MetricsInterceptor {
    metrics: MetricsService,
}

impl MetricsInterceptor {
    /// Creates a metrics interceptor over `metrics`.
    #[must_use]
    pub fn new(metrics: MetricsService) -> Self {
        Self { metrics }
    }

    /// Returns the underlying metrics service.
    #[must_use]
    pub fn metrics_service(&self) -> &MetricsService {
        &self.metrics
    }

    fn instruments(&self, metadata: &MetricsMetadata) -> TelemetryResult<Instruments> {
        let counter = self.metrics.create_or_get_counter(
            &metadata.counter_name,
            Some("Number of handler invocations"),
            None,
        )?;
        let histogram = self.metrics.create_or_get_histogram(
            &metadata.histogram_name,
            Some("Duration of handler invocations"),
            Some("milliseconds"),
        )?;
        Ok(Instruments { counter, histogram })
    }

    fn attributes(
        descriptor: &HandlerDescriptor,
        metadata: &MetricsMetadata,
        ctx: &InvocationContext,
    ) -> Attributes {
        let mut attributes = metadata.attributes.clone();
        attributes.insert("class".into(), descriptor.class_name().into());
        attributes.insert("handler".into(), descriptor.method_name().into());
        if metadata.record_args {
            for (name, value) in ctx.named_arguments(&metadata.argument_names) {
                attributes.insert(format!("arg.{name}"), AttrValue::String(render_value(value)));
            }
        }
        attributes
    }
}

impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let descriptor = Arc::clone(ctx.descriptor());
            let Some(metadata) = descriptor.metrics() else {
                return next.run(ctx).await;
            };
            if !self.metrics.is_enabled() {
                return next.run(ctx).await;
            }

            let instruments = match self.instruments(metadata) {
                Ok(instruments) => instruments,
                Err(e) if e.is_metrics_disabled() => return next.run(ctx).await,
                Err(e) => {
                    warn!(
                        class = descriptor.class_name(),
                        method = descriptor.method_name(),
                        error = %e,
                        "metric instruments unavailable, invocation not recorded"
                    );
                    return next.run(ctx).await;
                }
            };

            let mut recording = Recording {
                instruments,
                attributes: self
                    .metrics
                    .with_defaults(&Self::attributes(&descriptor, metadata, ctx)),
                record_status: metadata.record_status,
                started: Instant::now(),
                finished: false,
            };

            let result = next.run(ctx).await;
            match &result {
                Ok(_) => recording.finish(Outcome::Success),
                Err(error) => recording.finish(Outcome::Error(error.name())),
            }
            result
        })
    }
}

struct Instruments {
    counter: Arc<Counter>,
    histogram: Arc<Histogram>,
}

enum Outcome {
    Success,
    Error(&'static str),
    Cancelled,
}

/// One in-flight measurement, recorded exactly once.
struct Recording {
    instruments: Instruments,
    attributes: Attributes,
    record_status: bool,
    started: Instant,
    finished: bool,
}

impl Recording {
    fn finish(&mut self, outcome: Outcome) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut attributes = std::mem::take(&mut self.attributes);
        if self.record_status {
            let status = match outcome {
                Outcome::Success => STATUS_SUCCESS,
                Outcome::Error(error_type) => {
                    attributes.insert("error.type".into(), error_type.into());
                    STATUS_ERROR
                }
                Outcome::Cancelled => STATUS_CANCELLED,
            };
            attributes.insert("status".into(), status.into());
        }
        self.instruments.counter.add(1, &attributes);
        self.instruments.histogram.record(duration_ms, &attributes);
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        self.finish(Outcome::Cancelled);
    }
}
