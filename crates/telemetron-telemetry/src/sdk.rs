//! Telemetry bootstrap.
//!
//! [`TelemetrySdk::start`] brings up tracing, logging and metrics from one
//! [`TelemetryConfig`] and hands out the adapter services. The SDK shuts
//! everything down on [`TelemetrySdk::shutdown`] or when dropped.

use crate::config::TelemetryConfig;
use crate::logging::{init_logging, LogGuards, LoggingService};
use crate::metrics::{init_metrics, MetricsRuntime, MetricsService};
use crate::tracing::{init_tracing, TracingService, TRACER_NAME};
use crate::TelemetryResult;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Runtime {
    tracer_provider: Option<TracerProvider>,
    metrics: Option<MetricsRuntime>,
    log_guards: Option<LogGuards>,
}

/// Running telemetry SDK.
#[derive(Debug)]
pub struct TelemetrySdk {
    config: Arc<TelemetryConfig>,
    tracing: TracingService,
    metrics: MetricsService,
    logging: LoggingService,
    runtime: Mutex<Runtime>,
    shut_down: AtomicBool,
}

impl TelemetrySdk {
    /// Starts the SDK.
    ///
    /// The configuration is normalized first. Tracing, logging (bridged to
    /// tracing when both are on) and metrics are initialized in that order,
    /// each only if enabled.
    ///
    /// # Errors
    ///
    /// Returns the first subsystem initialization error. A tracer provider
    /// started before the failure is shut down and uninstalled first.
    pub async fn start(config: &TelemetryConfig) -> TelemetryResult<Self> {
        let config = config.clone().normalized();

        let tracer_provider = init_tracing(&config)?;
        let (log_guards, metrics_runtime) =
            match Self::init_sinks(&config, tracer_provider.as_ref()) {
                Ok(sinks) => sinks,
                Err(err) => {
                    if let Some(provider) = &tracer_provider {
                        abandon_tracing(provider);
                    }
                    return Err(err);
                }
            };

        let tracing = tracer_provider
            .clone()
            .map_or_else(TracingService::disabled, TracingService::new);
        let metrics = MetricsService::new(metrics_runtime.as_ref().map(MetricsRuntime::meter));
        let logging =
            LoggingService::new(config.service_name.clone()).with_level(config.logging.level);

        ::tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            environment = %config.environment,
            tracing = tracing.is_enabled(),
            metrics = metrics.is_enabled(),
            "telemetry started"
        );

        Ok(Self {
            config: Arc::new(config),
            tracing,
            metrics,
            logging,
            runtime: Mutex::new(Runtime {
                tracer_provider,
                metrics: metrics_runtime,
                log_guards: Some(log_guards),
            }),
            shut_down: AtomicBool::new(false),
        })
    }

    fn init_sinks(
        config: &TelemetryConfig,
        tracer_provider: Option<&TracerProvider>,
    ) -> TelemetryResult<(LogGuards, Option<MetricsRuntime>)> {
        let bridge_tracer = tracer_provider.map(|provider| provider.tracer(TRACER_NAME));
        let log_guards = init_logging(config, bridge_tracer)?;
        let metrics_runtime = if config.metrics.enabled {
            Some(init_metrics(config)?)
        } else {
            None
        };
        Ok((log_guards, metrics_runtime))
    }

    /// Assembles an SDK from existing services without starting exporters.
    #[must_use]
    pub fn from_services(
        config: TelemetryConfig,
        tracing: TracingService,
        metrics: MetricsService,
        logging: LoggingService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tracing,
            metrics,
            logging,
            runtime: Mutex::new(Runtime::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Creates an SDK with every subsystem disabled.
    #[must_use]
    pub fn disabled(config: TelemetryConfig) -> Self {
        let logging =
            LoggingService::new(config.service_name.clone()).with_level(config.logging.level);
        Self::from_services(
            config,
            TracingService::disabled(),
            MetricsService::disabled(),
            logging,
        )
    }

    /// Returns the effective configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<TelemetryConfig> {
        &self.config
    }

    /// Returns the tracing service.
    #[must_use]
    pub fn tracing_service(&self) -> &TracingService {
        &self.tracing
    }

    /// Returns the metrics service.
    #[must_use]
    pub fn metrics_service(&self) -> &MetricsService {
        &self.metrics
    }

    /// Returns the logging service.
    #[must_use]
    pub fn logging_service(&self) -> &LoggingService {
        &self.logging
    }

    /// Renders metrics in Prometheus text format, if the exporter runs.
    #[must_use]
    pub fn render_metrics(&self) -> Option<String> {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        runtime.metrics.as_ref().map(MetricsRuntime::render)
    }

    /// Returns `true` once [`TelemetrySdk::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Flushes and stops every subsystem. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(provider) = runtime.tracer_provider.take() {
            for result in provider.force_flush() {
                if let Err(e) = result {
                    eprintln!("Error flushing tracer provider: {e}");
                }
            }
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e}");
            }
        }
        if let Some(mut metrics) = runtime.metrics.take() {
            metrics.shutdown();
        }
        runtime.log_guards.take();
    }
}

/// Uninstalls the global tracer provider and stops `provider`.
fn abandon_tracing(provider: &TracerProvider) {
    global::shutdown_tracer_provider();
    if let Err(e) = provider.shutdown() {
        eprintln!("Error shutting down tracer provider: {e}");
    }
}

impl Drop for TelemetrySdk {
    fn drop(&mut self) {
        self.shutdown();
    }
}
