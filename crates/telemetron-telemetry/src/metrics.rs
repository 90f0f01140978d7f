//! Metric instruments over a `metrics` recorder.
//!
//! [`MetricsService`] owns a name → instrument cache. Each metric name maps to
//! exactly one instrument for the service's lifetime; requesting it again
//! returns the same [`Arc`].
//!
//! Explicit creation (`create_or_get_*`) fails with
//! [`TelemetryError::MetricsDisabled`] when no meter is configured. Recording by
//! name and the convenience recorders are silent no-ops in that case, and for
//! names that were never created.
//!
//! # Standard Metrics
//!
//! Registered when the service is constructed with a meter:
//!
//! | Metric | Type | Labels | Unit |
//! |--------|------|--------|------|
//! | `http_requests_total` | Counter | `method`, `route`, `status_code` | - |
//! | `http_request_duration_seconds` | Histogram | `method`, `route`, `status_code` | seconds |
//! | `errors_total` | Counter | `error_type`, `operation` | - |
//! | `business_events_total` | Counter | `event` | - |
//! | `business_event_value` | Histogram | `event` | - |
//! | `db_queries_total` | Counter | `operation`, `table`, `success` | - |
//! | `db_query_duration_ms` | Histogram | `operation`, `table`, `success` | milliseconds |
//!
//! # Example
//!
//! ```rust
//! use telemetron_telemetry::metrics::MetricsService;
//! use telemetron_core::Attributes;
//!
//! // Disabled service: recording is a no-op, explicit creation is an error.
//! let metrics = MetricsService::disabled();
//! metrics.increment_counter("never_created", 1, &Attributes::new());
//! assert!(metrics.create_or_get_counter("jobs_total", None, None).is_err());
//! ```

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::TelemetryResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use telemetron_core::{merge_attributes, Attributes};
use tokio::task::JoinHandle;

/// Counter of HTTP requests.
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
/// Histogram of HTTP request durations in seconds.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
/// Counter of recorded errors.
pub const ERRORS_TOTAL: &str = "errors_total";
/// Counter of business events.
pub const BUSINESS_EVENTS_TOTAL: &str = "business_events_total";
/// Histogram of business event values.
pub const BUSINESS_EVENT_VALUE: &str = "business_event_value";
/// Counter of database queries.
pub const DB_QUERIES_TOTAL: &str = "db_queries_total";
/// Histogram of database query durations in milliseconds.
pub const DB_QUERY_DURATION_MS: &str = "db_query_duration_ms";

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Collection (upkeep) interval in milliseconds.
    pub interval_ms: u64,
}

impl MetricsConfig {
    /// Default collection interval.
    pub const DEFAULT_INTERVAL_MS: u64 = 30_000;
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: Self::DEFAULT_INTERVAL_MS,
        }
    }
}

/// Handle over the recorder instruments are registered with.
#[derive(Clone)]
pub struct Meter {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl Meter {
    /// Wraps a recorder.
    pub fn new<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        Self {
            recorder: Arc::new(recorder),
        }
    }

    fn describe(&self, kind: InstrumentKind, name: &str, unit: Option<Unit>, description: Option<&str>) {
        let key = KeyName::from(name.to_string());
        let description = SharedString::from(description.unwrap_or_default().to_string());
        match kind {
            InstrumentKind::Counter => self.recorder.describe_counter(key, unit, description),
            InstrumentKind::Histogram => self.recorder.describe_histogram(key, unit, description),
            InstrumentKind::Gauge => self.recorder.describe_gauge(key, unit, description),
        }
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").finish_non_exhaustive()
    }
}

/// Instrument kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Monotonic counter.
    Counter,
    /// Distribution of observations.
    Histogram,
    /// Last-value gauge.
    Gauge,
}

impl InstrumentKind {
    /// Returns the lowercase kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Histogram => "histogram",
            Self::Gauge => "gauge",
        }
    }
}

fn key(name: &str, attributes: &Attributes) -> Key {
    let labels: Vec<Label> = attributes
        .iter()
        .map(|(k, v)| Label::new(k.clone(), v.to_string()))
        .collect();
    Key::from_parts(name.to_string(), labels)
}

/// A named counter.
#[derive(Debug)]
pub struct Counter {
    name: String,
    meter: Meter,
}

impl Counter {
    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `value` to the series identified by `attributes`.
    pub fn add(&self, value: u64, attributes: &Attributes) {
        self.meter
            .recorder
            .register_counter(&key(&self.name, attributes), &METADATA)
            .increment(value);
    }
}

/// A named histogram.
#[derive(Debug)]
pub struct Histogram {
    name: String,
    meter: Meter,
}

impl Histogram {
    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records one observation.
    pub fn record(&self, value: f64, attributes: &Attributes) {
        self.meter
            .recorder
            .register_histogram(&key(&self.name, attributes), &METADATA)
            .record(value);
    }
}

/// A named gauge.
#[derive(Debug)]
pub struct Gauge {
    name: String,
    meter: Meter,
}

impl Gauge {
    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the gauge value.
    pub fn set(&self, value: f64, attributes: &Attributes) {
        self.meter
            .recorder
            .register_gauge(&key(&self.name, attributes), &METADATA)
            .set(value);
    }
}

#[derive(Debug, Clone)]
enum Instrument {
    Counter(Arc<Counter>),
    Histogram(Arc<Histogram>),
    Gauge(Arc<Gauge>),
}

impl Instrument {
    const fn kind(&self) -> InstrumentKind {
        match self {
            Self::Counter(_) => InstrumentKind::Counter,
            Self::Histogram(_) => InstrumentKind::Histogram,
            Self::Gauge(_) => InstrumentKind::Gauge,
        }
    }
}

#[derive(Debug)]
struct Shared {
    meter: Option<Meter>,
    instruments: DashMap<String, Instrument>,
}

/// Instrument cache and recorders.
///
/// Cloning and [`MetricsService::with_scope`] share the same cache.
#[derive(Debug, Clone)]
pub struct MetricsService {
    shared: Arc<Shared>,
    prefix: Option<String>,
    defaults: Attributes,
}

impl MetricsService {
    /// Creates a service. `None` disables metrics.
    ///
    /// With a meter, the standard instruments are registered up front.
    #[must_use]
    pub fn new(meter: Option<Meter>) -> Self {
        let service = Self {
            shared: Arc::new(Shared {
                meter,
                instruments: DashMap::new(),
            }),
            prefix: None,
            defaults: Attributes::new(),
        };
        if service.is_enabled() {
            service.register_standard_instruments();
        }
        service
    }

    /// Creates a disabled service.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Returns `true` when a meter is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.meter.is_some()
    }

    /// Returns a scoped view sharing this cache.
    ///
    /// Names passed to the scoped view are prefixed with `prefix_`, and
    /// `attributes` are merged under every recording. Characters not allowed
    /// in metric names are replaced with `_`, so `user-service` scopes to
    /// `user_service_`.
    #[must_use]
    pub fn with_scope(&self, prefix: &str, attributes: Attributes) -> Self {
        let prefix = sanitize_prefix(prefix);
        let prefix = match &self.prefix {
            Some(outer) => format!("{outer}_{prefix}"),
            None => prefix.to_string(),
        };
        Self {
            shared: Arc::clone(&self.shared),
            prefix: Some(prefix),
            defaults: merge_attributes(&self.defaults, &attributes),
        }
    }

    /// Returns the full name a scoped name resolves to.
    #[must_use]
    pub fn scoped_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_string(),
        }
    }

    /// Returns the cached counter or creates it.
    pub fn create_or_get_counter(
        &self,
        name: &str,
        description: Option<&str>,
        unit: Option<&str>,
    ) -> TelemetryResult<Arc<Counter>> {
        let instrument = self.create_or_get(name, InstrumentKind::Counter, description, unit)?;
        match instrument {
            Instrument::Counter(counter) => Ok(counter),
            other => Err(self.mismatch(name, other.kind(), InstrumentKind::Counter)),
        }
    }

    /// Returns the cached histogram or creates it.
    pub fn create_or_get_histogram(
        &self,
        name: &str,
        description: Option<&str>,
        unit: Option<&str>,
    ) -> TelemetryResult<Arc<Histogram>> {
        let instrument = self.create_or_get(name, InstrumentKind::Histogram, description, unit)?;
        match instrument {
            Instrument::Histogram(histogram) => Ok(histogram),
            other => Err(self.mismatch(name, other.kind(), InstrumentKind::Histogram)),
        }
    }

    /// Returns the cached gauge or creates it.
    pub fn create_or_get_gauge(
        &self,
        name: &str,
        description: Option<&str>,
        unit: Option<&str>,
    ) -> TelemetryResult<Arc<Gauge>> {
        let instrument = self.create_or_get(name, InstrumentKind::Gauge, description, unit)?;
        match instrument {
            Instrument::Gauge(gauge) => Ok(gauge),
            other => Err(self.mismatch(name, other.kind(), InstrumentKind::Gauge)),
        }
    }

    /// Increments a counter created earlier. Unknown names are ignored.
    pub fn increment_counter(&self, name: &str, value: u64, attributes: &Attributes) {
        if let Some(Instrument::Counter(counter)) = self.lookup(&self.scoped_name(name)) {
            counter.add(value, &self.with_defaults(attributes));
        }
    }

    /// Records into a histogram created earlier. Unknown names are ignored.
    pub fn record_histogram(&self, name: &str, value: f64, attributes: &Attributes) {
        if let Some(Instrument::Histogram(histogram)) = self.lookup(&self.scoped_name(name)) {
            histogram.record(value, &self.with_defaults(attributes));
        }
    }

    /// Sets a gauge created earlier. Unknown names are ignored.
    pub fn set_gauge(&self, name: &str, value: f64, attributes: &Attributes) {
        if let Some(Instrument::Gauge(gauge)) = self.lookup(&self.scoped_name(name)) {
            gauge.set(value, &self.with_defaults(attributes));
        }
    }

    /// Records a completed HTTP request.
    ///
    /// The duration is given in milliseconds and recorded in seconds.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_ms: f64) {
        let mut attributes = Attributes::new();
        attributes.insert("method".into(), method.into());
        attributes.insert("route".into(), route.into());
        attributes.insert("status_code".into(), u32::from(status).into());
        let attributes = self.with_defaults(&attributes);

        if let Some(Instrument::Counter(c)) = self.lookup(HTTP_REQUESTS_TOTAL) {
            c.add(1, &attributes);
        }
        if let Some(Instrument::Histogram(h)) = self.lookup(HTTP_REQUEST_DURATION_SECONDS) {
            h.record(duration_ms / 1000.0, &attributes);
        }
    }

    /// Records an error occurrence.
    pub fn record_error(&self, error_type: &str, operation: &str) {
        let mut attributes = Attributes::new();
        attributes.insert("error_type".into(), error_type.into());
        attributes.insert("operation".into(), operation.into());

        if let Some(Instrument::Counter(c)) = self.lookup(ERRORS_TOTAL) {
            c.add(1, &self.with_defaults(&attributes));
        }
    }

    /// Records a business event and its value.
    pub fn record_business_event(&self, event: &str, value: f64, attributes: &Attributes) {
        let mut merged = self.with_defaults(attributes);
        merged.insert("event".into(), event.into());

        if let Some(Instrument::Counter(c)) = self.lookup(BUSINESS_EVENTS_TOTAL) {
            c.add(1, &merged);
        }
        if let Some(Instrument::Histogram(h)) = self.lookup(BUSINESS_EVENT_VALUE) {
            h.record(value, &merged);
        }
    }

    /// Records a database query. The duration stays in milliseconds.
    pub fn record_db_query(&self, operation: &str, table: &str, duration_ms: f64, success: bool) {
        let mut attributes = Attributes::new();
        attributes.insert("operation".into(), operation.into());
        attributes.insert("table".into(), table.into());
        attributes.insert("success".into(), success.into());
        let attributes = self.with_defaults(&attributes);

        if let Some(Instrument::Counter(c)) = self.lookup(DB_QUERIES_TOTAL) {
            c.add(1, &attributes);
        }
        if let Some(Instrument::Histogram(h)) = self.lookup(DB_QUERY_DURATION_MS) {
            h.record(duration_ms, &attributes);
        }
    }

    /// Returns the number of cached instruments.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.shared.instruments.len()
    }

    fn create_or_get(
        &self,
        name: &str,
        kind: InstrumentKind,
        description: Option<&str>,
        unit: Option<&str>,
    ) -> TelemetryResult<Instrument> {
        let meter = self
            .shared
            .meter
            .as_ref()
            .ok_or(TelemetryError::MetricsDisabled)?;
        let full_name = self.scoped_name(name);
        validate_name(&full_name)?;

        match self.shared.instruments.entry(full_name.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                meter.describe(kind, &full_name, unit.and_then(Unit::from_string), description);
                let instrument = match kind {
                    InstrumentKind::Counter => Instrument::Counter(Arc::new(Counter {
                        name: full_name,
                        meter: meter.clone(),
                    })),
                    InstrumentKind::Histogram => Instrument::Histogram(Arc::new(Histogram {
                        name: full_name,
                        meter: meter.clone(),
                    })),
                    InstrumentKind::Gauge => Instrument::Gauge(Arc::new(Gauge {
                        name: full_name,
                        meter: meter.clone(),
                    })),
                };
                entry.insert(instrument.clone());
                Ok(instrument)
            }
        }
    }

    fn lookup(&self, full_name: &str) -> Option<Instrument> {
        self.shared
            .instruments
            .get(full_name)
            .map(|entry| entry.value().clone())
    }

    /// Merges the scope's default attributes under `attributes`.
    #[must_use]
    pub fn with_defaults(&self, attributes: &Attributes) -> Attributes {
        if self.defaults.is_empty() {
            attributes.clone()
        } else {
            merge_attributes(&self.defaults, attributes)
        }
    }

    fn mismatch(
        &self,
        name: &str,
        existing: InstrumentKind,
        requested: InstrumentKind,
    ) -> TelemetryError {
        TelemetryError::InstrumentKindMismatch {
            name: self.scoped_name(name),
            existing: existing.as_str(),
            requested: requested.as_str(),
        }
    }

    fn register_standard_instruments(&self) {
        let standard: [(&str, InstrumentKind, &str, Option<&str>); 7] = [
            (HTTP_REQUESTS_TOTAL, InstrumentKind::Counter, "Total number of HTTP requests", None),
            (
                HTTP_REQUEST_DURATION_SECONDS,
                InstrumentKind::Histogram,
                "HTTP request duration in seconds",
                Some("seconds"),
            ),
            (ERRORS_TOTAL, InstrumentKind::Counter, "Total number of errors", None),
            (BUSINESS_EVENTS_TOTAL, InstrumentKind::Counter, "Total number of business events", None),
            (BUSINESS_EVENT_VALUE, InstrumentKind::Histogram, "Business event values", None),
            (DB_QUERIES_TOTAL, InstrumentKind::Counter, "Total number of database queries", None),
            (
                DB_QUERY_DURATION_MS,
                InstrumentKind::Histogram,
                "Database query duration in milliseconds",
                Some("milliseconds"),
            ),
        ];

        for (name, kind, description, unit) in standard {
            if let Err(err) = self.create_or_get(name, kind, Some(description), unit) {
                tracing::warn!(metric = name, error = %err, "failed to register standard metric");
            }
        }
    }
}

/// Checks a name against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn sanitize_prefix(prefix: &str) -> String {
    let mut sanitized: String = prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !sanitized.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == ':') {
        sanitized.insert(0, '_');
    }
    sanitized
}

fn validate_name(name: &str) -> TelemetryResult<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':');
    if valid_first && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':') {
        Ok(())
    } else {
        Err(TelemetryError::InvalidMetricName(name.to_string()))
    }
}

/// Running Prometheus exporter.
#[derive(Debug)]
pub struct MetricsRuntime {
    handle: PrometheusHandle,
    meter: Meter,
    tasks: Vec<JoinHandle<()>>,
}

impl MetricsRuntime {
    /// Returns the meter backed by the Prometheus recorder.
    #[must_use]
    pub fn meter(&self) -> Meter {
        self.meter.clone()
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Stops the exporter listener and the upkeep loop.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MetricsRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Initializes the metrics subsystem.
///
/// Builds a Prometheus recorder listening on `metrics_endpoint`, spawns the
/// exporter and runs upkeep every `interval_ms`. Must be called from within a
/// Tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable endpoint and
/// `TelemetryError::MetricsInit` if the exporter cannot be built.
pub fn init_metrics(config: &TelemetryConfig) -> TelemetryResult<MetricsRuntime> {
    let addr: SocketAddr = config
        .metrics_endpoint
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.metrics_endpoint)))?;

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = recorder.handle();

    let exporter_task = tokio::spawn(async move {
        if let Err(err) = exporter.await {
            tracing::error!(error = ?err, "prometheus exporter stopped");
        }
    });

    let upkeep_handle = handle.clone();
    let interval = Duration::from_millis(config.metrics.interval_ms.max(1));
    let upkeep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            upkeep_handle.run_upkeep();
        }
    });

    tracing::info!(%addr, interval_ms = config.metrics.interval_ms, "prometheus exporter started");

    Ok(MetricsRuntime {
        handle,
        meter: Meter::new(recorder),
        tasks: vec![exporter_task, upkeep_task],
    })
}
