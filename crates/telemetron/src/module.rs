//! Module registration.
//!
//! A [`TelemetryModule`] owns the root [`TelemetrySdk`] of an application.
//! It is created once, from a static configuration or from an async factory
//! that looks up its inputs in the provider [`Container`], and then exports
//! the configuration, the adapter services and the interceptors as providers.
//!
//! Feature modules call [`TelemetryModule::for_feature`] to get services
//! scoped to their name. Scoped services share the root SDK; nothing is
//! started twice.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use telemetron::module::{FeatureOptions, TelemetryModule};
//! use telemetron::telemetry::{TelemetryConfig, TracingService};
//! use telemetron::core::di::Container;
//!
//! # tokio_test::block_on(async {
//! let config = TelemetryConfig::builder()
//!     .service_name("billing")
//!     .tracing_enabled(false)
//!     .metrics_enabled(false)
//!     .logging_enabled(false)
//!     .build();
//!
//! let module = TelemetryModule::for_root(config).await.unwrap();
//! let mut container = Container::new();
//! module.register(&mut container);
//!
//! let tracing: Arc<TracingService> = container.resolve_required().unwrap();
//! assert!(!tracing.is_enabled());
//!
//! let payments = module.for_feature(FeatureOptions::new("payments"));
//! assert_eq!(payments.logging_service().feature(), Some("payments"));
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;
use telemetron_core::di::Container;
use telemetron_core::{AttrValue, Attributes};
use telemetron_middleware::{InterceptorChain, MetricsInterceptor, TracingInterceptor};
use telemetron_telemetry::{
    LoggingService, MetricsService, TelemetryConfig, TelemetryResult, TelemetrySdk,
    TracingService,
};

/// Root telemetry registration.
///
/// Cloning is cheap and every clone refers to the same SDK.
#[derive(Debug, Clone)]
pub struct TelemetryModule {
    sdk: Arc<TelemetrySdk>,
    tracing_interceptor: Arc<TracingInterceptor>,
    metrics_interceptor: Arc<MetricsInterceptor>,
}

impl TelemetryModule {
    /// Starts telemetry from a static configuration.
    ///
    /// # Errors
    ///
    /// Returns the SDK initialization error.
    pub async fn for_root(config: TelemetryConfig) -> TelemetryResult<Self> {
        let sdk = TelemetrySdk::start(&config).await?;
        Ok(Self::from_sdk(sdk))
    }

    /// Starts telemetry from a configuration produced by `factory`.
    ///
    /// The factory receives a handle to `deps` and may resolve whatever it
    /// needs from it. A missing provider surfaces as
    /// [`TelemetryError::Injection`](telemetron_telemetry::TelemetryError::Injection).
    ///
    /// # Errors
    ///
    /// Returns the factory's error or the SDK initialization error.
    pub async fn for_root_async<F, Fut>(deps: &Container, factory: F) -> TelemetryResult<Self>
    where
        F: FnOnce(Container) -> Fut,
        Fut: Future<Output = TelemetryResult<TelemetryConfig>>,
    {
        let config = factory(deps.clone()).await?;
        Self::for_root(config).await
    }

    /// Wraps an already assembled SDK.
    #[must_use]
    pub fn from_sdk(sdk: TelemetrySdk) -> Self {
        let tracing_interceptor = Arc::new(TracingInterceptor::new(sdk.tracing_service().clone()));
        let metrics_interceptor = Arc::new(MetricsInterceptor::new(sdk.metrics_service().clone()));
        Self {
            sdk: Arc::new(sdk),
            tracing_interceptor,
            metrics_interceptor,
        }
    }

    /// Returns the root SDK.
    #[must_use]
    pub fn sdk(&self) -> &Arc<TelemetrySdk> {
        &self.sdk
    }

    /// Returns the effective configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<TelemetryConfig> {
        self.sdk.config()
    }

    /// Returns the root tracing service.
    #[must_use]
    pub fn tracing_service(&self) -> &TracingService {
        self.sdk.tracing_service()
    }

    /// Returns the root metrics service.
    #[must_use]
    pub fn metrics_service(&self) -> &MetricsService {
        self.sdk.metrics_service()
    }

    /// Returns the root logger.
    #[must_use]
    pub fn logging_service(&self) -> &LoggingService {
        self.sdk.logging_service()
    }

    /// Returns the shared tracing interceptor.
    #[must_use]
    pub fn tracing_interceptor(&self) -> &Arc<TracingInterceptor> {
        &self.tracing_interceptor
    }

    /// Returns the shared metrics interceptor.
    #[must_use]
    pub fn metrics_interceptor(&self) -> &Arc<MetricsInterceptor> {
        &self.metrics_interceptor
    }

    /// Builds the standard chain: tracing outermost, then metrics.
    #[must_use]
    pub fn interceptor_chain(&self) -> InterceptorChain {
        InterceptorChain::builder()
            .shared(self.tracing_interceptor.clone())
            .shared(self.metrics_interceptor.clone())
            .build()
    }

    /// Returns services scoped to a feature.
    #[must_use]
    pub fn for_feature(&self, options: FeatureOptions) -> FeatureTelemetry {
        FeatureTelemetry::new(self, options)
    }

    /// Exports the module's providers.
    ///
    /// Registers the SDK, the configuration, the three adapter services,
    /// both interceptors and a ready-made [`InterceptorChain`]. Existing
    /// providers of the same types are replaced.
    pub fn register(&self, container: &mut Container) {
        container.register(Arc::clone(&self.sdk));
        container.register(Arc::clone(self.config()));
        container.register(Arc::new(self.tracing_service().clone()));
        container.register(Arc::new(self.metrics_service().clone()));
        container.register(Arc::new(self.logging_service().clone()));
        container.register(Arc::clone(&self.tracing_interceptor));
        container.register(Arc::clone(&self.metrics_interceptor));
        container.register(Arc::new(self.interceptor_chain()));

        tracing::debug!(
            service = %self.config().service_name,
            providers = container.len(),
            "telemetry providers registered"
        );
    }

    /// Flushes and stops the SDK. Later calls do nothing.
    pub fn shutdown(&self) {
        self.sdk.shutdown();
    }
}

/// Options for [`TelemetryModule::for_feature`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOptions {
    /// Feature name: tracer scope, metric prefix and logger `feature` field.
    pub name: String,
    /// Attributes added to every span and recording of the feature.
    pub attributes: Attributes,
}

impl FeatureOptions {
    /// Creates options with no extra attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Services scoped to one feature.
#[derive(Debug, Clone)]
pub struct FeatureTelemetry {
    name: String,
    tracing: TracingService,
    metrics: MetricsService,
    logging: LoggingService,
}

impl FeatureTelemetry {
    fn new(root: &TelemetryModule, options: FeatureOptions) -> Self {
        let FeatureOptions { name, attributes } = options;
        let span_attributes = attributes
            .iter()
            .map(|(key, value)| AttrValue::key_value(key, value))
            .collect();

        Self {
            tracing: root.tracing_service().with_scope(&name, span_attributes),
            metrics: root.metrics_service().with_scope(&name, attributes),
            logging: root.logging_service().with_scope(name.clone()),
            name,
        }
    }

    /// Returns the feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scoped tracing service.
    #[must_use]
    pub fn tracing_service(&self) -> &TracingService {
        &self.tracing
    }

    /// Returns the scoped metrics service.
    #[must_use]
    pub fn metrics_service(&self) -> &MetricsService {
        &self.metrics
    }

    /// Returns the scoped logger.
    #[must_use]
    pub fn logging_service(&self) -> &LoggingService {
        &self.logging
    }

    /// Builds a tracing then metrics chain over the scoped services.
    #[must_use]
    pub fn interceptor_chain(&self) -> InterceptorChain {
        InterceptorChain::builder()
            .interceptor(TracingInterceptor::new(self.tracing.clone()))
            .interceptor(MetricsInterceptor::new(self.metrics.clone()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetron_core::di::InjectionError;
    use telemetron_telemetry::TelemetryError;

    fn quiet_config(service: &str) -> TelemetryConfig {
        TelemetryConfig::builder()
            .service_name(service)
            .tracing_enabled(false)
            .metrics_enabled(false)
            .logging_enabled(false)
            .build()
    }

    #[tokio::test]
    async fn test_for_root_registers_providers() {
        let module = TelemetryModule::for_root(quiet_config("orders"))
            .await
            .unwrap();
        let mut container = Container::new();
        module.register(&mut container);

        assert!(container.contains::<TelemetrySdk>());
        assert!(container.contains::<TracingService>());
        assert!(container.contains::<MetricsService>());
        assert!(container.contains::<LoggingService>());
        assert!(container.contains::<TracingInterceptor>());
        assert!(container.contains::<MetricsInterceptor>());

        let config: Arc<TelemetryConfig> = container.resolve_required().unwrap();
        assert_eq!(config.service_name, "orders");
        assert!(Arc::ptr_eq(&config, module.config()));

        let chain: Arc<InterceptorChain> = container.resolve_required().unwrap();
        assert_eq!(chain.interceptor_names(), vec!["tracing", "metrics"]);
    }

    #[tokio::test]
    async fn test_registered_interceptors_are_shared() {
        let module = TelemetryModule::for_root(quiet_config("orders"))
            .await
            .unwrap();
        let mut container = Container::new();
        module.register(&mut container);

        let tracing: Arc<TracingInterceptor> = container.resolve_required().unwrap();
        assert!(Arc::ptr_eq(&tracing, module.tracing_interceptor()));
    }

    #[tokio::test]
    async fn test_for_root_async_resolves_dependencies() {
        struct AppSettings {
            name: &'static str,
        }

        let mut deps = Container::new();
        deps.register(Arc::new(AppSettings { name: "inventory" }));

        let module = TelemetryModule::for_root_async(&deps, |deps| async move {
            let settings: Arc<AppSettings> = deps.resolve_required()?;
            Ok::<_, TelemetryError>(quiet_config(settings.name))
        })
        .await
        .unwrap();

        assert_eq!(module.config().service_name, "inventory");
    }

    #[tokio::test]
    async fn test_for_root_async_missing_dependency() {
        struct Missing;

        let err = TelemetryModule::for_root_async(&Container::new(), |deps| async move {
            let _: Arc<Missing> = deps.resolve_required()?;
            Ok::<_, TelemetryError>(quiet_config("unused"))
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            TelemetryError::Injection(InjectionError { reason, .. }) if reason.contains("not registered")
        ));
    }

    #[tokio::test]
    async fn test_feature_scopes_logger() {
        let module = TelemetryModule::for_root(quiet_config("orders"))
            .await
            .unwrap();
        let feature = module.for_feature(FeatureOptions::new("refunds").attribute("team", "core"));

        assert_eq!(feature.name(), "refunds");
        assert_eq!(feature.logging_service().feature(), Some("refunds"));
        assert_eq!(module.logging_service().feature(), None);
        assert_eq!(feature.metrics_service().scoped_name("requests_total"), "refunds_requests_total");
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let module = TelemetryModule::from_sdk(TelemetrySdk::disabled(quiet_config("orders")));
        module.shutdown();
        module.shutdown();
        assert!(module.sdk().is_shut_down());
    }
}
