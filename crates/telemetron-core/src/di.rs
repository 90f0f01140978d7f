//! Provider container.
//!
//! Module registration exports its configuration, services and interceptors
//! as providers keyed by type. Async configuration factories receive the same
//! container so they can look up whatever they depend on.
//!
//! # Example
//!
//! ```rust
//! use telemetron_core::di::Container;
//! use std::sync::Arc;
//!
//! struct Settings {
//!     service_name: String,
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Settings { service_name: "billing".into() }));
//!
//! let settings: Arc<Settings> = container.resolve_required().unwrap();
//! assert_eq!(settings.service_name, "billing");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error when a provider cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("failed to resolve {type_name}: {reason}")]
pub struct InjectionError {
    /// The type name that could not be resolved.
    pub type_name: &'static str,
    /// The reason for the failure.
    pub reason: String,
}

impl InjectionError {
    /// Creates an error for a provider that was never registered.
    pub fn not_registered<T>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            reason: "provider not registered".to_string(),
        }
    }
}

/// Type-keyed provider container.
///
/// Registering a second provider of the same type replaces the first.
#[derive(Default, Clone)]
pub struct Container {
    providers: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, returning the one it replaced.
    pub fn register<T: Send + Sync + 'static>(&mut self, provider: Arc<T>) -> Option<Arc<T>> {
        self.providers
            .insert(TypeId::of::<T>(), provider)
            .and_then(|old| old.downcast::<T>().ok())
    }

    /// Resolves a provider by type.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.providers
            .get(&TypeId::of::<T>())
            .and_then(|p| Arc::clone(p).downcast::<T>().ok())
    }

    /// Resolves a provider or fails with [`InjectionError`].
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        self.resolve().ok_or_else(InjectionError::not_registered::<T>)
    }

    /// Checks whether a provider of type `T` is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.providers.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("provider_count", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Endpoint(String);

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        assert!(container.is_empty());

        container.register(Arc::new(Endpoint("http://collector:4317".into())));
        let endpoint: Arc<Endpoint> = container.resolve().unwrap();
        assert_eq!(endpoint.0, "http://collector:4317");
        assert!(container.contains::<Endpoint>());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_register_replaces() {
        let mut container = Container::new();
        assert!(container.register(Arc::new(Endpoint("a".into()))).is_none());
        let old = container.register(Arc::new(Endpoint("b".into())));
        assert_eq!(old.unwrap().0, "a");
        assert_eq!(container.resolve::<Endpoint>().unwrap().0, "b");
    }

    #[test]
    fn test_resolve_required_missing() {
        let container = Container::new();
        let err = container.resolve_required::<Endpoint>().unwrap_err();
        assert!(err.to_string().contains("Endpoint"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_debug() {
        let debug = format!("{:?}", Container::new());
        assert!(debug.contains("provider_count"));
    }
}
