//! Handler error wrapper.
//!
//! [`HandlerError`] is what instrumented handlers return on failure. It wraps
//! the business error in an [`Arc`] so the exact same value travels through
//! every interceptor back to the caller: interceptors only read it (name,
//! message, stack, HTTP status) and never replace it.
//!
//! ```
//! use telemetron_core::HandlerError;
//!
//! let err = HandlerError::msg("boom");
//! let observed = err.clone();
//! assert!(err.ptr_eq(&observed));
//! assert_eq!(observed.message(), "boom");
//! ```

use http::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type returned by instrumented handlers.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Plain message error used by [`HandlerError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MessageError(String);

/// A business error observed, never altered, by interceptors.
#[derive(Clone)]
pub struct HandlerError {
    inner: Arc<dyn StdError + Send + Sync>,
    name: &'static str,
    status: Option<StatusCode>,
}

impl HandlerError {
    /// Wraps a typed error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
            name: short_type_name::<E>(),
            status: None,
        }
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MessageError(message.into())),
            name: "Error",
            status: None,
        }
    }

    /// Attaches the HTTP status this error maps to.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns the error's type name (without module path).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the error's display message.
    #[must_use]
    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// Returns the HTTP status attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Renders the source chain, one cause per line.
    #[must_use]
    pub fn stack(&self) -> String {
        let mut stack = format!("{}: {}", self.name, self.inner);
        let mut source = self.inner.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        stack
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Returns the wrapped error downcast to `E`.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Returns `true` if both values wrap the same error instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("name", &self.name)
            .field("message", &self.inner.to_string())
            .field("status", &self.status)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("user {0} not found")]
    struct NotFound(u64);

    #[derive(Debug, Error)]
    #[error("query failed")]
    struct QueryFailed(#[source] std::io::Error);

    #[test]
    fn test_name_and_message() {
        let err = HandlerError::new(NotFound(7));
        assert_eq!(err.name(), "NotFound");
        assert_eq!(err.message(), "user 7 not found");
        assert_eq!(err.to_string(), "user 7 not found");
        assert!(err.status().is_none());
    }

    #[test]
    fn test_clone_preserves_identity() {
        let err = HandlerError::msg("boom");
        let clone = err.clone();
        assert!(err.ptr_eq(&clone));
        assert!(!err.ptr_eq(&HandlerError::msg("boom")));
    }

    #[test]
    fn test_stack_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = HandlerError::new(QueryFailed(io));
        let stack = err.stack();
        assert!(stack.starts_with("QueryFailed: query failed"));
        assert!(stack.contains("caused by: connection reset"));
    }

    #[test]
    fn test_with_status_and_downcast() {
        let err = HandlerError::new(NotFound(1)).with_status(StatusCode::NOT_FOUND);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.downcast_ref::<NotFound>().map(|e| e.0), Some(1));
    }
}
