//! Per-invocation context.
//!
//! An [`InvocationContext`] is created for every handler call and passed by
//! mutable reference through the interceptor chain. It carries the handler's
//! [`HandlerDescriptor`], the call arguments as JSON values and, for handlers
//! reached over HTTP, the incoming request line and headers.

use http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetron_core::HandlerDescriptor;
use uuid::Uuid;

/// Request data for handlers invoked over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRequestInfo {
    /// Request method.
    pub method: Method,
    /// Full request URI.
    pub uri: Uri,
    /// Request headers, including any `traceparent`.
    pub headers: HeaderMap,
    /// Matched route template (e.g. `/users/{id}`).
    pub route: Option<String>,
}

impl HttpRequestInfo {
    /// Creates request info without headers or route.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            route: None,
        }
    }

    /// Copies the request line and headers of `request`.
    #[must_use]
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            route: None,
        }
    }

    /// Sets the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the matched route template.
    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Returns the path and query, or just the path.
    #[must_use]
    pub fn target(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// Returns the `User-Agent` header, if present and valid UTF-8.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
    }
}

/// Context for a single handler invocation.
pub struct InvocationContext {
    invocation_id: Uuid,
    descriptor: Arc<HandlerDescriptor>,
    arguments: Vec<Value>,
    http: Option<HttpRequestInfo>,
    response_status: Option<StatusCode>,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl InvocationContext {
    /// Creates a context for a call to `descriptor` with no arguments.
    #[must_use]
    pub fn new(descriptor: Arc<HandlerDescriptor>) -> Self {
        Self {
            invocation_id: Uuid::now_v7(),
            descriptor,
            arguments: Vec::new(),
            http: None,
            response_status: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Sets the positional call arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attaches HTTP request data.
    #[must_use]
    pub fn with_http(mut self, http: HttpRequestInfo) -> Self {
        self.http = Some(http);
        self
    }

    /// Returns the unique id of this invocation (UUID v7).
    #[must_use]
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Returns the handler descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    /// Returns the positional call arguments.
    #[must_use]
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Pairs argument names with positional arguments.
    ///
    /// Stops at the shorter of the two lists.
    pub fn named_arguments<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        names.iter().map(String::as_str).zip(self.arguments.iter())
    }

    /// Returns the HTTP request data, if the call came over HTTP.
    #[must_use]
    pub fn http(&self) -> Option<&HttpRequestInfo> {
        self.http.as_ref()
    }

    /// Returns the response status set by the handler, if any.
    #[must_use]
    pub fn response_status(&self) -> Option<StatusCode> {
        self.response_status
    }

    /// Records the response status chosen by the handler.
    pub fn set_response_status(&mut self, status: StatusCode) {
        self.response_status = Some(status);
    }

    /// Returns when the invocation started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time elapsed since the invocation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value, replacing any previous one.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use telemetron_core::HandlerDescriptor;
    /// use telemetron_middleware::InvocationContext;
    ///
    /// struct TenantId(u32);
    ///
    /// let mut ctx = InvocationContext::new(Arc::new(HandlerDescriptor::new("Orders", "list")));
    /// ctx.set_extension(TenantId(7));
    /// assert_eq!(ctx.get_extension::<TenantId>().map(|t| t.0), Some(7));
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("invocation_id", &self.invocation_id)
            .field("class", &self.descriptor.class_name())
            .field("method", &self.descriptor.method_name())
            .field("arguments", &self.arguments.len())
            .field("http", &self.http.is_some())
            .field("response_status", &self.response_status)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

/// Renders an argument or result value as an attribute string.
///
/// Strings are used as-is, `null` becomes `"null"`, numbers and booleans are
/// stringified, and objects and arrays are serialized as JSON.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
