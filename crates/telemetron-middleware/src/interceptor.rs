//! Core interceptor trait and types.
//!
//! An [`Interceptor`] wraps a handler invocation: it sees the
//! [`InvocationContext`] before the handler runs, calls [`Next::run`] to
//! continue the chain, and observes the [`HandlerResult`] on the way back.
//!
//! # Example
//!
//! ```ignore
//! use telemetron_middleware::{BoxFuture, Interceptor, InvocationContext, Next};
//! use telemetron_core::HandlerResult;
//!
//! struct Timing;
//!
//! impl Interceptor for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn intercept<'a>(
//!         &'a self,
//!         ctx: &'a mut InvocationContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             let result = next.run(ctx).await;
//!             println!("{} took {:?}", ctx.descriptor().method_name(), ctx.elapsed());
//!             result
//!         })
//!     }
//! }
//! ```

use crate::context::InvocationContext;
use std::future::Future;
use std::pin::Pin;
use telemetron_core::HandlerResult;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal handler invoked at the end of the chain.
pub type Handler<'a> =
    Box<dyn FnOnce(&mut InvocationContext) -> BoxFuture<'static, HandlerResult> + Send + 'a>;

/// Cross-cutting behavior around a handler invocation.
///
/// # Invariants
///
/// - Interceptors call `next.run()` exactly once
/// - Interceptors return the downstream result unchanged; errors are observed,
///   never replaced
pub trait Interceptor: Send + Sync + 'static {
    /// Returns the name of this interceptor, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Intercepts one invocation.
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// The rest of the chain after the current interceptor.
///
/// Consumed by [`Next::run`], so it can only be invoked once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        interceptor: &'a dyn Interceptor,
        next: Box<Next<'a>>,
    },
    Handler(Handler<'a>),
}

impl<'a> Next<'a> {
    pub(crate) fn new(interceptor: &'a dyn Interceptor, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                interceptor,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes `handler`.
    pub fn handler<F>(handler: F) -> Self
    where
        F: FnOnce(&mut InvocationContext) -> BoxFuture<'static, HandlerResult> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(handler)),
        }
    }

    /// Invokes the next interceptor, or the handler at the end of the chain.
    pub async fn run(self, ctx: &mut InvocationContext) -> HandlerResult {
        match self.inner {
            NextInner::Chain { interceptor, next } => interceptor.intercept(ctx, *next).await,
            NextInner::Handler(handler) => handler(ctx).await,
        }
    }
}

/// An interceptor built from a closure.
///
/// ```ignore
/// let audit = FnInterceptor::new("audit", |ctx, next| {
///     Box::pin(async move {
///         tracing::info!(method = ctx.descriptor().method_name(), "invoking");
///         next.run(ctx).await
///     })
/// });
/// ```
pub struct FnInterceptor<F> {
    name: &'static str,
    func: F,
}

impl<F> FnInterceptor<F>
where
    F: for<'a> Fn(&'a mut InvocationContext, Next<'a>) -> BoxFuture<'a, HandlerResult>,
{
    /// Creates a closure-based interceptor.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: for<'a> Fn(&'a mut InvocationContext, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        (self.func)(ctx, next)
    }
}
