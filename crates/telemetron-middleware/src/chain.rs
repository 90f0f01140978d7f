//! Ordered interceptor chain.
//!
//! An [`InterceptorChain`] wraps a handler in a fixed list of interceptors.
//! The first interceptor added is the outermost: it runs first on the way in
//! and last on the way out.
//!
//! ```text
//! invoke ─▶ tracing ─▶ metrics ─▶ handler
//!    ◀────────┘ ◀────────┘ ◀─────────┘
//! ```

use crate::context::InvocationContext;
use crate::interceptor::{BoxFuture, Interceptor, Next};
use std::fmt;
use std::sync::Arc;
use telemetron_core::HandlerResult;

/// A type-erased interceptor that can be shared between chains.
pub type BoxedInterceptor = Arc<dyn Interceptor>;

/// Immutable, ordered list of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<BoxedInterceptor>,
}

impl InterceptorChain {
    /// Creates a chain builder.
    #[must_use]
    pub fn builder() -> InterceptorChainBuilder {
        InterceptorChainBuilder::new()
    }

    /// Runs `handler` through every interceptor, outermost first.
    ///
    /// The handler's result, including the exact error value, is what every
    /// interceptor sees and what this call returns.
    pub async fn invoke<H>(&self, ctx: &mut InvocationContext, handler: H) -> HandlerResult
    where
        H: FnOnce(&mut InvocationContext) -> BoxFuture<'static, HandlerResult> + Send,
    {
        let mut next = Next::handler(handler);
        for interceptor in self.interceptors.iter().rev() {
            next = Next::new(interceptor.as_ref(), next);
        }
        next.run(ctx).await
    }

    /// Returns the interceptor names in execution order.
    #[must_use]
    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Returns the number of interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if the chain has no interceptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptor_names())
            .finish()
    }
}

/// Builder for an [`InterceptorChain`].
#[derive(Default)]
pub struct InterceptorChainBuilder {
    interceptors: Vec<BoxedInterceptor>,
}

impl InterceptorChainBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor. Earlier interceptors wrap later ones.
    #[must_use]
    pub fn interceptor<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends a shared interceptor.
    #[must_use]
    pub fn shared(mut self, interceptor: BoxedInterceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Builds the chain.
    #[must_use]
    pub fn build(self) -> InterceptorChain {
        InterceptorChain {
            interceptors: self.interceptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use telemetron_core::HandlerDescriptor;

    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn intercept<'a>(
            &'a self,
            ctx: &'a mut InvocationContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:in", self.name));
                let result = next.run(ctx).await;
                self.log.lock().unwrap().push(format!("{}:out", self.name));
                result
            })
        }
    }

    fn context() -> InvocationContext {
        InvocationContext::new(Arc::new(HandlerDescriptor::new("Svc", "op")))
            .with_arguments(vec![json!(20), json!(22)])
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let chain = InterceptorChain::builder().build();
        assert!(chain.is_empty());

        let mut ctx = context();
        let result = chain
            .invoke(&mut ctx, |ctx| {
                let sum: i64 = ctx.arguments().iter().filter_map(|v| v.as_i64()).sum();
                Box::pin(async move { Ok(json!(sum)) })
            })
            .await;
        assert_eq!(result.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_outermost_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::builder()
            .interceptor(Probe { name: "outer", log: Arc::clone(&log) })
            .interceptor(Probe { name: "inner", log: Arc::clone(&log) })
            .build();

        assert_eq!(chain.interceptor_names(), vec!["outer", "inner"]);
        assert_eq!(chain.len(), 2);

        let mut ctx = context();
        chain
            .invoke(&mut ctx, |_| Box::pin(async { Ok(json!(null)) }))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:in", "inner:in", "inner:out", "outer:out"]
        );
    }

    #[tokio::test]
    async fn test_chain_is_reusable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let probe: BoxedInterceptor = Arc::new(Probe { name: "probe", log: Arc::clone(&log) });
        let chain = InterceptorChain::builder().shared(probe).build();

        for _ in 0..3 {
            let mut ctx = context();
            chain
                .invoke(&mut ctx, |_| Box::pin(async { Ok(json!(1)) }))
                .await
                .unwrap();
        }
        assert_eq!(log.lock().unwrap().len(), 6);
    }
}
