//! Handler registration and dispatch.
//!
//! Application RPC methods register against a [`HandlerRegistry`] keyed by
//! full method name (`Service/Method`). Handlers are type-erased async
//! functions over opaque payloads; Iris never defines application methods
//! itself.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use iris_core::{HandlerRegistry, UnaryResponse};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("Echo/Say", |_ctx, req| async move {
//!     Ok(UnaryResponse::new(req.into_payload()))
//! });
//!
//! assert!(registry.contains("Echo/Say"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::call::{MethodDescriptor, UnaryRequest};
use crate::context::CallId;
use crate::error::{CallError, CallResult};

/// Boxed future produced by a handler invocation.
pub type BoxedCallFuture = Pin<Box<dyn Future<Output = CallResult> + Send>>;

/// A type-erased unary handler.
pub type UnaryHandler = Arc<dyn Fn(HandlerContext, UnaryRequest) -> BoxedCallFuture + Send + Sync>;

/// Immutable snapshot of call identity handed to a handler.
///
/// Handlers see who is being called and under which call ID; the mutable
/// [`CallContext`](crate::CallContext) stays with the interceptor chain.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    call_id: CallId,
    descriptor: MethodDescriptor,
}

impl HandlerContext {
    /// Creates a snapshot from call identity.
    #[must_use]
    pub fn new(call_id: CallId, descriptor: MethodDescriptor) -> Self {
        Self {
            call_id,
            descriptor,
        }
    }

    /// Returns the call ID.
    #[must_use]
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Returns the called method.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }
}

/// Registry mapping full method names to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, UnaryHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for `method` (full name, `Service/Method`).
    ///
    /// Registering the same method twice replaces the previous handler.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(HandlerContext, UnaryRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let erased: UnaryHandler = Arc::new(move |ctx, req| Box::pin(handler(ctx, req)));
        self.handlers.insert(method.into(), erased);
    }

    /// Returns `true` when a handler is registered for `method`.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Returns the handler registered for `method`, if any.
    #[must_use]
    pub fn lookup(&self, method: &str) -> Option<UnaryHandler> {
        self.handlers.get(method).map(Arc::clone)
    }

    /// Invokes the handler registered for the context's method.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Unimplemented`] when no handler is registered.
    pub async fn invoke(&self, ctx: HandlerContext, request: UnaryRequest) -> CallResult {
        let method = ctx.descriptor().full_name();
        match self.handlers.get(&method) {
            Some(handler) => handler(ctx, request).await,
            None => Err(CallError::Unimplemented(format!(
                "no handler registered for {method}"
            ))),
        }
    }

    /// Returns registered method names, sorted, for service discovery.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::UnaryResponse;
    use bytes::Bytes;

    fn handler_ctx(service: &str, method: &str) -> HandlerContext {
        HandlerContext::new(CallId::new(), MethodDescriptor::new(service, method))
    }

    #[tokio::test]
    async fn test_invoke_registered_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register("Echo/Say", |_ctx, req| async move {
            Ok(UnaryResponse::new(req.into_payload()))
        });

        let result = registry
            .invoke(
                handler_ctx("Echo", "Say"),
                UnaryRequest::new(Bytes::from_static(b"hello")),
            )
            .await
            .unwrap();

        assert_eq!(result.payload().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_invoke_missing_handler() {
        let registry = HandlerRegistry::new();
        let result = registry
            .invoke(
                handler_ctx("Echo", "Say"),
                UnaryRequest::new(Bytes::new()),
            )
            .await;

        assert!(matches!(result, Err(CallError::Unimplemented(_))));
    }

    #[tokio::test]
    async fn test_handler_error_passes_through() {
        let mut registry = HandlerRegistry::new();
        registry.register("Echo/Fail", |_ctx, _req| async move {
            Err(CallError::Internal("boom".into()))
        });

        let result = registry
            .invoke(
                handler_ctx("Echo", "Fail"),
                UnaryRequest::new(Bytes::new()),
            )
            .await;

        assert_eq!(result, Err(CallError::Internal("boom".into())));
    }

    #[test]
    fn test_method_names_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register("B/Two", |_c, _r| async { Err(CallError::Unknown("".into())) });
        registry.register("A/One", |_c, _r| async { Err(CallError::Unknown("".into())) });

        assert_eq!(registry.method_names(), vec!["A/One", "B/Two"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("A/One"));
        assert!(!registry.contains("C/Three"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register("Echo/Say", |_c, _r| async { Err(CallError::Unknown("v1".into())) });
        registry.register("Echo/Say", |_c, _r| async { Err(CallError::Unknown("v2".into())) });
        assert_eq!(registry.len(), 1);
    }
}
