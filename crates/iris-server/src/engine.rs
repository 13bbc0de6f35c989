//! RPC engine: per-call dispatch through the interceptor chain.
//!
//! The engine owns the assembled [`InterceptorChain`] and the
//! [`HandlerRegistry`]. For each inbound call it builds a fresh
//! [`CallContext`], runs the chain with the registered handler as terminal
//! continuation and hands the outcome (plus accumulated response metadata)
//! back to the transport.

use bytes::Bytes;
use iris_core::{
    CallContext, CallError, CallResult, HandlerContext, HandlerRegistry, LogHandle, Metadata,
    MethodDescriptor, UnaryRequest,
};
use iris_interceptor::InterceptorChain;

/// Dispatches unary calls through the interceptor chain.
pub struct RpcEngine {
    chain: InterceptorChain,
    handlers: HandlerRegistry,
    reflection_enabled: bool,
    log: LogHandle,
}

impl RpcEngine {
    pub(crate) fn new(chain: InterceptorChain, reflection_enabled: bool, log: LogHandle) -> Self {
        Self {
            chain,
            handlers: HandlerRegistry::new(),
            reflection_enabled,
            log,
        }
    }

    /// Returns the handler registry.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Returns the handler registry for registration.
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Returns `true` when service reflection is enabled.
    #[must_use]
    pub fn reflection_enabled(&self) -> bool {
        self.reflection_enabled
    }

    /// Returns the registered method names, sorted, for reflection.
    #[must_use]
    pub fn method_listing(&self) -> Vec<String> {
        self.handlers.method_names()
    }

    /// Returns the assembled interceptor chain.
    #[must_use]
    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Dispatches one unary call.
    ///
    /// Returns the call outcome together with the response metadata the
    /// chain accumulated; the transport renders the metadata as response
    /// headers whether the call succeeded or not.
    pub async fn dispatch(
        &self,
        descriptor: MethodDescriptor,
        request_metadata: Metadata,
        payload: Bytes,
    ) -> (CallResult, Metadata) {
        let mut ctx = CallContext::with_request_metadata(descriptor.clone(), request_metadata);
        tracing::debug!(
            parent: self.log.span(),
            call_id = %ctx.call_id(),
            method = %descriptor,
            "dispatching call"
        );

        // Resolve the handler up front; the terminal continuation must not
        // borrow the registry.
        let handler = self.handlers.lookup(&descriptor.full_name());
        let handler_ctx = HandlerContext::new(ctx.call_id(), descriptor);

        let result = self
            .chain
            .run_unary(&mut ctx, UnaryRequest::new(payload), move |_ctx, request| {
                Box::pin(async move {
                    match handler {
                        Some(handler) => handler(handler_ctx, request).await,
                        None => Err(CallError::Unimplemented(format!(
                            "no handler registered for {}",
                            handler_ctx.descriptor().full_name()
                        ))),
                    }
                })
            })
            .await;

        (result, ctx.into_response_metadata())
    }
}

impl std::fmt::Debug for RpcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcEngine")
            .field("chain", &self.chain)
            .field("handlers", &self.handlers)
            .field("reflection_enabled", &self.reflection_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_core::UnaryResponse;
    use iris_interceptor::{BoxFuture, UnaryInterceptor, UnaryNext};
    use std::sync::Arc;

    fn engine(chain: InterceptorChain) -> RpcEngine {
        RpcEngine::new(chain, false, LogHandle::new("test"))
    }

    #[tokio::test]
    async fn test_dispatch_reaches_handler() {
        let mut engine = engine(InterceptorChain::new(Vec::new(), Vec::new()));
        engine.handlers_mut().register("Echo/Say", |_ctx, req| async move {
            Ok(UnaryResponse::new(req.into_payload()))
        });

        let (result, _metadata) = engine
            .dispatch(
                MethodDescriptor::new("Echo", "Say"),
                Metadata::new(),
                Bytes::from_static(b"hello"),
            )
            .await;

        assert_eq!(result.unwrap().payload().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let engine = engine(InterceptorChain::new(Vec::new(), Vec::new()));

        let (result, _metadata) = engine
            .dispatch(
                MethodDescriptor::new("Echo", "Missing"),
                Metadata::new(),
                Bytes::new(),
            )
            .await;

        assert!(matches!(result, Err(CallError::Unimplemented(_))));
    }

    #[tokio::test]
    async fn test_response_metadata_returned() {
        struct Stamping;

        impl UnaryInterceptor for Stamping {
            fn name(&self) -> &'static str {
                "stamping"
            }

            fn intercept<'a>(
                &'a self,
                ctx: &'a mut CallContext,
                request: UnaryRequest,
                next: UnaryNext<'a>,
            ) -> BoxFuture<'a, CallResult> {
                Box::pin(async move {
                    let _ = ctx.response_metadata_mut().insert("x-stage", "stamping");
                    next.run(ctx, request).await
                })
            }
        }

        let mut engine = engine(InterceptorChain::new(vec![Arc::new(Stamping)], Vec::new()));
        engine.handlers_mut().register("Echo/Say", |_ctx, _req| async move {
            Ok(UnaryResponse::new(Bytes::new()))
        });

        let (result, metadata) = engine
            .dispatch(
                MethodDescriptor::new("Echo", "Say"),
                Metadata::new(),
                Bytes::new(),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(metadata.get("x-stage"), Some("stamping"));
    }

    #[test]
    fn test_method_listing_sorted() {
        let mut engine = engine(InterceptorChain::new(Vec::new(), Vec::new()));
        engine.handlers_mut().register("B/Two", |_c, _r| async {
            Ok(UnaryResponse::new(Bytes::new()))
        });
        engine.handlers_mut().register("A/One", |_c, _r| async {
            Ok(UnaryResponse::new(Bytes::new()))
        });

        assert_eq!(engine.method_listing(), vec!["A/One", "B/Two"]);
    }
}
