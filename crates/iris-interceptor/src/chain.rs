//! Ordered interceptor chain.
//!
//! The chain is assembled once by the server builder and never mutated
//! afterwards. Stages run in the exact order they were appended: the first
//! appended stage is outermost, seeing the request first and the response
//! last.

use std::sync::Arc;

use iris_core::{CallContext, CallResult, UnaryRequest};

use crate::interceptor::{
    BoxFuture, StreamInterceptor, StreamNext, StreamResult, UnaryInterceptor, UnaryNext,
};

/// A type-erased unary stage.
pub type BoxedUnaryInterceptor = Arc<dyn UnaryInterceptor>;

/// A type-erased stream stage.
pub type BoxedStreamInterceptor = Arc<dyn StreamInterceptor>;

/// Immutable, ordered interceptor chain for one server.
pub struct InterceptorChain {
    unary: Vec<BoxedUnaryInterceptor>,
    stream: Vec<BoxedStreamInterceptor>,
}

impl InterceptorChain {
    /// Builds a chain from already-ordered stage lists.
    #[must_use]
    pub fn new(unary: Vec<BoxedUnaryInterceptor>, stream: Vec<BoxedStreamInterceptor>) -> Self {
        Self { unary, stream }
    }

    /// Runs one unary call through the chain with `handler` as the terminal
    /// continuation.
    pub async fn run_unary<H>(
        &self,
        ctx: &mut CallContext,
        request: UnaryRequest,
        handler: H,
    ) -> CallResult
    where
        H: FnOnce(&mut CallContext, UnaryRequest) -> BoxFuture<'static, CallResult> + Send,
    {
        // Wrap back to front so the first appended stage runs outermost.
        let mut next = UnaryNext::handler(handler);
        for interceptor in self.unary.iter().rev() {
            next = UnaryNext::new(interceptor.as_ref(), next);
        }
        next.run(ctx, request).await
    }

    /// Runs one stream through the chain with `driver` consuming the stream.
    pub async fn run_stream<H>(&self, ctx: &mut CallContext, driver: H) -> StreamResult
    where
        H: FnOnce(&mut CallContext) -> BoxFuture<'static, StreamResult> + Send,
    {
        let mut next = StreamNext::handler(driver);
        for interceptor in self.stream.iter().rev() {
            next = StreamNext::new(interceptor.as_ref(), next);
        }
        next.run(ctx).await
    }

    /// Returns unary stage names in execution order.
    #[must_use]
    pub fn unary_stage_names(&self) -> Vec<&'static str> {
        self.unary.iter().map(|i| i.name()).collect()
    }

    /// Returns stream stage names in execution order.
    #[must_use]
    pub fn stream_stage_names(&self) -> Vec<&'static str> {
        self.stream.iter().map(|i| i.name()).collect()
    }

    /// Returns the number of unary stages.
    #[must_use]
    pub fn unary_len(&self) -> usize {
        self.unary.len()
    }

    /// Returns the number of stream stages.
    #[must_use]
    pub fn stream_len(&self) -> usize {
        self.stream.len()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("unary", &self.unary_stage_names())
            .field("stream", &self.stream_stage_names())
            .finish()
    }
}
