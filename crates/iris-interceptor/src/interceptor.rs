//! Core interceptor traits and the `Next` continuation.
//!
//! Interceptors process calls before they reach handlers and responses after
//! handlers complete. Unary calls and streams have separate traits because
//! their shapes differ: a unary interceptor sees the request payload and
//! returns the response, a stream interceptor sees only the stream outcome.
//!
//! # Example
//!
//! ```ignore
//! use iris_interceptor::{BoxFuture, UnaryInterceptor, UnaryNext};
//! use iris_core::{CallContext, CallResult, UnaryRequest};
//!
//! struct Logging;
//!
//! impl UnaryInterceptor for Logging {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn intercept<'a>(
//!         &'a self,
//!         ctx: &'a mut CallContext,
//!         request: UnaryRequest,
//!         next: UnaryNext<'a>,
//!     ) -> BoxFuture<'a, CallResult> {
//!         Box::pin(async move {
//!             tracing::debug!(call_id = %ctx.call_id(), "call started");
//!             let result = next.run(ctx, request).await;
//!             tracing::debug!(ok = result.is_ok(), "call finished");
//!             result
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

use iris_core::{CallContext, CallError, CallResult, UnaryRequest};

/// A boxed future returned by interceptor stages.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a fully-consumed stream.
pub type StreamResult = Result<(), CallError>;

/// An interceptor for unary (single request, single response) calls.
///
/// # Invariants
///
/// - An interceptor calls `next.run()` at most once; skipping it
///   short-circuits the chain with the interceptor's own result
/// - Downstream errors pass through unchanged
pub trait UnaryInterceptor: Send + Sync + 'static {
    /// Returns the stage name used for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Processes one unary call, delegating downstream via `next`.
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        request: UnaryRequest,
        next: UnaryNext<'a>,
    ) -> BoxFuture<'a, CallResult>;
}

/// An interceptor for streaming calls.
///
/// Stream payloads are the transport's business; interceptors wrap the
/// stream's lifetime and observe its outcome.
pub trait StreamInterceptor: Send + Sync + 'static {
    /// Returns the stage name used for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Wraps one stream, delegating downstream via `next`.
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: StreamNext<'a>,
    ) -> BoxFuture<'a, StreamResult>;
}

/// Continuation that invokes the rest of the unary chain.
///
/// Consumed by `run`, so it can only be invoked once.
pub struct UnaryNext<'a> {
    inner: UnaryNextInner<'a>,
}

enum UnaryNextInner<'a> {
    Chain {
        interceptor: &'a dyn UnaryInterceptor,
        next: Box<UnaryNext<'a>>,
    },
    Handler(Box<dyn FnOnce(&mut CallContext, UnaryRequest) -> BoxFuture<'static, CallResult> + Send + 'a>),
}

impl<'a> UnaryNext<'a> {
    /// Creates a continuation that invokes `interceptor` next.
    pub(crate) fn new(interceptor: &'a dyn UnaryInterceptor, next: UnaryNext<'a>) -> Self {
        Self {
            inner: UnaryNextInner::Chain {
                interceptor,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal continuation that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut CallContext, UnaryRequest) -> BoxFuture<'static, CallResult> + Send + 'a,
    {
        Self {
            inner: UnaryNextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next interceptor or the handler.
    pub async fn run(self, ctx: &mut CallContext, request: UnaryRequest) -> CallResult {
        match self.inner {
            UnaryNextInner::Chain { interceptor, next } => {
                interceptor.intercept(ctx, request, *next).await
            }
            UnaryNextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// Continuation that invokes the rest of the stream chain.
pub struct StreamNext<'a> {
    inner: StreamNextInner<'a>,
}

enum StreamNextInner<'a> {
    Chain {
        interceptor: &'a dyn StreamInterceptor,
        next: Box<StreamNext<'a>>,
    },
    Handler(Box<dyn FnOnce(&mut CallContext) -> BoxFuture<'static, StreamResult> + Send + 'a>),
}

impl<'a> StreamNext<'a> {
    pub(crate) fn new(interceptor: &'a dyn StreamInterceptor, next: StreamNext<'a>) -> Self {
        Self {
            inner: StreamNextInner::Chain {
                interceptor,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal continuation that drives the stream itself.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut CallContext) -> BoxFuture<'static, StreamResult> + Send + 'a,
    {
        Self {
            inner: StreamNextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next interceptor or the stream driver.
    pub async fn run(self, ctx: &mut CallContext) -> StreamResult {
        match self.inner {
            StreamNextInner::Chain { interceptor, next } => {
                interceptor.intercept(ctx, *next).await
            }
            StreamNextInner::Handler(handler) => handler(ctx).await,
        }
    }
}
