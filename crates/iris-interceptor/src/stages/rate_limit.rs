//! Rate limiting stage.
//!
//! Admission control happens before the handler (and before any downstream
//! stage) runs. The admission decision itself belongs to the injected
//! [`RateLimiter`]; this stage only translates a denial into
//! [`CallError::ResourceExhausted`].

use std::sync::Arc;

use iris_core::{CallContext, CallError, CallResult, UnaryRequest};
use thiserror::Error;

use crate::interceptor::{
    BoxFuture, StreamInterceptor, StreamNext, StreamResult, UnaryInterceptor, UnaryNext,
};

/// Denial returned by a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded: {0}")]
pub struct LimitExceeded(pub String);

/// Admission decision collaborator.
///
/// Implementations bring their own algorithm (token bucket, sliding window,
/// whatever fits); the stage calls [`RateLimiter::check`] once per call or
/// stream, before anything downstream runs.
pub trait RateLimiter: Send + Sync + 'static {
    /// Decides whether the call may proceed.
    ///
    /// # Errors
    ///
    /// Returns [`LimitExceeded`] to deny admission.
    fn check(&self, ctx: &CallContext) -> Result<(), LimitExceeded>;
}

/// Interceptor stage enforcing admission via a [`RateLimiter`].
///
/// Installed for both unary calls and streams; a denied call never reaches
/// the next stage.
pub struct RateLimitInterceptor {
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitInterceptor {
    /// Creates the stage around an injected limiter.
    #[must_use]
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }

    fn admit(&self, ctx: &CallContext) -> Result<(), CallError> {
        self.limiter
            .check(ctx)
            .map_err(|e| CallError::ResourceExhausted(e.to_string()))
    }
}

impl std::fmt::Debug for RateLimitInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitInterceptor").finish_non_exhaustive()
    }
}

impl UnaryInterceptor for RateLimitInterceptor {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        request: UnaryRequest,
        next: UnaryNext<'a>,
    ) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            self.admit(ctx)?;
            next.run(ctx, request).await
        })
    }
}

impl StreamInterceptor for RateLimitInterceptor {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: StreamNext<'a>,
    ) -> BoxFuture<'a, StreamResult> {
        Box::pin(async move {
            self.admit(ctx)?;
            next.run(ctx).await
        })
    }
}
