//! Metrics stage.
//!
//! Wraps every call with an in-flight guard and records the call count and
//! handling latency once the downstream chain returns. Recording goes
//! through the `metrics` facade, so the stage works with whatever recorder
//! the process installed.

use std::time::Instant;

use iris_core::{CallContext, CallResult, UnaryRequest};
use iris_telemetry::{record_call, InFlightGuard};

use crate::interceptor::{
    BoxFuture, StreamInterceptor, StreamNext, StreamResult, UnaryInterceptor, UnaryNext,
};

/// Interceptor stage recording call-handling metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsInterceptor;

impl MetricsInterceptor {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl UnaryInterceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        request: UnaryRequest,
        next: UnaryNext<'a>,
    ) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            let method = ctx.descriptor().full_name();
            let started = Instant::now();
            let guard = InFlightGuard::new();

            let result = next.run(ctx, request).await;

            let code = match &result {
                Ok(_) => "OK",
                Err(e) => e.code(),
            };
            record_call(&method, code, started.elapsed());
            drop(guard);
            result
        })
    }
}

impl StreamInterceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: StreamNext<'a>,
    ) -> BoxFuture<'a, StreamResult> {
        Box::pin(async move {
            let method = ctx.descriptor().full_name();
            let started = Instant::now();
            let guard = InFlightGuard::new();

            let outcome = next.run(ctx).await;

            let code = match &outcome {
                Ok(()) => "OK",
                Err(e) => e.code(),
            };
            record_call(&method, code, started.elapsed());
            drop(guard);
            outcome
        })
    }
}
