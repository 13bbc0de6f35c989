//! Response caching stage.
//!
//! Caches serialized unary response payloads in an injected
//! [`KeyValueCache`]. The protocol per call:
//!
//! 1. Derive the key via the injected key function; a key error aborts the
//!    call before cache or handler run.
//! 2. On a lookup hit, record the `x-cache: hit` signal in the response
//!    metadata. If the metadata accepts it, the cached payload is returned
//!    and the handler never runs. If the metadata is already sealed, the hit
//!    is unusable and the call falls through as a miss.
//! 3. On a miss, the real handler runs; its error propagates unchanged and
//!    nothing is cached.
//! 4. On handler success, the payload is written back with the configured
//!    TTL. A write failure is logged at warn and swallowed; a cancelled
//!    call skips the write.
//!
//! There is no streaming variant: caching a stream would require buffering
//! it whole, so streams pass through uncached.

use std::sync::Arc;
use std::time::Duration;

use iris_core::{CallContext, CallResult, LogHandle, UnaryRequest, UnaryResponse};
use thiserror::Error;

use crate::cache::{KeyFn, KeyValueCache};
use crate::interceptor::{BoxFuture, UnaryInterceptor, UnaryNext};

/// Response metadata key carrying the cache signal.
pub const CACHE_HIT_HEADER: &str = "x-cache";

/// Value recorded under [`CACHE_HIT_HEADER`] on a served hit.
pub const CACHE_HIT_VALUE: &str = "hit";

/// Construction failures for the cache stage.
///
/// The server builder folds these into its configuration error list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheStageError {
    /// No cache implementation was provided.
    #[error("response cache requires a cache implementation")]
    CacheMissing,

    /// No usable log handle was provided.
    #[error("response cache requires a log handle")]
    LoggerMissing,
}

/// Unary interceptor serving responses from an injected cache.
pub struct CacheInterceptor {
    cache: Arc<dyn KeyValueCache>,
    key_fn: KeyFn,
    ttl: Duration,
    log: LogHandle,
}

impl CacheInterceptor {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns [`CacheStageError::CacheMissing`] when `cache` is `None` and
    /// [`CacheStageError::LoggerMissing`] when `log` is a disabled handle.
    pub fn new(
        cache: Option<Arc<dyn KeyValueCache>>,
        key_fn: KeyFn,
        ttl: Duration,
        log: LogHandle,
    ) -> Result<Self, CacheStageError> {
        let cache = cache.ok_or(CacheStageError::CacheMissing)?;
        if log.is_none() {
            return Err(CacheStageError::LoggerMissing);
        }
        Ok(Self {
            cache,
            key_fn,
            ttl,
            log,
        })
    }

    /// Returns the configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl UnaryInterceptor for CacheInterceptor {
    fn name(&self) -> &'static str {
        "response_cache"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        request: UnaryRequest,
        next: UnaryNext<'a>,
    ) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            let key = (self.key_fn)(ctx, request.payload(), ctx.descriptor())?;

            if let Some(cached) = self.cache.get(ctx, &key).await {
                match ctx
                    .response_metadata_mut()
                    .insert(CACHE_HIT_HEADER, CACHE_HIT_VALUE)
                {
                    Ok(()) => {
                        tracing::debug!(
                            parent: self.log.span(),
                            key = %key,
                            "serving cached response"
                        );
                        return Ok(UnaryResponse::new(cached));
                    }
                    // The hit cannot be signalled once headers are committed;
                    // serve the call as if it had missed.
                    Err(_) => {
                        tracing::debug!(
                            parent: self.log.span(),
                            key = %key,
                            "cache hit with sealed metadata, treating as miss"
                        );
                    }
                }
            }

            let response = next.run(ctx, request).await?;

            // The write is best-effort; a cancelled caller is no longer
            // waiting for it.
            if ctx.is_cancelled() {
                tracing::debug!(
                    parent: self.log.span(),
                    key = %key,
                    "call cancelled, skipping cache write"
                );
                return Ok(response);
            }

            if let Err(e) = self
                .cache
                .set(ctx, &key, response.payload().clone(), self.ttl)
                .await
            {
                tracing::warn!(
                    parent: self.log.span(),
                    key = %key,
                    error = %e,
                    "cache write failed, serving response uncached"
                );
            }

            Ok(response)
        })
    }
}
