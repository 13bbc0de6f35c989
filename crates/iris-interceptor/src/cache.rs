//! Response cache collaborator trait.
//!
//! The cache stage delegates storage to an injected [`KeyValueCache`]; the
//! implementation owns its own thread safety and eviction policy. Values are
//! opaque serialized response payloads.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use iris_core::{CallContext, CallError, MethodDescriptor};
use thiserror::Error;

use crate::interceptor::BoxFuture;

/// Error from a cache write.
///
/// The cache stage logs and swallows these; a broken cache degrades to a
/// pass-through, it never fails calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache storage failure: {0}")]
pub struct CacheError(pub String);

/// Derives the cache key for one call.
///
/// Receives the call context, the raw request payload and the method being
/// called. A key error aborts the call before the cache or handler is
/// touched.
pub type KeyFn =
    Arc<dyn Fn(&CallContext, &Bytes, &MethodDescriptor) -> Result<String, CallError> + Send + Sync>;

/// Asynchronous key/value store for serialized unary responses.
///
/// Implementations must be safe for concurrent use; entries expire after the
/// TTL supplied on write.
pub trait KeyValueCache: Send + Sync + 'static {
    /// Looks up `key`, returning the stored payload when present and fresh.
    fn get<'a>(&'a self, ctx: &'a CallContext, key: &'a str) -> BoxFuture<'a, Option<Bytes>>;

    /// Stores `value` under `key` for at most `ttl`.
    fn set<'a>(
        &'a self,
        ctx: &'a CallContext,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>>;
}

/// Key function that keys on the full method name plus the request payload.
///
/// Suitable when request payloads are deterministic byte-for-byte. Payloads
/// that are not valid UTF-8 are rejected with
/// [`CallError::InvalidArgument`].
#[must_use]
pub fn method_and_payload_key() -> KeyFn {
    Arc::new(|_ctx, payload, descriptor| {
        let body = std::str::from_utf8(payload)
            .map_err(|_| CallError::InvalidArgument("cache key requires utf-8 payload".into()))?;
        Ok(format!("{}:{}", descriptor.full_name(), body))
    })
}
