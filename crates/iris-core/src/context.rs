//! Per-call context.
//!
//! [`CallContext`] is the mutable state that flows through the interceptor
//! chain for one inbound call. Interceptors enrich it (response metadata,
//! extensions); the transport builds it per call and consumes the response
//! metadata once the chain returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::call::{Metadata, MethodDescriptor};

/// Unique identifier for one inbound call (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a fresh call ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Context that flows through the interceptor chain for one call.
///
/// # Example
///
/// ```rust
/// use iris_core::{CallContext, MethodDescriptor};
///
/// let mut ctx = CallContext::new(MethodDescriptor::new("Echo", "Say"));
/// ctx.response_metadata_mut().insert("x-cache", "hit").unwrap();
/// assert_eq!(ctx.response_metadata().get("x-cache"), Some("hit"));
/// ```
#[derive(Debug)]
pub struct CallContext {
    call_id: CallId,
    descriptor: MethodDescriptor,
    request_metadata: Metadata,
    response_metadata: Metadata,
    started_at: Instant,
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    /// Creates a context for a call to `descriptor` with a fresh call ID.
    #[must_use]
    pub fn new(descriptor: MethodDescriptor) -> Self {
        Self {
            call_id: CallId::new(),
            descriptor,
            request_metadata: Metadata::new(),
            response_metadata: Metadata::new(),
            started_at: Instant::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a context carrying metadata extracted from the transport.
    #[must_use]
    pub fn with_request_metadata(descriptor: MethodDescriptor, metadata: Metadata) -> Self {
        let mut ctx = Self::new(descriptor);
        ctx.request_metadata = metadata;
        ctx
    }

    /// Returns the call ID.
    #[must_use]
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Returns the method descriptor for this call.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Returns the metadata the caller attached to the request.
    #[must_use]
    pub fn request_metadata(&self) -> &Metadata {
        &self.request_metadata
    }

    /// Returns the outgoing response metadata.
    #[must_use]
    pub fn response_metadata(&self) -> &Metadata {
        &self.response_metadata
    }

    /// Returns the outgoing response metadata for mutation.
    ///
    /// Inserts fail once the transport has sealed the metadata.
    pub fn response_metadata_mut(&mut self) -> &mut Metadata {
        &mut self.response_metadata
    }

    /// Consumes the context, returning the accumulated response metadata.
    #[must_use]
    pub fn into_response_metadata(self) -> Metadata {
        self.response_metadata
    }

    /// Returns when the call started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns a handle the transport uses to signal caller cancellation.
    #[must_use]
    pub fn cancellation(&self) -> CancellationHandle {
        CancellationHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Returns `true` once the caller has abandoned the call.
    ///
    /// Interceptors may observe this to skip best-effort work (such as a
    /// cache write) but are never required to.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cloneable handle that marks the associated call as cancelled.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Marks the call as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context() {
        let ctx = CallContext::new(MethodDescriptor::new("Echo", "Say"));
        assert_eq!(ctx.descriptor().full_name(), "Echo/Say");
        assert!(ctx.request_metadata().is_empty());
        assert!(ctx.response_metadata().is_empty());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_call_ids_unique() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_metadata_carried() {
        let mut md = Metadata::new();
        md.insert("authorization", "bearer t").unwrap();

        let ctx = CallContext::with_request_metadata(MethodDescriptor::new("Echo", "Say"), md);
        assert_eq!(ctx.request_metadata().get("authorization"), Some("bearer t"));
    }

    #[test]
    fn test_cancellation_observed() {
        let ctx = CallContext::new(MethodDescriptor::new("Echo", "Say"));
        let handle = ctx.cancellation();
        assert!(!ctx.is_cancelled());

        handle.cancel();
        handle.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_into_response_metadata() {
        let mut ctx = CallContext::new(MethodDescriptor::new("Echo", "Say"));
        ctx.response_metadata_mut().insert("x-cache", "hit").unwrap();

        let md = ctx.into_response_metadata();
        assert_eq!(md.get("x-cache"), Some("hit"));
    }
}
