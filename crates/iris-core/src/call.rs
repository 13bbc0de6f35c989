//! Unary call model: method descriptors, payloads and metadata.
//!
//! Payloads are opaque [`Bytes`]; serialization is the application's
//! concern. Metadata is an ordered list of string pairs attached to the
//! response (rendered as transport headers). Metadata can be *sealed* once
//! the transport has committed the headers. After that, inserts fail with
//! [`MetadataSealed`]. The response-cache interceptor relies on that failure
//! mode being observable.

use bytes::Bytes;
use thiserror::Error;

/// Identifies one RPC method: a service name plus a method name.
///
/// # Example
///
/// ```rust
/// use iris_core::MethodDescriptor;
///
/// let desc = MethodDescriptor::new("UserDirectory", "GetUser");
/// assert_eq!(desc.full_name(), "UserDirectory/GetUser");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    service: String,
    method: String,
}

impl MethodDescriptor {
    /// Creates a descriptor from service and method names.
    #[must_use]
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the `Service/Method` rendering used as the registry key.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.service, self.method)
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.method)
    }
}

/// The request side of one unary call.
#[derive(Debug, Clone)]
pub struct UnaryRequest {
    payload: Bytes,
}

impl UnaryRequest {
    /// Wraps an opaque request payload.
    #[must_use]
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Returns the request payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the request, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// The response side of one unary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryResponse {
    payload: Bytes,
}

impl UnaryResponse {
    /// Wraps an opaque response payload.
    #[must_use]
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Returns the response payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the response, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Error returned when inserting into sealed metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("metadata is sealed; transport headers already committed")]
pub struct MetadataSealed;

/// Ordered string pairs attached to a call.
///
/// Insertion order is preserved. Once [`Metadata::seal`] has been called,
/// further inserts fail: the transport seals response metadata at the point
/// it commits headers to the wire, and interceptors must handle the failure.
///
/// # Example
///
/// ```rust
/// use iris_core::Metadata;
///
/// let mut md = Metadata::new();
/// md.insert("x-cache", "hit").unwrap();
/// assert_eq!(md.get("x-cache"), Some("hit"));
///
/// md.seal();
/// assert!(md.insert("x-other", "v").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pairs: Vec<(String, String)>,
    sealed: bool,
}

impl Metadata {
    /// Creates empty, unsealed metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataSealed`] when the metadata has been sealed.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MetadataSealed> {
        if self.sealed {
            return Err(MetadataSealed);
        }
        self.pairs.push((key.into(), value.into()));
        Ok(())
    }

    /// Returns the first value recorded for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Marks the metadata as committed; subsequent inserts fail.
    ///
    /// Sealing is idempotent.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns `true` once [`Metadata::seal`] has been called.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Iterates pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` when no pairs have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
