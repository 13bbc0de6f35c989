//! Core call types for the Iris RPC server framework.
//!
//! This crate defines the vocabulary shared by every other Iris crate:
//!
//! - [`MethodDescriptor`], [`UnaryRequest`], [`UnaryResponse`] and
//!   [`Metadata`]: the unary call model with opaque byte payloads
//! - [`CallContext`]: the mutable per-call state that flows through the
//!   interceptor chain
//! - [`CallError`]: the status-coded error that traverses the chain
//!   unchanged from handler to caller
//! - [`HandlerRegistry`]: type-erased async handlers keyed by method name
//! - [`LogHandle`]: the explicitly injected logging handle
//!
//! Application payloads are opaque [`bytes::Bytes`]; Iris supplies
//! construction and cross-cutting behavior only, never application methods.

pub mod call;
pub mod context;
pub mod error;
pub mod handler;
pub mod log;

pub use call::{Metadata, MetadataSealed, MethodDescriptor, UnaryRequest, UnaryResponse};
pub use context::{CallContext, CallId, CancellationHandle};
pub use error::{CallError, CallResult};
pub use handler::{BoxedCallFuture, HandlerContext, HandlerRegistry, UnaryHandler};
pub use log::LogHandle;
