//! Server builder, RPC engine and lifecycle coordinator for Iris.
//!
//! The pieces fit together like this:
//!
//! - [`ServerBuilder`] accumulates configuration with deferred validation
//!   and assembles the ordered interceptor chain; [`ServerBuilder::build`]
//!   either fails with the single generic [`BuildError`] (causes logged) or
//!   produces the immutable [`Server`]
//! - [`RpcEngine`] dispatches one unary call through the chain to the
//!   registered handler
//! - [`TaskGroup`] runs the RPC listener and the optional metrics listener
//!   concurrently with first-exit-interrupts-all semantics
//! - [`ShutdownSignal`] carries stop requests into the listeners
//!
//! # Example
//!
//! ```ignore
//! use iris_core::{LogHandle, UnaryResponse};
//! use iris_server::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ServerBuilder::new(50051, LogHandle::new("iris"))
//!         .with_reflection()
//!         .build()?;
//!
//!     server.handlers_mut().register("Echo/Say", |_ctx, req| async move {
//!         Ok(UnaryResponse::new(req.into_payload()))
//!     });
//!
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod engine;
pub mod runner;
pub mod server;
pub mod shutdown;

pub use builder::{BuildError, CacheConfig, ConfigError, ServerBuilder};
pub use engine::RpcEngine;
pub use runner::{TaskError, TaskGroup};
pub use server::{ServeError, Server};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
