//! Interceptor chain and built-in stages for the Iris RPC server framework.
//!
//! An interceptor wraps call processing with cross-cutting behavior: it sees
//! the request before the handler and the response after. Stages compose
//! into an ordered [`InterceptorChain`] assembled once by the server builder;
//! the first appended stage runs outermost.
//!
//! Built-in stages:
//!
//! - [`stages::RateLimitInterceptor`]: admission control via an injected
//!   [`RateLimiter`](stages::RateLimiter)
//! - [`stages::CacheInterceptor`]: unary response caching over an injected
//!   [`KeyValueCache`] (no streaming variant)
//! - [`stages::MetricsInterceptor`]: call count, latency and in-flight
//!   instrumentation

pub mod cache;
pub mod chain;
pub mod interceptor;
pub mod memory;
pub mod stages;

pub use cache::{CacheError, KeyFn, KeyValueCache};
pub use chain::{BoxedStreamInterceptor, BoxedUnaryInterceptor, InterceptorChain};
pub use interceptor::{
    BoxFuture, StreamInterceptor, StreamNext, StreamResult, UnaryInterceptor, UnaryNext,
};
pub use memory::MemoryCache;
