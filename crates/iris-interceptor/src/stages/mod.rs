//! Built-in interceptor stages.
//!
//! Three stages ship with Iris: rate limiting ([`RateLimitInterceptor`]),
//! response caching ([`CacheInterceptor`], unary only) and metrics
//! ([`MetricsInterceptor`]). The server builder appends them in the order it
//! is told to; the chain preserves that order exactly.

pub mod cache;
pub mod metrics;
pub mod rate_limit;

pub use cache::{CacheInterceptor, CacheStageError, CACHE_HIT_HEADER, CACHE_HIT_VALUE};
pub use metrics::MetricsInterceptor;
pub use rate_limit::{LimitExceeded, RateLimitInterceptor, RateLimiter};
