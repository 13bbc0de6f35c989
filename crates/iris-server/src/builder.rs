//! Deferred-validation server builder.
//!
//! Configuration calls never fail individually. Invalid input is recorded in
//! an error list and every later configuration call (except
//! [`ServerBuilder::with_reflection`]) becomes a side-effect-free no-op, so
//! callers can chain the whole surface fluently and handle one failure at
//! [`ServerBuilder::build`]. The build failure is deliberately generic; the
//! individual causes are logged at error severity through the injected log
//! handle.
//!
//! # Example
//!
//! ```ignore
//! use iris_server::{CacheConfig, ServerBuilder};
//!
//! let server = ServerBuilder::new(50051, log)
//!     .with_rate_limiter(Some(limiter))
//!     .with_response_cache(CacheConfig::new(cache, key_fn, ttl))
//!     .with_metrics(9090, registry)
//!     .with_reflection()
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use iris_core::LogHandle;
use iris_interceptor::stages::{
    CacheInterceptor, CacheStageError, MetricsInterceptor, RateLimitInterceptor, RateLimiter,
};
use iris_interceptor::{
    BoxedStreamInterceptor, BoxedUnaryInterceptor, InterceptorChain, KeyFn, KeyValueCache,
};
use iris_telemetry::MetricsRegistry;
use thiserror::Error;

use crate::engine::RpcEngine;
use crate::server::Server;

/// Lowest valid TCP port.
const PORT_MIN: u32 = 1;

/// Highest valid TCP port.
const PORT_MAX: u32 = 65535;

/// Configuration mistakes recorded by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// RPC port below the valid range.
    #[error("rpc port {0} is below the minimum of {PORT_MIN}")]
    RpcPortBelowMin(u32),

    /// RPC port above the valid range.
    #[error("rpc port {0} is above the maximum of {PORT_MAX}")]
    RpcPortAboveMax(u32),

    /// Metrics HTTP port below the valid range.
    #[error("metrics http port {0} is below the minimum of {PORT_MIN}")]
    HttpPortBelowMin(u32),

    /// Metrics HTTP port above the valid range.
    #[error("metrics http port {0} is above the maximum of {PORT_MAX}")]
    HttpPortAboveMax(u32),

    /// The injected log handle is disabled.
    #[error("no log handle provided")]
    LoggerMissing,

    /// `with_rate_limiter` received no limiter.
    #[error("no rate limiter provided")]
    LimiterMissing,

    /// `with_response_cache` received no cache implementation.
    #[error("no cache implementation provided")]
    CacheMissing,
}

/// The single failure surfaced by [`ServerBuilder::build`].
///
/// Deliberately carries no detail: the individual [`ConfigError`]s are
/// observable through the injected log only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    /// One or more configuration calls were rejected.
    #[error("could not build server")]
    CouldNotBuild,
}

/// Settings for the response cache stage.
pub struct CacheConfig {
    /// Storage collaborator. `None` is a recorded configuration error.
    pub cache: Option<Arc<dyn KeyValueCache>>,

    /// Cache key derivation.
    pub key_fn: KeyFn,

    /// Entry lifetime.
    pub ttl: Duration,
}

impl CacheConfig {
    /// Creates a config around a cache implementation.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>, key_fn: KeyFn, ttl: Duration) -> Self {
        Self {
            cache: Some(cache),
            key_fn,
            ttl,
        }
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("cache", &self.cache.is_some())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Fluent, deferred-validation server construction.
///
/// Interceptor stages land on the chain in the order their configuration
/// calls run; the chain preserves that order exactly.
pub struct ServerBuilder {
    errors: Vec<ConfigError>,
    rpc_port: u16,
    http_port: Option<u16>,
    reflection_enabled: bool,
    metrics: Option<MetricsRegistry>,
    unary: Vec<BoxedUnaryInterceptor>,
    stream: Vec<BoxedStreamInterceptor>,
    log: LogHandle,
}

impl ServerBuilder {
    /// Starts a builder for a server on `rpc_port`.
    ///
    /// The port and the log handle are validated immediately; failures are
    /// recorded, not returned.
    #[must_use]
    pub fn new(rpc_port: u32, log: LogHandle) -> Self {
        let mut errors = Vec::new();

        let rpc_port = match validate_port(
            rpc_port,
            ConfigError::RpcPortBelowMin,
            ConfigError::RpcPortAboveMax,
        ) {
            Ok(port) => port,
            Err(e) => {
                errors.push(e);
                0
            }
        };

        if log.is_none() {
            errors.push(ConfigError::LoggerMissing);
        }

        Self {
            errors,
            rpc_port,
            http_port: None,
            reflection_enabled: false,
            metrics: None,
            unary: Vec::new(),
            stream: Vec::new(),
            log,
        }
    }

    /// Appends the rate-limit stage for unary calls and streams.
    ///
    /// `None` records [`ConfigError::LimiterMissing`]. No-op once an earlier
    /// error was recorded.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<dyn RateLimiter>>) -> Self {
        if !self.errors.is_empty() {
            return self;
        }

        match limiter {
            Some(limiter) => {
                let stage = Arc::new(RateLimitInterceptor::new(limiter));
                self.unary.push(Arc::clone(&stage) as BoxedUnaryInterceptor);
                self.stream.push(stage as BoxedStreamInterceptor);
            }
            None => self.errors.push(ConfigError::LimiterMissing),
        }
        self
    }

    /// Appends the response cache stage for unary calls.
    ///
    /// Streaming response caching is unsupported: the stream side of the
    /// chain is deliberately left untouched. No-op once an earlier error was
    /// recorded.
    #[must_use]
    pub fn with_response_cache(mut self, config: CacheConfig) -> Self {
        if !self.errors.is_empty() {
            return self;
        }

        match CacheInterceptor::new(config.cache, config.key_fn, config.ttl, self.log.clone()) {
            Ok(stage) => self.unary.push(Arc::new(stage) as BoxedUnaryInterceptor),
            Err(CacheStageError::CacheMissing) => self.errors.push(ConfigError::CacheMissing),
            Err(CacheStageError::LoggerMissing) => self.errors.push(ConfigError::LoggerMissing),
        }
        self
    }

    /// Appends the metrics stage for unary calls and streams and enables the
    /// metrics listener on `http_port`.
    ///
    /// Registers the call-handling metric descriptions immediately. No-op
    /// once an earlier error was recorded.
    #[must_use]
    pub fn with_metrics(mut self, http_port: u32, registry: MetricsRegistry) -> Self {
        if !self.errors.is_empty() {
            return self;
        }

        match validate_port(
            http_port,
            ConfigError::HttpPortBelowMin,
            ConfigError::HttpPortAboveMax,
        ) {
            Ok(port) => {
                iris_telemetry::describe_call_metrics();
                let stage = Arc::new(MetricsInterceptor::new());
                self.unary.push(Arc::clone(&stage) as BoxedUnaryInterceptor);
                self.stream.push(stage as BoxedStreamInterceptor);
                self.http_port = Some(port);
                self.metrics = Some(registry);
            }
            Err(e) => self.errors.push(e),
        }
        self
    }

    /// Enables service reflection.
    ///
    /// Unconditional: applies even after earlier errors and never errors
    /// itself.
    #[must_use]
    pub fn with_reflection(mut self) -> Self {
        self.reflection_enabled = true;
        self
    }

    /// Returns the configuration errors recorded so far.
    #[must_use]
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    /// Builds the immutable [`Server`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CouldNotBuild`] when any configuration call was
    /// rejected, after logging each recorded cause at error severity.
    pub fn build(self) -> Result<Server, BuildError> {
        if !self.errors.is_empty() {
            for error in &self.errors {
                tracing::error!(parent: self.log.span(), error = %error, "server configuration rejected");
            }
            return Err(BuildError::CouldNotBuild);
        }

        let chain = InterceptorChain::new(self.unary, self.stream);
        let engine = RpcEngine::new(chain, self.reflection_enabled, self.log.clone());

        Ok(Server::new(
            engine,
            self.rpc_port,
            self.http_port,
            self.metrics,
            self.log,
        ))
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("errors", &self.errors)
            .field("rpc_port", &self.rpc_port)
            .field("http_port", &self.http_port)
            .field("reflection_enabled", &self.reflection_enabled)
            .field("unary_stages", &self.unary.len())
            .field("stream_stages", &self.stream.len())
            .finish_non_exhaustive()
    }
}

fn validate_port(
    port: u32,
    below: fn(u32) -> ConfigError,
    above: fn(u32) -> ConfigError,
) -> Result<u16, ConfigError> {
    if port < PORT_MIN {
        Err(below(port))
    } else if port > PORT_MAX {
        Err(above(port))
    } else {
        // Bounded by PORT_MAX above.
        Ok(u16::try_from(port).unwrap_or(u16::MAX))
    }
}
