//! Prometheus metrics for the Iris RPC server framework.
//!
//! The [`MetricsRegistry`] wraps a recorder handle from
//! `metrics-exporter-prometheus`; the server's metrics listener calls
//! [`MetricsRegistry::render`] to produce the exposition text. Recording
//! helpers go through the `metrics` facade, so interceptors never touch the
//! exporter directly.

pub mod error;
pub mod metrics;

pub use error::TelemetryError;
pub use metrics::{
    describe_call_metrics, record_call, InFlightGuard, MetricsRegistry, CALLS_TOTAL,
    CALL_DURATION_SECONDS, IN_FLIGHT_CALLS,
};

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
