//! Prometheus metrics registry and recording helpers.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `iris_calls_total` | Counter | `method`, `code` | Total calls handled |
//! | `iris_call_duration_seconds` | Histogram | `method` | Call handling latency |
//! | `iris_in_flight_calls` | Gauge | - | Calls currently in flight |
//!
//! # Example
//!
//! ```rust,ignore
//! use iris_telemetry::{record_call, MetricsRegistry};
//! use std::time::Duration;
//!
//! let registry = MetricsRegistry::install()?;
//! record_call("Echo/Say", "OK", Duration::from_millis(4));
//! let text = registry.render();
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Counter of calls handled, labeled by method and status code.
pub const CALLS_TOTAL: &str = "iris_calls_total";

/// Histogram of call handling latency in seconds, labeled by method.
pub const CALL_DURATION_SECONDS: &str = "iris_call_duration_seconds";

/// Gauge of calls currently being handled.
pub const IN_FLIGHT_CALLS: &str = "iris_in_flight_calls";

/// Process-wide recorder handle. The `metrics` crate allows exactly one
/// global recorder, so installation is memoized.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Handle to the installed Prometheus recorder.
///
/// Cloneable; every clone renders the same process-wide recorder. The server
/// facade keeps one and renders it from the metrics listener.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Installs the Prometheus recorder, or attaches to the one already
    /// installed by a previous call.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::RecorderInstall`] when a foreign recorder
    /// occupies the global slot.
    pub fn install() -> TelemetryResult<Self> {
        if let Some(handle) = METRICS_HANDLE.get() {
            return Ok(Self {
                handle: handle.clone(),
            });
        }
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
                Ok(Self { handle })
            }
            // A concurrent install may have won the race; attach to it.
            Err(e) => match METRICS_HANDLE.get() {
                Some(handle) => Ok(Self {
                    handle: handle.clone(),
                }),
                None => Err(TelemetryError::RecorderInstall(e.to_string())),
            },
        }
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Registers descriptions for the call-handling metrics.
///
/// Idempotent; the builder invokes this when metrics are configured.
pub fn describe_call_metrics() {
    describe_counter!(CALLS_TOTAL, "Total number of RPC calls handled");
    describe_histogram!(
        CALL_DURATION_SECONDS,
        "RPC call handling duration in seconds"
    );
    describe_gauge!(IN_FLIGHT_CALLS, "Number of RPC calls currently in flight");
}

/// Records a completed call.
///
/// Increments `iris_calls_total` and observes the duration on
/// `iris_call_duration_seconds`.
pub fn record_call(method: &str, code: &str, duration: Duration) {
    counter!(
        CALLS_TOTAL,
        "method" => method.to_string(),
        "code" => code.to_string()
    )
    .increment(1);

    histogram!(
        CALL_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Guard that tracks one in-flight call.
///
/// Increments the gauge on creation and decrements it on drop, so the count
/// stays balanced on every exit path.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_CALLS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_CALLS).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        let a = MetricsRegistry::install().unwrap();
        let b = MetricsRegistry::install().unwrap();

        record_call("Echo/Say", "OK", Duration::from_millis(5));
        // Both handles render the same recorder.
        assert!(a.render().contains(CALLS_TOTAL));
        assert!(b.render().contains(CALLS_TOTAL));
    }

    #[test]
    fn test_record_call_labels() {
        let registry = MetricsRegistry::install().unwrap();
        record_call("Users/Get", "NOT_FOUND", Duration::from_millis(2));

        let text = registry.render();
        assert!(text.contains("method=\"Users/Get\""));
        assert!(text.contains("code=\"NOT_FOUND\""));
    }

    #[test]
    fn test_in_flight_guard_balances() {
        let _registry = MetricsRegistry::install().unwrap();
        {
            let _guard = InFlightGuard::new();
        }
        // No panic; recording without a fresh recorder is a no-op at worst.
        describe_call_metrics();
    }
}
