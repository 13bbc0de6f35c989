//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up or serving metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the Prometheus recorder.
    #[error("failed to install metrics recorder: {0}")]
    RecorderInstall(String),

    /// IO error from the exposition surface.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::RecorderInstall("already set".to_string());
        assert_eq!(
            err.to_string(),
            "failed to install metrics recorder: already set"
        );
    }
}
