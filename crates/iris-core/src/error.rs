//! Call error type.
//!
//! [`CallError`] is the status-coded error that traverses the interceptor
//! chain. Handler failures pass through the chain unchanged; the transport
//! maps the code to a wire status at the very edge.

use http::StatusCode;
use thiserror::Error;

use crate::call::UnaryResponse;

/// Result of one unary call.
pub type CallResult = Result<UnaryResponse, CallError>;

/// Errors surfaced to the caller of an RPC.
///
/// The variants mirror the usual RPC status vocabulary. Interceptors must
/// not rewrite a downstream error; they may only produce their own (for
/// example, [`CallError::ResourceExhausted`] from the rate-limit stage).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The request payload or key material was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No handler is registered for the called method.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Admission was denied (rate limited).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The call ran past its deadline.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The handler or an interceptor failed internally.
    #[error("internal: {0}")]
    Internal(String),

    /// Anything the other variants do not classify.
    #[error("{0}")]
    Unknown(String),
}

impl CallError {
    /// Returns the short machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unimplemented(_) => "UNIMPLEMENTED",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            Self::Internal(_) => "INTERNAL",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// Maps the error to the HTTP status the unary transport reports.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) | Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
