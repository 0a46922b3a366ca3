//! Failure taxonomy for governed calls.
//!
//! # Classes
//! - Admission rejection: bulkhead wait expired, bulkhead closed, breaker open,
//!   budget spent. Non-fatal; the caller picks a degraded path.
//! - Transient transport failure: timeout, retryable HTTP status, I/O error.
//! - Terminal transport failure: any other non-2xx status.
//! - Cancellation: the caller no longer wants the result. Never retried and
//!   never counted against the dependency.

use thiserror::Error;

/// The per-attempt timeout fired before the operation finished.
///
/// Raised only when the locally derived timeout token is the one that fired,
/// never when the caller's own signal fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {after_ms} ms")]
pub struct TimeoutError {
    pub after_ms: u64,
}

/// A transport answered with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {message}")]
pub struct HttpError {
    pub status: u16,
    pub message: String,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether this status is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }
}

/// Errors surfaced by the governance layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernorError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Http(#[from] HttpError),

    /// Cancelled by the caller.
    #[error("operation aborted by caller")]
    Aborted,

    /// No bulkhead slot became free within the wait timeout.
    #[error("bulkhead '{dependency}' queue wait timed out after {waited_ms} ms")]
    QueueTimeout { dependency: String, waited_ms: u64 },

    /// The bulkhead was closed while waiting (shutdown).
    #[error("bulkhead '{dependency}' is closed")]
    BulkheadClosed { dependency: String },

    /// The breaker rejected the call without attempting it.
    #[error("circuit breaker '{dependency}' is open")]
    CircuitOpen { dependency: String },

    /// The shared deadline left no time for another attempt.
    #[error("deadline budget exhausted")]
    BudgetExhausted,

    /// The transport failed before producing a response.
    #[error("transport error: {0}")]
    Transport(String),
}

impl GovernorError {
    /// Rejected before any transport work started.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            GovernorError::QueueTimeout { .. }
                | GovernorError::BulkheadClosed { .. }
                | GovernorError::CircuitOpen { .. }
                | GovernorError::BudgetExhausted
        )
    }

    /// Evidence that the dependency itself is unhealthy.
    ///
    /// A 4xx other than 429 means the dependency answered, so it does not
    /// count against the breaker.
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            GovernorError::Timeout(_) | GovernorError::Transport(_) => true,
            GovernorError::Http(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GovernorError::Timeout(_) => "timeout",
            GovernorError::Http(_) => "http_error",
            GovernorError::Aborted => "aborted",
            GovernorError::QueueTimeout { .. } => "queue_timeout",
            GovernorError::BulkheadClosed { .. } => "bulkhead_closed",
            GovernorError::CircuitOpen { .. } => "circuit_open",
            GovernorError::BudgetExhausted => "budget_exhausted",
            GovernorError::Transport(_) => "transport_error",
        }
    }

    /// HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GovernorError::Http(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Result type for governed operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

/// 429 and 5xx are retryable; every other status is terminal.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Identifies caller-initiated cancellation.
pub fn is_abort_error(error: &GovernorError) -> bool {
    matches!(error, GovernorError::Aborted)
}

/// Retry predicate used when the caller supplies none.
pub fn default_should_retry(error: &GovernorError) -> bool {
    match error {
        GovernorError::Timeout(_) | GovernorError::Transport(_) => true,
        GovernorError::Http(e) => e.is_retryable(),
        _ => false,
    }
}
