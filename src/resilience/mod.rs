//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Governed call to a dependency:
//!     → bulkhead.rs (wait for a slot, bounded by timeout and signal)
//!     → circuit_breaker.rs (admission check; fail fast when open)
//!     → deadline.rs (clamp the per-attempt timeout to the remaining budget)
//!     → timeouts.rs + signal.rs (timeout token combined with caller's token)
//!     → On failure: retries.rs (check if retryable, retry with backoff.rs)
//!     → circuit_breaker.rs (record terminal outcome), slot released
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Caller cancellation is never retried and never counted as a failure
//! - Circuit breaker prevents cascading failures
//! - Bulkhead and breaker are the only shared mutable state

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod deadline;
pub mod retries;
pub mod signal;
pub mod timeouts;

pub use backoff::{calculate_backoff, FixedJitter, Jitter, RandomJitter, SeededJitter};
pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{Admission, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use deadline::DeadlineBudget;
pub use retries::{with_retry, with_retry_using, RetryOptions, RetryPredicate};
pub use signal::{combine, CancelReason, CombinedSignal, Signal, TimeoutSignal};
pub use timeouts::{with_timeout, AttemptTimeout};
