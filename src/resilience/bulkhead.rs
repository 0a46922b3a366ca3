//! Bulkhead: bounded concurrency per dependency class.
//!
//! # Responsibilities
//! - Cap in-flight calls to one dependency
//! - Queue excess callers FIFO, each with its own wait timeout and signal
//! - Hand back a permit that frees the slot on every exit path
//!
//! # Design Decisions
//! - Backed by `tokio::sync::Semaphore`, which is fair: waiters are served in
//!   arrival order and a waiter that gives up leaves the queue without taking
//!   a permit
//! - Capacity exhaustion alone never errors; only the wait timeout, the
//!   caller's signal or `close()` end a wait

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{GovernorError, GovernorResult};
use crate::observability::metrics;
use crate::resilience::signal::Signal;

/// A concurrency limiter for one dependency class.
#[derive(Debug)]
pub struct Bulkhead {
    name: Arc<str>,
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl Bulkhead {
    /// Create a bulkhead admitting `capacity` concurrent holders.
    pub fn new(name: impl Into<Arc<str>>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Wait for a slot.
    ///
    /// Fails with `QueueTimeout` if none frees up within `wait`, `Aborted` if
    /// `signal` fires first, and `BulkheadClosed` after [`Bulkhead::close`].
    /// A zero `wait` takes a free slot or fails immediately.
    pub async fn acquire(
        &self,
        wait: Duration,
        signal: Option<&Signal>,
    ) -> GovernorResult<BulkheadPermit> {
        if signal.is_some_and(Signal::is_cancelled) {
            return Err(GovernorError::Aborted);
        }

        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(self.closed()),
            Err(TryAcquireError::NoPermits) if wait.is_zero() => {
                return Err(self.queue_timeout(wait));
            }
            Err(TryAcquireError::NoPermits) => {
                tracing::debug!(
                    dependency = %self.name,
                    capacity = self.capacity,
                    wait_ms = wait.as_millis() as u64,
                    "Bulkhead full, queueing"
                );

                let cancelled = async {
                    match signal {
                        Some(signal) => signal.cancelled().await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    acquired = self.permits.clone().acquire_owned() => match acquired {
                        Ok(permit) => permit,
                        Err(_) => return Err(self.closed()),
                    },
                    _ = tokio::time::sleep(wait) => return Err(self.queue_timeout(wait)),
                    _ = cancelled => {
                        metrics::record_bulkhead_rejection(&self.name, "cancelled");
                        return Err(GovernorError::Aborted);
                    }
                }
            }
        };

        metrics::record_bulkhead_in_flight(&self.name, self.in_flight());
        Ok(BulkheadPermit {
            permit: Some(permit),
            name: self.name.clone(),
            capacity: self.capacity,
            permits: self.permits.clone(),
        })
    }

    /// Reject every current and future waiter. Held permits stay valid.
    pub fn close(&self) {
        self.permits.close();
        tracing::info!(dependency = %self.name, "Bulkhead closed");
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    fn queue_timeout(&self, wait: Duration) -> GovernorError {
        tracing::warn!(
            dependency = %self.name,
            in_flight = self.in_flight(),
            wait_ms = wait.as_millis() as u64,
            "Bulkhead queue wait timed out"
        );
        metrics::record_bulkhead_rejection(&self.name, "queue_timeout");
        GovernorError::QueueTimeout {
            dependency: self.name.to_string(),
            waited_ms: wait.as_millis() as u64,
        }
    }

    fn closed(&self) -> GovernorError {
        metrics::record_bulkhead_rejection(&self.name, "closed");
        GovernorError::BulkheadClosed {
            dependency: self.name.to_string(),
        }
    }
}

/// A held bulkhead slot.
///
/// Released by [`BulkheadPermit::release`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct BulkheadPermit {
    permit: Option<OwnedSemaphorePermit>,
    name: Arc<str>,
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl BulkheadPermit {
    /// Free the slot, handing it to the next queued waiter. Idempotent.
    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            let in_flight = self.capacity.saturating_sub(self.permits.available_permits());
            metrics::record_bulkhead_in_flight(&self.name, in_flight);
        }
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.release();
    }
}
