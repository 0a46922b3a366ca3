//! Per-attempt timeout enforcement.
//!
//! # Responsibilities
//! - Derive a timeout token for one attempt and combine it with the caller's
//! - Race the attempt against the combined token
//! - Tell a local timeout apart from caller cancellation
//!
//! # Design Decisions
//! - The combined token is handed to the attempt, so transports that watch it
//!   can stop early; the race drops the attempt future either way
//! - Timeout errors are distinct from aborts, even when the transport reports
//!   both the same way
//! - Timer and listeners are released on every exit path (RAII)

use std::future::Future;
use std::time::Duration;

use crate::error::{GovernorError, GovernorResult, TimeoutError};
use crate::resilience::signal::{combine, CancelReason, CombinedSignal, Signal, TimeoutSignal};

/// The timeout and combined token for one attempt.
///
/// Built before the attempt's future so the future can be handed the
/// combined token; [`AttemptTimeout::run`] then races the two.
#[derive(Debug)]
pub struct AttemptTimeout {
    timeout: Duration,
    timer: TimeoutSignal,
    combined: CombinedSignal,
}

impl AttemptTimeout {
    /// Start the attempt's timer and combine it with the caller's `signal`.
    pub fn new(timeout: Duration, signal: Option<&Signal>) -> Self {
        let timer = Signal::timeout(timeout);
        let combined = match signal {
            Some(caller) => combine(&[caller, timer.signal()]),
            None => combine(&[timer.signal()]),
        };
        Self {
            timeout,
            timer,
            combined,
        }
    }

    /// The token the attempt should observe.
    pub fn signal(&self) -> &Signal {
        self.combined.signal()
    }

    /// Whether the local timeout fired.
    pub fn timed_out(&self) -> bool {
        self.timer.fired() && self.signal().reason() == Some(CancelReason::Timeout)
    }

    /// Race `attempt` against the combined token and classify the outcome.
    pub async fn run<T, Fut>(self, attempt: Fut) -> GovernorResult<T>
    where
        Fut: Future<Output = GovernorResult<T>>,
    {
        let effective = self.signal().clone();
        let result = tokio::select! {
            biased;
            _ = effective.cancelled() => Err(GovernorError::Aborted),
            result = attempt => result,
        };

        match result {
            Err(GovernorError::Aborted) if self.timed_out() => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Attempt timed out");
                Err(TimeoutError {
                    after_ms: self.timeout.as_millis() as u64,
                }
                .into())
            }
            other => other,
        }
    }
}

/// Run `op` with a `timeout`, also observing the caller's `signal`.
///
/// Returns `GovernorError::Timeout` when the local timeout fired first and
/// `GovernorError::Aborted` when the caller's signal did.
pub async fn with_timeout<T, F, Fut>(
    timeout: Duration,
    signal: Option<&Signal>,
    op: F,
) -> GovernorResult<T>
where
    F: FnOnce(Signal) -> Fut,
    Fut: Future<Output = GovernorResult<T>>,
{
    let attempt = AttemptTimeout::new(timeout, signal);
    let future = op(attempt.signal().clone());
    attempt.run(future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_timeout() {
        let result = with_timeout(Duration::from_millis(100), None, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, GovernorError>(7)
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_internal_timeout_wins() {
        let caller = Signal::new();
        let result: GovernorResult<()> =
            with_timeout(Duration::from_millis(50), Some(&caller), |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(TimeoutError { after_ms: 50 }.into()));
        assert!(!caller.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation_wins() {
        let caller = Signal::new();
        let canceller = {
            let caller = caller.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                caller.cancel();
            })
        };

        let result: GovernorResult<()> =
            with_timeout(Duration::from_millis(500), Some(&caller), |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        canceller.await.unwrap();
        assert_eq!(result, Err(GovernorError::Aborted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_abort_reclassified_as_timeout() {
        // A transport that watches the token and reports its own abort
        let result: GovernorResult<()> =
            with_timeout(Duration::from_millis(30), None, |signal| async move {
                signal.cancelled().await;
                Err(GovernorError::Aborted)
            })
            .await;
        assert_eq!(result, Err(TimeoutError { after_ms: 30 }.into()));
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_without_running() {
        let ran = std::sync::atomic::AtomicBool::new(false);
        let result: GovernorResult<()> = with_timeout(Duration::ZERO, None, |_| async {
            ran.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GovernorError::Timeout(_))));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listeners_released() {
        let caller = Signal::new();
        let _ = with_timeout(Duration::from_millis(10), Some(&caller), |_| async {
            Ok::<_, GovernorError>(())
        })
        .await;
        assert_eq!(caller.listener_count(), 0);
    }
}
