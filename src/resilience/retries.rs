//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a fallible operation under exponential backoff with jitter
//! - Stop on attempt count, budget exhaustion or a non-retryable error
//! - Abort immediately when the caller's signal fires
//!
//! # Design Decisions
//! - Caller cancellation is terminal, whatever the predicate says
//! - A backoff sleep that would outlast the deadline budget is not started
//! - Only the first attempt may report a spent budget; after a real failure
//!   that failure is what the caller sees
//! - Jitter source is injectable so the schedule is testable without sleeps

use std::future::Future;

use crate::config::RetryConfig;
use crate::error::{default_should_retry, is_abort_error, GovernorError, GovernorResult};
use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, Jitter, RandomJitter};
use crate::resilience::deadline::DeadlineBudget;
use crate::resilience::signal::Signal;

/// Decides whether a failed attempt is worth repeating.
pub type RetryPredicate = dyn Fn(&GovernorError) -> bool + Send + Sync;

/// Inputs to one [`with_retry`] invocation.
#[derive(Clone, Copy)]
pub struct RetryOptions<'a> {
    pub config: RetryConfig,
    pub should_retry: &'a RetryPredicate,
    pub signal: Option<&'a Signal>,
    pub budget: Option<&'a DeadlineBudget>,
    /// Name used in logs and metrics.
    pub label: &'a str,
}

impl<'a> RetryOptions<'a> {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: &default_should_retry,
            signal: None,
            budget: None,
            label: "",
        }
    }

    pub fn should_retry(mut self, predicate: &'a RetryPredicate) -> Self {
        self.should_retry = predicate;
        self
    }

    pub fn signal(mut self, signal: Option<&'a Signal>) -> Self {
        self.signal = signal;
        self
    }

    pub fn budget(mut self, budget: Option<&'a DeadlineBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }
}

/// Run `operation` until it succeeds or retrying stops.
///
/// `operation` receives the 1-based attempt number. The last error is
/// returned once attempts, budget or retryability run out.
pub async fn with_retry<T, F, Fut>(operation: F, options: RetryOptions<'_>) -> GovernorResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = GovernorResult<T>>,
{
    with_retry_using(operation, options, &mut RandomJitter).await
}

/// [`with_retry`] with an explicit jitter source.
pub async fn with_retry_using<T, F, Fut, J>(
    mut operation: F,
    options: RetryOptions<'_>,
    jitter: &mut J,
) -> GovernorResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = GovernorResult<T>>,
    J: Jitter,
{
    let max_attempts = options.config.max_attempts.max(1);
    let mut attempt = 0;
    let mut last_error: Option<GovernorError> = None;

    loop {
        attempt += 1;
        if options.signal.is_some_and(Signal::is_cancelled) {
            return Err(GovernorError::Aborted);
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => match last_error.take() {
                Some(previous) if matches!(error, GovernorError::BudgetExhausted) => {
                    return Err(previous)
                }
                _ => error,
            },
        };

        if is_abort_error(&error) || !(options.should_retry)(&error) {
            return Err(error);
        }
        if attempt >= max_attempts {
            tracing::warn!(
                target_dependency = options.label,
                attempts = attempt,
                error = %error,
                "Retries exhausted"
            );
            return Err(error);
        }

        let delay = calculate_backoff(attempt, &options.config, jitter);
        if let Some(budget) = options.budget {
            let remaining = budget.remaining();
            if remaining.is_zero() || remaining <= delay {
                tracing::debug!(
                    target_dependency = options.label,
                    attempt,
                    remaining_ms = remaining.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "Deadline budget too small for another attempt"
                );
                return Err(error);
            }
        }

        tracing::info!(
            target_dependency = options.label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after failure"
        );
        metrics::record_retry(options.label);

        match options.signal {
            Some(signal) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = signal.cancelled() => return Err(GovernorError::Aborted),
                }
            }
            None => tokio::time::sleep(delay).await,
        }

        // Timers overshoot; the sleep may have eaten the rest of the budget
        if options.budget.is_some_and(DeadlineBudget::is_exhausted) {
            tracing::debug!(
                target_dependency = options.label,
                attempt,
                "Deadline budget spent during backoff"
            );
            return Err(error);
        }
        last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HttpError, TimeoutError};
    use crate::resilience::backoff::FixedJitter;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_ratio: 0.0,
        }
    }

    fn unavailable() -> GovernorError {
        HttpError::new(503, "Service Unavailable").into()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let calls = AtomicU32::new(0);
        let result: GovernorResult<()> = with_retry(
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            },
            RetryOptions::new(config(4)),
        )
        .await;

        assert_eq!(result, Err(unavailable()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let result = with_retry(
            |attempt| async move {
                if attempt < 3 {
                    Err(TimeoutError { after_ms: 10 }.into())
                } else {
                    Ok(attempt)
                }
            },
            RetryOptions::new(config(5)),
        )
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: GovernorResult<()> = with_retry(
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HttpError::new(404, "Not Found").into())
            },
            RetryOptions::new(config(5)),
        )
        .await;
        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_never_retried() {
        let calls = AtomicU32::new(0);
        let always = |_: &GovernorError| true;
        let result: GovernorResult<()> = with_retry(
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GovernorError::Aborted)
            },
            RetryOptions::new(config(5)).should_retry(&always),
        )
        .await;
        assert_eq!(result, Err(GovernorError::Aborted));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule() {
        let start = Instant::now();
        let stamps = std::sync::Mutex::new(Vec::new());
        let cfg = RetryConfig {
            jitter_ratio: 0.5,
            ..config(4)
        };

        let _: GovernorResult<()> = with_retry_using(
            |_| async {
                stamps.lock().unwrap().push(start.elapsed());
                Err(unavailable())
            },
            RetryOptions::new(cfg),
            &mut FixedJitter(0.5),
        )
        .await;

        let stamps = stamps.into_inner().unwrap();
        let expected: Vec<_> = [0, 100, 300, 700].into_iter().map(Duration::from_millis).collect();
        assert_eq!(stamps, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep() {
        let signal = Signal::new();
        let calls = AtomicU32::new(0);
        let canceller = {
            let signal = signal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                signal.cancel();
            })
        };

        let start = Instant::now();
        let cfg = RetryConfig {
            base_delay_ms: 1_000,
            ..config(5)
        };
        let result: GovernorResult<()> = with_retry(
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TimeoutError { after_ms: 1 }.into())
            },
            RetryOptions::new(cfg).signal(Some(&signal)),
        )
        .await;
        canceller.await.unwrap();

        // Cancellation, never the attempt's TimeoutError
        assert_eq!(result, Err(GovernorError::Aborted));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_stops_retries() {
        let budget = DeadlineBudget::new(Duration::from_millis(250));
        let calls = AtomicU32::new(0);
        let result: GovernorResult<()> = with_retry(
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            },
            RetryOptions::new(config(10)).budget(Some(&budget)),
        )
        .await;

        // Attempts at 0ms and 100ms; the 200ms sleep would end past the deadline
        assert_eq!(result, Err(unavailable()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spent_budget_on_retry_returns_real_failure() {
        let calls = AtomicU32::new(0);
        let result: GovernorResult<()> = with_retry(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(unavailable())
                    } else {
                        Err(GovernorError::BudgetExhausted)
                    }
                }
            },
            RetryOptions::new(config(5)),
        )
        .await;

        assert_eq!(result, Err(unavailable()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_may_report_spent_budget() {
        let always = |_: &GovernorError| true;
        let result: GovernorResult<()> = with_retry(
            |_| async { Err(GovernorError::BudgetExhausted) },
            RetryOptions::new(config(1)).should_retry(&always),
        )
        .await;
        assert_eq!(result, Err(GovernorError::BudgetExhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let calls = AtomicU32::new(0);
        let only_429 = |e: &GovernorError| e.status() == Some(429);
        let result: GovernorResult<()> = with_retry(
            |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            },
            RetryOptions::new(config(5)).should_retry(&only_429),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
