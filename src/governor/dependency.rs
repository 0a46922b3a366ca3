//! One governed dependency: bulkhead, breaker and retry policy.
//!
//! # Responsibilities
//! - Compose the resilience primitives into a single governed call
//! - Clamp queue waits and attempt timeouts to the caller's deadline budget
//! - Record exactly one breaker outcome per call
//!
//! # Design Decisions
//! - The breaker is peeked before queueing so an open circuit never holds
//!   callers in the bulkhead queue
//! - The half-open trial is claimed only after a slot is held; a trial that
//!   ends in cancellation or rejection is handed back, not failed. Dropping
//!   the call future hands it back too
//! - A terminal 4xx counts as a healthy answer

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::Instrument;

use crate::config::{DependencyConfig, RetryConfig};
use crate::error::{default_should_retry, is_abort_error, GovernorError, GovernorResult};
use crate::observability::metrics;
use crate::resilience::{
    with_retry, Admission, AttemptTimeout, BreakerSnapshot, Bulkhead, CircuitBreaker,
    DeadlineBudget, RetryOptions, RetryPredicate, Signal,
};

/// Per-call inputs for [`Dependency::call`].
#[derive(Clone, Copy, Default)]
pub struct CallOptions<'a> {
    /// Shared deadline across every dependency touched by one request.
    pub budget: Option<&'a DeadlineBudget>,
    /// Caller cancellation.
    pub signal: Option<&'a Signal>,
    /// Overrides the default retry predicate.
    pub should_retry: Option<&'a RetryPredicate>,
    /// Correlates log events for one request.
    pub request_id: Option<&'a str>,
}

impl<'a> CallOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn budget(mut self, budget: &'a DeadlineBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn signal(mut self, signal: &'a Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn should_retry(mut self, predicate: &'a RetryPredicate) -> Self {
        self.should_retry = Some(predicate);
        self
    }

    pub fn request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Point-in-time view of a dependency, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySnapshot {
    pub name: String,
    pub capacity: usize,
    pub in_flight: usize,
    pub breaker: BreakerSnapshot,
}

/// A named dependency class with its own limits.
#[derive(Debug)]
pub struct Dependency {
    name: Arc<str>,
    config: DependencyConfig,
    bulkhead: Bulkhead,
    breaker: CircuitBreaker,
}

impl Dependency {
    pub fn new(name: impl Into<Arc<str>>, config: DependencyConfig) -> Self {
        let name = name.into();
        tracing::debug!(
            dependency = %name,
            capacity = config.capacity,
            queue_timeout_ms = config.queue_timeout_ms,
            request_timeout_ms = config.request_timeout_ms,
            "Dependency registered"
        );
        Self {
            bulkhead: Bulkhead::new(name.clone(), config.capacity),
            breaker: CircuitBreaker::new(name.clone(), config.breaker.clone()),
            name,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DependencyConfig {
        &self.config
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.config.retry
    }

    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn snapshot(&self) -> DependencySnapshot {
        DependencySnapshot {
            name: self.name.to_string(),
            capacity: self.bulkhead.capacity(),
            in_flight: self.bulkhead.in_flight(),
            breaker: self.breaker.snapshot(),
        }
    }

    /// Run `transport` under this dependency's governance.
    ///
    /// `transport` is invoked once per attempt with the attempt's combined
    /// cancellation token. Admission failures come back as typed errors
    /// without `transport` ever running.
    pub async fn call<T, F, Fut>(&self, options: CallOptions<'_>, transport: F) -> GovernorResult<T>
    where
        F: FnMut(Signal) -> Fut,
        Fut: Future<Output = GovernorResult<T>>,
    {
        let span = tracing::info_span!(
            "governed_call",
            dependency = %self.name,
            request_id = options.request_id.unwrap_or("-"),
        );
        let start = std::time::Instant::now();

        let result = self.govern(options, transport).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(error) => error.kind(),
        };
        metrics::record_call(&self.name, outcome, start);
        result
    }

    async fn govern<T, F, Fut>(&self, options: CallOptions<'_>, mut transport: F) -> GovernorResult<T>
    where
        F: FnMut(Signal) -> Fut,
        Fut: Future<Output = GovernorResult<T>>,
    {
        if options.signal.is_some_and(Signal::is_cancelled) {
            return Err(GovernorError::Aborted);
        }
        if self.breaker.is_rejecting() {
            tracing::debug!("Circuit open, rejecting before queueing");
            return Err(self.circuit_open());
        }
        if options.budget.is_some_and(DeadlineBudget::is_exhausted) {
            tracing::debug!("Deadline budget spent before admission");
            return Err(GovernorError::BudgetExhausted);
        }

        let queue_wait = clamp(options.budget, self.config.queue_timeout());
        let mut permit = self.bulkhead.acquire(queue_wait, options.signal).await?;

        // Re-checked with the slot held; this may claim the half-open trial
        let Some(admission) = self.breaker.admit() else {
            tracing::debug!("Circuit open after queueing, rejecting");
            return Err(self.circuit_open());
        };
        let admission = AdmissionGuard::new(&self.breaker, admission);

        let request_timeout = self.config.request_timeout();
        let retry = RetryOptions::new(self.config.retry)
            .should_retry(options.should_retry.unwrap_or(&default_should_retry))
            .signal(options.signal)
            .budget(options.budget)
            .label(&self.name);

        let result = with_retry(
            |attempt| {
                let timeout = clamp(options.budget, request_timeout);
                let prepared = if timeout.is_zero() {
                    None
                } else {
                    let guard = AttemptTimeout::new(timeout, options.signal);
                    let future = transport(guard.signal().clone());
                    Some((guard, future))
                };

                async move {
                    match prepared {
                        Some((guard, future)) => {
                            tracing::debug!(
                                attempt,
                                timeout_ms = timeout.as_millis() as u64,
                                "Attempt started"
                            );
                            guard.run(future).await
                        }
                        None => Err(GovernorError::BudgetExhausted),
                    }
                }
            },
            retry,
        )
        .await;

        self.record_outcome(&result, admission);
        permit.release();
        result
    }

    fn record_outcome<T>(&self, result: &GovernorResult<T>, admission: AdmissionGuard<'_>) {
        match result {
            Ok(_) => admission.settle(true),
            Err(error) if error.is_dependency_failure() => {
                tracing::warn!(error = %error, "Dependency call failed");
                admission.settle(false);
            }
            Err(error) if is_abort_error(error) || error.is_admission_rejection() => {
                tracing::debug!(error = %error, "Call ended without a dependency verdict");
                drop(admission);
            }
            // Terminal 4xx: the dependency answered
            Err(error) => {
                tracing::debug!(error = %error, "Dependency rejected the request");
                admission.settle(true);
            }
        }
    }

    fn circuit_open(&self) -> GovernorError {
        metrics::record_breaker_rejection(&self.name);
        GovernorError::CircuitOpen {
            dependency: self.name.to_string(),
        }
    }
}

/// A breaker admission held for the length of one call.
///
/// Dropped without a verdict, a half-open trial is handed back to the
/// breaker. This covers callers that drop the call future mid-flight.
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl<'a> AdmissionGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            admission,
            settled: false,
        }
    }

    fn settle(mut self, healthy: bool) {
        self.settled = true;
        self.breaker.record(self.admission, healthy);
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            tracing::debug!(dependency = %self.breaker.name(), "Half-open trial handed back");
            self.breaker.abandon_trial();
        }
    }
}

fn clamp(budget: Option<&DeadlineBudget>, requested: Duration) -> Duration {
    budget.map_or(requested, |budget| budget.ms_for(requested))
}
