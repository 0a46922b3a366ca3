//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: one trial request tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first admission check after the cooldown
//! Half-Open → Closed: trial succeeds (late results of normal calls are ignored)
//! Half-Open → Open: trial fails (cooldown restarts, optionally grown)
//! Half-Open → Open (cooldown kept): trial abandoned by its caller
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering a recovering dependency)
//! - All transitions happen under one mutex, so concurrent admission checks
//!   cannot both win the trial

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of a breaker, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub cooldown_ms: u64,
}

/// How a call got past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed.
    Normal,
    /// The single half-open trial call.
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    cooldown: Duration,
}

/// A three-state failure isolation machine for one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<Arc<str>>, config: BreakerConfig) -> Self {
        let name = name.into();
        tracing::debug!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            cooldown_ms = config.cooldown_ms,
            "Circuit breaker initialized"
        );
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                cooldown: config.cooldown(),
            }),
            name,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Admission check.
    ///
    /// Once the cooldown has elapsed, exactly one caller gets `true` and the
    /// breaker moves to half-open; everyone else keeps getting `false` until
    /// that trial is recorded.
    pub fn can_request(&self) -> bool {
        self.admit().is_some()
    }

    /// [`CircuitBreaker::can_request`] that also reports whether the caller
    /// now holds the half-open trial.
    pub fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Some(Admission::Normal),
            BreakerState::HalfOpen => None,
            BreakerState::Open => {
                if Self::cooldown_elapsed(&inner) {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
        }
    }

    /// Whether [`CircuitBreaker::can_request`] would currently refuse.
    ///
    /// Does not claim the half-open trial.
    pub fn is_rejecting(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            BreakerState::Closed => false,
            BreakerState::HalfOpen => true,
            BreakerState::Open => !Self::cooldown_elapsed(&inner),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.succeed(&mut inner);
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.fail(&mut inner);
    }

    /// Record the verdict of a call granted `admission`.
    ///
    /// While half-open only the trial's verdict moves the breaker; a result
    /// from a call admitted before the breaker opened is dropped.
    pub fn record(&self, admission: Admission, healthy: bool) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen && admission == Admission::Normal {
            tracing::debug!(
                dependency = %self.name,
                healthy,
                "Late result while half-open, ignoring"
            );
            return;
        }
        if healthy {
            self.succeed(&mut inner);
        } else {
            self.fail(&mut inner);
        }
    }

    /// Give back a half-open trial whose caller cancelled.
    ///
    /// The cooldown is not restarted, so the next admission check may start
    /// a new trial straight away.
    pub fn abandon_trial(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            self.transition(&mut inner, BreakerState::Open);
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            cooldown_ms: inner.cooldown.as_millis() as u64,
        }
    }

    fn succeed(&self, inner: &mut BreakerInner) {
        match inner.state {
            BreakerState::Closed => inner.failure_count = 0,
            BreakerState::HalfOpen => {
                inner.failure_count = 0;
                inner.opened_at = None;
                inner.cooldown = self.config.cooldown();
                self.transition(inner, BreakerState::Closed);
            }
            BreakerState::Open => {
                // Late result from a call admitted before the breaker opened
                tracing::debug!(dependency = %self.name, "Success recorded while open, ignoring");
            }
        }
    }

    fn fail(&self, inner: &mut BreakerInner) {
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    inner.opened_at = Some(Instant::now());
                    inner.cooldown = self.config.cooldown();
                    self.transition(inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.opened_at = Some(Instant::now());
                inner.cooldown = self.config.next_cooldown(inner.cooldown);
                self.transition(inner, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    fn cooldown_elapsed(inner: &BreakerInner) -> bool {
        match inner.opened_at {
            Some(opened_at) => opened_at.elapsed() >= inner.cooldown,
            None => true,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        metrics::record_breaker_state(&self.name, to);

        match to {
            BreakerState::Open => tracing::warn!(
                dependency = %self.name,
                from = from.as_str(),
                failure_count = inner.failure_count,
                cooldown_ms = inner.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            ),
            BreakerState::HalfOpen => tracing::info!(
                dependency = %self.name,
                "Circuit breaker half-open, admitting trial request"
            ),
            BreakerState::Closed => tracing::info!(
                dependency = %self.name,
                "Circuit breaker closed (recovered)"
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
