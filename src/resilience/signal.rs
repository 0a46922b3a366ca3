//! Cancellation tokens and their composition.
//!
//! # Responsibilities
//! - Caller-owned tokens that fire exactly once
//! - Timeout tokens backed by a single tokio timer
//! - Combining N tokens into one that fires when any input fires
//!
//! # Design Decisions
//! - A token records *why* it fired; a combined token inherits the reason of
//!   the input that fired first, so a local timeout is never confused with
//!   the caller walking away
//! - Composition registers listeners on the inputs; `cleanup()` (or drop)
//!   removes them, and dropping a timeout token aborts its timer

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Why a token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled.
    Caller,
    /// A timeout token elapsed.
    Timeout,
}

type Listener = Box<dyn FnOnce(CancelReason) + Send>;

struct Inner {
    reason: OnceLock<CancelReason>,
    notify: Notify,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

/// A cancellation token. Cloning shares the same underlying token.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    /// Create a token that only fires through [`Signal::cancel`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                reason: OnceLock::new(),
                notify: Notify::new(),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a token that fires after `after`.
    ///
    /// A zero duration yields a token that has already fired; no timer is
    /// started.
    pub fn timeout(after: Duration) -> TimeoutSignal {
        let signal = Signal::new();
        let timer = if after.is_zero() {
            signal.cancel_with(CancelReason::Timeout);
            None
        } else {
            let timer_signal = signal.clone();
            Some(tokio::spawn(async move {
                tokio::time::sleep(after).await;
                timer_signal.cancel_with(CancelReason::Timeout);
            }))
        };
        TimeoutSignal {
            signal,
            after,
            timer,
        }
    }

    /// Fire the token on behalf of the caller.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Caller);
    }

    /// Fire the token. Returns false if it had already fired.
    pub(crate) fn cancel_with(&self, reason: CancelReason) -> bool {
        if self.inner.reason.set(reason).is_err() {
            return false;
        }

        let listeners = {
            let mut guard = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        self.inner.notify.notify_waiters();

        for (_, listener) in listeners {
            listener(reason);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The reason this token fired, if it has.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Wait until the token fires.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run `listener` once when the token fires.
    ///
    /// Runs immediately (and returns `None`) if the token already fired.
    fn on_cancel(&self, listener: Listener) -> Option<u64> {
        let mut guard = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(reason) = self.reason() {
            drop(guard);
            listener(reason);
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        guard.push((id, listener));
        Some(id)
    }

    fn remove_listener(&self, id: u64) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("reason", &self.reason())
            .finish()
    }
}

/// A token that fires after a fixed duration.
///
/// Dropping it (or calling [`TimeoutSignal::cleanup`]) cancels the timer.
#[derive(Debug)]
pub struct TimeoutSignal {
    signal: Signal,
    after: Duration,
    timer: Option<JoinHandle<()>>,
}

impl TimeoutSignal {
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn after(&self) -> Duration {
        self.after
    }

    /// Whether this timeout is what fired the token.
    pub fn fired(&self) -> bool {
        self.signal.reason() == Some(CancelReason::Timeout)
    }

    /// Stop the timer. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for TimeoutSignal {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// A token that fires when any of its inputs fires.
#[derive(Debug)]
pub struct CombinedSignal {
    signal: Signal,
    registrations: Vec<(Signal, u64)>,
}

impl CombinedSignal {
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// Detach from every input. Idempotent.
    pub fn cleanup(&mut self) {
        for (input, id) in self.registrations.drain(..) {
            input.remove_listener(id);
        }
    }
}

impl Drop for CombinedSignal {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Merge `inputs` into one token.
///
/// The result fires as soon as any input fires and carries that input's
/// reason. An input that has already fired fires the result immediately.
pub fn combine(inputs: &[&Signal]) -> CombinedSignal {
    let signal = Signal::new();
    let mut registrations = Vec::with_capacity(inputs.len());

    for input in inputs {
        if signal.is_cancelled() {
            break;
        }
        let target = Arc::downgrade(&signal.inner);
        let listener: Listener = Box::new(move |reason| {
            if let Some(target) = Signal::from_weak(&target) {
                target.cancel_with(reason);
            }
        });
        if let Some(id) = input.on_cancel(listener) {
            registrations.push(((*input).clone(), id));
        }
    }

    CombinedSignal {
        signal,
        registrations,
    }
}
