//! Timers, debouncing and cancellable subscriptions
//!
//! Each process is single-threaded and event driven. Deferred work goes
//! through a [`Scheduler`] (a `setTimeout` in the browser, a manual clock in
//! tests) instead of ad hoc timers scattered through handlers.

use std::rc::Rc;
use std::time::Duration;

/// Host timer facility.
pub trait Scheduler {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>);
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        (**self).schedule(delay, task)
    }
}

// =============================================================================
// Debouncer
// =============================================================================

/// Coalesces a burst of requests into one deferred run.
///
/// The first request of a burst asks the caller to arm a timer; requests
/// arriving before the timer fires are absorbed.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: bool,
    coalesced: u32,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: false,
            coalesced: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record a request. Returns the delay to arm a timer with when no run
    /// is pending yet, `None` when the request joined a pending run.
    pub fn request(&mut self) -> Option<Duration> {
        self.coalesced += 1;
        if self.pending {
            return None;
        }
        self.pending = true;
        Some(self.delay)
    }

    /// The armed timer fired. Returns how many requests the run covers, or 0
    /// if nothing was pending.
    pub fn fire(&mut self) -> u32 {
        if !self.pending {
            return 0;
        }
        self.pending = false;
        std::mem::take(&mut self.coalesced)
    }

    /// Drop the pending run. An already armed timer then fires as a no-op.
    pub fn cancel(&mut self) {
        self.pending = false;
        self.coalesced = 0;
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle to a registered callback. Cancelled on [`Subscription::cancel`] or
/// when dropped.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
