// ManualClock - Deterministic, manually advanced clock
// Drives the core in tests and offline rendering: time moves only on advance()

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use super::queue::PendingQueue;
use super::{CancelHandle, Clock, ScheduledCallback};
use crate::interval::Interval;

/// A clock whose time advances only when the caller says so.
///
/// `advance`/`advance_to` fire every due callback in deadline order, with
/// `now_ms()` reading as each callback's deadline while it runs. Callbacks
/// scheduled mid-advance fire in the same pass if they fall within it.
#[derive(Clone)]
pub struct ManualClock {
    inner: Rc<RefCell<ManualInner>>,
}

struct ManualInner {
    now: f64,
    queue: PendingQueue,
}

impl ManualClock {
    /// A clock starting at time zero.
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// A clock starting at an arbitrary origin.
    pub fn starting_at(now_ms: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ManualInner {
                now: now_ms,
                queue: PendingQueue::new(),
            })),
        }
    }

    /// Advance by a relative amount, firing everything that falls due.
    pub fn advance(&self, ms: f64) {
        let target = self.inner.borrow().now + ms;
        self.advance_to(target);
    }

    /// Advance to an absolute instant, firing everything that falls due.
    /// Time never moves backwards.
    pub fn advance_to(&self, target_ms: f64) {
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.pop_due(target_ms) {
                    Some((deadline, callback)) => {
                        inner.now = inner.now.max(deadline);
                        Some(callback)
                    }
                    None => None,
                }
            };
            match due {
                // Not borrowing here: the callback may schedule or cancel
                Some(callback) => callback(),
                None => break,
            }
        }
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(target_ms);
    }

    /// Move time forward without firing anything. Simulates a slow callback
    /// when called from inside one.
    pub fn bump(&self, ms: f64) {
        let mut inner = self.inner.borrow_mut();
        inner.now += ms;
    }

    /// Number of callbacks still pending.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.inner.borrow().now
    }

    fn schedule_at(&self, at: Interval, callback: ScheduledCallback) -> CancelHandle {
        let id = self.inner.borrow_mut().queue.insert(at.to_ms(), callback);
        trace!("manual clock scheduled #{} at {}", id, at);
        let inner = self.inner.clone();
        CancelHandle::new(move || {
            inner.borrow_mut().queue.remove(id);
        })
    }

    fn schedule_in(&self, delay: Interval, callback: ScheduledCallback) -> CancelHandle {
        let deadline = self.inner.borrow().now + delay.to_ms();
        self.schedule_at(Interval::from_ms(deadline), callback)
    }
}
