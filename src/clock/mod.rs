// Clock - One-shot scheduling capability consumed by the timing core
// The core only needs: "invoke this callback once, at this time, cancellable"

pub mod manual;
mod queue;
pub mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

use crate::interval::Interval;
use thiserror::Error;

/// Scheduling errors. The only fatal category is a malformed clock at
/// construction time; everything else in the core clamps or no-ops.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("clock reported a non-finite current time: {0}")]
    InvalidClock(f64),

    #[error("snapshot serialization failed: {0}")]
    Snapshot(String),
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// A one-shot callback handed to the clock.
pub type ScheduledCallback = Box<dyn FnOnce()>;

/// The capability this core requires from a scheduling backend.
///
/// Implementations fire callbacks on the thread that drives the clock; the
/// core itself never spawns threads and never blocks. A high-precision
/// audio-clock backend and the bundled coarse [`SystemClock`] fallback
/// satisfy the same contract.
pub trait Clock {
    /// Current time in milliseconds, in the clock's own time base.
    fn now_ms(&self) -> f64;

    /// Schedule a callback at an absolute instant. Instants in the past
    /// fire as soon as the clock is next driven.
    fn schedule_at(&self, at: Interval, callback: ScheduledCallback) -> CancelHandle;

    /// Schedule a callback a relative delay from now.
    fn schedule_in(&self, delay: Interval, callback: ScheduledCallback) -> CancelHandle;
}

/// Handle that cancels a pending one-shot callback if it has not yet fired.
///
/// Always callable: components hold a [`CancelHandle::noop`] while nothing
/// is pending, so `stop()` is safe at any time. Cancellation is idempotent
/// and best-effort; callers additionally guard their continuations against
/// a cancellation that races an in-flight firing.
pub struct CancelHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl CancelHandle {
    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the pending callback. Subsequent calls do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_cancel_handle_is_idempotent() {
        let calls = Rc::new(Cell::new(0u32));
        let counter = calls.clone();
        let mut handle = CancelHandle::new(move || counter.set(counter.get() + 1));

        handle.cancel();
        handle.cancel();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_noop_handle_is_callable() {
        let mut handle = CancelHandle::noop();
        handle.cancel(); // must not panic
    }
}
