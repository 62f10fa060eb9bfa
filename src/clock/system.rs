// SystemClock - Coarse wall-clock fallback backend
// Poll-driven: precision is bounded by how often the host drives it

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use spin_sleep::SpinSleeper;

use super::queue::PendingQueue;
use super::{CancelHandle, Clock, ScheduledCallback};
use crate::interval::Interval;

/// The loose scheduling backend: wall-clock time anchored to an
/// [`Instant`], fired from the host's own thread.
///
/// The host drives it either by calling [`poll`](SystemClock::poll) at its
/// own cadence or by blocking in [`run_until_idle`](SystemClock::run_until_idle),
/// which sleeps precisely to each next deadline. A hardware-timed audio
/// clock implementing [`Clock`] replaces this wherever tight timing matters.
pub struct SystemClock {
    origin: Instant,
    queue: Rc<RefCell<PendingQueue>>,
    sleeper: SpinSleeper,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            queue: Rc::new(RefCell::new(PendingQueue::new())),
            sleeper: SpinSleeper::default(),
        }
    }

    /// Fire every callback that is due. Returns how many fired.
    pub fn poll(&self) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let cutoff = self.now_ms();
                self.queue.borrow_mut().pop_due(cutoff)
            };
            match due {
                Some((deadline, callback)) => {
                    trace!("system clock firing callback due at {deadline}");
                    callback();
                    fired += 1;
                }
                None => break,
            }
        }
        fired
    }

    /// Block the calling thread, sleeping to each next deadline and firing,
    /// until nothing is pending. Callbacks may keep scheduling more work.
    pub fn run_until_idle(&self) {
        debug!("system clock running until idle");
        loop {
            let next = self.queue.borrow_mut().next_deadline();
            let Some(deadline) = next else { break };
            let wait_ms = deadline - self.now_ms();
            if wait_ms > 0.0 {
                self.sleeper.sleep(Duration::from_secs_f64(wait_ms / 1000.0));
            }
            self.poll();
        }
    }

    /// Number of callbacks still pending.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn schedule_at(&self, at: Interval, callback: ScheduledCallback) -> CancelHandle {
        let id = self.queue.borrow_mut().insert(at.to_ms(), callback);
        let queue = self.queue.clone();
        CancelHandle::new(move || {
            queue.borrow_mut().remove(id);
        })
    }

    fn schedule_in(&self, delay: Interval, callback: ScheduledCallback) -> CancelHandle {
        let deadline = self.now_ms() + delay.to_ms();
        self.schedule_at(Interval::from_ms(deadline), callback)
    }
}
