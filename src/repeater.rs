// Repeater - Drift-corrected periodic invocation over one-shot scheduling
// Each tick anchors to the previous scheduled instant, never to "now"

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::clock::{CancelHandle, Clock};
use crate::interval::Interval;
use crate::observer::{Observers, Subscription};

/// Notifications published by a [`Repeater`].
#[derive(Debug)]
pub enum RepeaterEvent {
    Started {
        previous_repeat_time: Interval,
        next_repeat_time: Interval,
    },
    Stopped,
    /// Emitted on every interval change or report; the next repeat time is
    /// present only while running.
    IntervalChanged {
        interval: Interval,
        next_repeat_time: Option<Interval>,
    },
}

/// Turns the clock's one-shot primitive into drift-corrected periodic
/// invocation.
///
/// The next fire time is always computed as `last_fire + interval` from the
/// previous *scheduled* instant, so accumulated error is bounded by the
/// clock's jitter alone, not by callback latency. Continuations carry a run
/// epoch and re-check it at fire time, tolerating a cancellation that races
/// an in-flight firing.
#[derive(Clone)]
pub struct Repeater {
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<RepeaterState>>,
    observers: Observers<RepeaterEvent>,
}

struct RepeaterState {
    interval: Interval,
    running: bool,
    epoch: u64,
    last_fire_ms: f64,
    pending: CancelHandle,
    callback: Option<Rc<RefCell<dyn FnMut()>>>,
}

impl Repeater {
    pub fn new(clock: Rc<dyn Clock>, initial_interval: impl Into<Interval>) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(RepeaterState {
                interval: initial_interval.into(),
                running: false,
                epoch: 0,
                last_fire_ms: 0.0,
                pending: CancelHandle::noop(),
                callback: None,
            })),
            observers: Observers::new(),
        }
    }

    /// Begin repeating: the callback fires immediately (the 0th tick) and
    /// then at every interval. A no-op if already running.
    pub fn start(&self, callback: impl FnMut() + 'static) {
        let (epoch, started) = {
            let mut state = self.state.borrow_mut();
            if state.running {
                return;
            }
            state.running = true;
            state.epoch += 1;
            state.last_fire_ms = self.clock.now_ms();
            let callback: Rc<RefCell<dyn FnMut()>> = Rc::new(RefCell::new(callback));
            state.callback = Some(callback);
            let previous = Interval::from_ms(state.last_fire_ms);
            let next = Interval::from_ms(state.last_fire_ms + state.interval.to_ms());
            (
                state.epoch,
                RepeaterEvent::Started {
                    previous_repeat_time: previous,
                    next_repeat_time: next,
                },
            )
        };
        debug!("repeater started, epoch {epoch}");
        self.invoke_callback();
        self.observers.emit(&started);
        self.schedule_next(epoch);
    }

    /// Cancel the pending tick and go idle. Safe when already stopped; a
    /// second call emits nothing.
    pub fn stop(&self) {
        let was_running = {
            let mut state = self.state.borrow_mut();
            let was_running = state.running;
            state.running = false;
            state.epoch += 1;
            state.callback = None;
            state.pending.cancel();
            was_running
        };
        if was_running {
            debug!("repeater stopped");
            self.observers.emit(&RepeaterEvent::Stopped);
        }
    }

    /// Swap the interval. While running, the next tick is re-timed from the
    /// last fire anchor plus the new interval, not from "now".
    pub fn update_interval(&self, new_interval: impl Into<Interval>) {
        let (epoch, running) = {
            let mut state = self.state.borrow_mut();
            state.interval = new_interval.into();
            (state.epoch, state.running)
        };
        if running {
            self.schedule_next(epoch);
        }
        self.report_interval();
    }

    /// Re-emit the current interval (and next repeat time, while running).
    pub fn report_interval(&self) {
        let event = {
            let state = self.state.borrow();
            RepeaterEvent::IntervalChanged {
                interval: state.interval,
                next_repeat_time: state
                    .running
                    .then(|| Interval::from_ms(state.last_fire_ms + state.interval.to_ms())),
            }
        };
        self.observers.emit(&event);
    }

    pub fn interval(&self) -> Interval {
        self.state.borrow().interval
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Absolute time of the next tick, while running.
    pub fn next_repeat_time(&self) -> Option<Interval> {
        let state = self.state.borrow();
        state
            .running
            .then(|| Interval::from_ms(state.last_fire_ms + state.interval.to_ms()))
    }

    pub fn subscribe(&self, handler: impl FnMut(&RepeaterEvent) + 'static) -> Subscription {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.observers.unsubscribe(subscription);
    }

    fn schedule_next(&self, epoch: u64) {
        let mut state = self.state.borrow_mut();
        if !state.running || state.epoch != epoch {
            return;
        }
        let next_ms = state.last_fire_ms + state.interval.to_ms();
        // At most one outstanding one-shot per repeater
        state.pending.cancel();
        let continuation = self.clone();
        state.pending = self.clock.schedule_at(
            Interval::from_ms(next_ms),
            Box::new(move || continuation.fire(epoch, next_ms)),
        );
    }

    fn fire(&self, epoch: u64, scheduled_ms: f64) {
        {
            let mut state = self.state.borrow_mut();
            // Stale-run guard: a cancelled run must never tick, even if the
            // clock's cancellation raced this firing
            if !state.running || state.epoch != epoch {
                return;
            }
            state.last_fire_ms = scheduled_ms;
        }
        self.invoke_callback();
        self.schedule_next(epoch);
    }

    fn invoke_callback(&self) {
        let callback = self.state.borrow().callback.clone();
        if let Some(callback) = callback {
            // Not borrowing state here: the callback may stop or re-time us
            (callback.borrow_mut())();
        }
    }
}
