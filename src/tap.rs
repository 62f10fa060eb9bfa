// Tap - Rolling tempo estimate from irregular human taps
// Bounded timestamp window, averaged pairwise, auto-reset after silence

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::debug;

use crate::bpm::Bpm;
use crate::clock::{CancelHandle, Clock};
use crate::interval::Interval;
use crate::observer::{Observers, Subscription};

/// How many of the most recent taps feed the average.
const WINDOW_SIZE: usize = 4;

/// Inactivity allowance before any average exists: one beat at 30 BPM.
const FIRST_TAP_RESET_MS: f64 = 1500.0;

/// Once an average exists, silence longer than this multiple of it wipes
/// the window.
const RESET_FACTOR: f64 = 1.25;

/// Notifications published by a [`Tap`].
#[derive(Debug)]
pub enum TapEvent {
    /// A new estimate, available after every tap beyond the first.
    Average(Bpm),
}

struct TapState {
    window: VecDeque<f64>,
    average: Option<f64>,
    reset_cancel: CancelHandle,
    epoch: u64,
}

/// Derives a tempo from the spacing of [`Tap::again`] calls.
///
/// Holds the last four tap instants; the average inter-tap interval is
/// `(newest - oldest) / (count - 1)`. The window clears itself after a
/// stretch of silence, so the next tap starts a fresh estimate rather
/// than averaging across the gap.
#[derive(Clone)]
pub struct Tap {
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<TapState>>,
    observers: Observers<TapEvent>,
}

impl Tap {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(TapState {
                window: VecDeque::with_capacity(WINDOW_SIZE),
                average: None,
                reset_cancel: CancelHandle::noop(),
                epoch: 0,
            })),
            observers: Observers::new(),
        }
    }

    /// Register a tap at the current instant. Returns the updated estimate
    /// once two or more taps are in the window, and emits it as
    /// [`TapEvent::Average`].
    pub fn again(&self) -> Option<Bpm> {
        let now = self.clock.now_ms();
        let (average, reset_after, epoch) = {
            let mut state = self.state.borrow_mut();
            state.reset_cancel.cancel();
            state.epoch += 1;

            if state.window.len() == WINDOW_SIZE {
                state.window.pop_front();
            }
            state.window.push_back(now);

            if state.window.len() >= 2 {
                let oldest = *state.window.front().unwrap_or(&now);
                state.average = Some((now - oldest) / (state.window.len() - 1) as f64);
            }
            let reset_after = state
                .average
                .map(|average| average * RESET_FACTOR)
                .unwrap_or(FIRST_TAP_RESET_MS);
            (state.average, reset_after, state.epoch)
        };

        let this = self.clone();
        let handle = self.clock.schedule_in(
            Interval::from_ms(reset_after),
            Box::new(move || this.reset(epoch)),
        );
        self.state.borrow_mut().reset_cancel = handle;

        average.map(|average| {
            let bpm = Bpm::for_beat_length(average);
            self.observers.emit(&TapEvent::Average(bpm.clone()));
            bpm
        })
    }

    /// The inter-tap average from the current window, if one exists yet.
    pub fn average_ms(&self) -> Option<f64> {
        self.state.borrow().average
    }

    pub fn subscribe(&self, handler: impl FnMut(&TapEvent) + 'static) -> Subscription {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.observers.unsubscribe(subscription);
    }

    // Timer-triggered only; silence is the one way the window clears.
    fn reset(&self, epoch: u64) {
        let mut state = self.state.borrow_mut();
        if state.epoch != epoch {
            return;
        }
        debug!("tap window reset after inactivity");
        state.window.clear();
        state.average = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tap_with_clock() -> (ManualClock, Tap) {
        let clock = ManualClock::new();
        let tap = Tap::new(Rc::new(clock.clone()));
        (clock, tap)
    }

    fn capture_averages(tap: &Tap) -> Rc<RefCell<Vec<f64>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        tap.subscribe(move |event| {
            let TapEvent::Average(bpm) = event;
            sink.borrow_mut().push(bpm.beat_length().to_ms());
        });
        log
    }

    #[test]
    fn test_single_tap_yields_no_estimate() {
        let (_clock, tap) = tap_with_clock();
        assert!(tap.again().is_none());
        assert_eq!(tap.average_ms(), None);
    }

    #[test]
    fn test_averages_the_window_on_each_tap() {
        let (clock, tap) = tap_with_clock();
        let averages = capture_averages(&tap);

        tap.again(); // 0
        clock.bump(250.0);
        let second = tap.again(); // 250: average 250
        clock.bump(200.0);
        let third = tap.again(); // 450: (450 - 0) / 2 = 225

        assert_eq!(second.map(|bpm| bpm.beat_length().to_ms()), Some(250.0));
        assert_eq!(third.map(|bpm| bpm.beat_length().to_ms()), Some(225.0));
        assert_eq!(*averages.borrow(), vec![250.0, 225.0]);
    }

    #[test]
    fn test_window_holds_only_the_last_four_taps() {
        let (clock, tap) = tap_with_clock();

        // 100ms apart, then a slower tap; the first taps age out
        for _ in 0..4 {
            tap.again();
            clock.bump(100.0);
        }
        // window is {0, 100, 200, 300}, now is 400
        let estimate = tap.again(); // window {100, 200, 300, 400}
        assert_eq!(estimate.map(|bpm| bpm.beat_length().to_ms()), Some(100.0));
    }

    #[test]
    fn test_resets_after_inactivity() {
        let (clock, tap) = tap_with_clock();
        let averages = capture_averages(&tap);

        tap.again(); // 0
        clock.advance(250.0);
        tap.again(); // 250: average 250, reset armed for 312.5ms of silence
        clock.advance(550.0); // reset fires at 562.5
        tap.again(); // 800: fresh window, no estimate
        clock.advance(250.0);
        tap.again(); // 1050: average 250
        clock.advance(200.0);
        tap.again(); // 1250: (1250 - 800) / 2 = 225

        assert_eq!(*averages.borrow(), vec![250.0, 250.0, 225.0]);
    }

    #[test]
    fn test_steady_tapping_keeps_the_window_alive() {
        let (clock, tap) = tap_with_clock();
        let averages = capture_averages(&tap);

        // 300ms gaps stay inside the 1.25 x 300 allowance
        tap.again();
        for _ in 0..3 {
            clock.advance(300.0);
            tap.again();
        }

        assert_eq!(*averages.borrow(), vec![300.0, 300.0, 300.0]);
    }

    #[test]
    fn test_first_tap_reset_uses_the_fixed_fallback() {
        let (clock, tap) = tap_with_clock();

        tap.again(); // 0: reset armed for 1500
        clock.advance(1400.0);
        assert!(tap.again().is_some()); // still within the allowance

        clock.advance(2000.0); // silence; reset fires
        assert!(tap.again().is_none());
    }

    #[test]
    fn test_estimate_converts_through_bpm() {
        let (clock, tap) = tap_with_clock();

        tap.again();
        clock.bump(500.0);
        let estimate = tap.again();
        assert_eq!(estimate.map(|bpm| bpm.current()), Some(120.0));
    }
}
