// Scheduling - Factory binding every timing component to one clock
// The single entry point callers construct the engine through

use std::rc::Rc;

use log::debug;

use crate::bpm::Bpm;
use crate::clock::{Clock, SchedulingError, SchedulingResult};
use crate::interval::Interval;
use crate::metronome::Metronome;
use crate::repeater::Repeater;
use crate::sequence::Sequence;
use crate::tap::Tap;

/// Hands out timing components all bound to the same [`Clock`].
///
/// Construction is the one place the engine can fail: a clock that cannot
/// report a finite current time is unusable, and every component built
/// here would misbehave, so it is rejected up front.
#[derive(Clone)]
pub struct Scheduling {
    clock: Rc<dyn Clock>,
}

impl Scheduling {
    pub fn new(clock: Rc<dyn Clock>) -> SchedulingResult<Self> {
        let now = clock.now_ms();
        if !now.is_finite() {
            return Err(SchedulingError::InvalidClock(now));
        }
        debug!("scheduling engine bound to a clock at {now}ms");
        Ok(Self { clock })
    }

    /// Drift-corrected periodic callbacks at the given interval.
    pub fn repeater(&self, interval: impl Into<Interval>) -> Repeater {
        Repeater::new(self.clock.clone(), interval)
    }

    /// An empty event timeline.
    pub fn sequence(&self) -> Sequence {
        Sequence::new(self.clock.clone())
    }

    /// A metronome ticking at `bpm`, accenting every `number_of_beats`th
    /// beat. Pass a shared [`Bpm`] handle to control the tempo externally.
    pub fn metronome(&self, number_of_beats: u32, bpm: impl Into<Bpm>) -> Metronome {
        Metronome::new(self.clock.clone(), number_of_beats, bpm)
    }

    /// A tap-tempo estimator reading instants from this clock.
    pub fn tap(&self) -> Tap {
        Tap::new(self.clock.clone())
    }

    /// A standalone tempo value object.
    pub fn bpm(&self, initial: f64) -> Bpm {
        Bpm::new(initial)
    }

    /// A tempo derived from a beat length.
    pub fn bpm_for_beat_length(&self, beat_length: impl Into<Interval>) -> Bpm {
        Bpm::for_beat_length(beat_length)
    }

    /// The bound clock's current time.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{CancelHandle, ManualClock, ScheduledCallback};
    use std::cell::Cell;

    struct BrokenClock;

    impl Clock for BrokenClock {
        fn now_ms(&self) -> f64 {
            f64::NAN
        }

        fn schedule_at(&self, _at: Interval, _callback: ScheduledCallback) -> CancelHandle {
            CancelHandle::noop()
        }

        fn schedule_in(&self, _delay: Interval, _callback: ScheduledCallback) -> CancelHandle {
            CancelHandle::noop()
        }
    }

    #[test]
    fn test_rejects_a_clock_with_a_non_finite_now() {
        let result = Scheduling::new(Rc::new(BrokenClock));
        assert!(matches!(result, Err(SchedulingError::InvalidClock(_))));
    }

    #[test]
    fn test_components_share_the_bound_clock() {
        let clock = ManualClock::starting_at(40.0);
        let scheduling = Scheduling::new(Rc::new(clock.clone())).unwrap();
        assert_eq!(scheduling.now_ms(), 40.0);

        let fired = Rc::new(Cell::new(0.0));
        let observed = fired.clone();
        let when = clock.clone();
        let repeater = scheduling.repeater(100.0);
        repeater.start(move || observed.set(when.now_ms()));
        clock.advance(60.0);
        repeater.stop();
        assert_eq!(fired.get(), 40.0);
    }

    #[test]
    fn test_bpm_constructors() {
        let scheduling = Scheduling::new(Rc::new(ManualClock::new())).unwrap();
        assert_eq!(scheduling.bpm(150.0).current(), 150.0);
        assert_eq!(scheduling.bpm_for_beat_length(500.0).current(), 120.0);
    }
}
