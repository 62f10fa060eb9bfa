// Bpm - Tempo value object
// Clamped to [20, 300], rounded to 2dp; every change notifies observers

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::interval::Interval;
use crate::observer::{Observers, Subscription};

const MIN_BPM: f64 = 20.0;
const MAX_BPM: f64 = 300.0;
const DEFAULT_BPM: f64 = 120.0;
const MS_PER_MINUTE: f64 = 60_000.0;

/// Zero and NaN fall back to the default; everything else is clamped and
/// rounded to two decimal places.
fn sanitize(value: f64) -> f64 {
    let value = if value == 0.0 || value.is_nan() {
        DEFAULT_BPM
    } else {
        value
    };
    (value.clamp(MIN_BPM, MAX_BPM) * 100.0).round() / 100.0
}

/// Notifications published by a [`Bpm`].
pub enum BpmEvent {
    /// The tempo changed; carries a handle so observers can query the new
    /// `current()` and `beat_length()` directly.
    Changed(Bpm),
}

/// A tempo in beats per minute.
///
/// Cheap-clone handle: a Metronome and external callers share one instance
/// and react to its `Changed` notification instead of polling. Out-of-range
/// input is clamped, never rejected.
#[derive(Clone)]
pub struct Bpm {
    value: Rc<Cell<f64>>,
    observers: Observers<BpmEvent>,
}

impl Bpm {
    pub fn new(initial: f64) -> Self {
        Self {
            value: Rc::new(Cell::new(sanitize(initial))),
            observers: Observers::new(),
        }
    }

    /// The inverse of [`beat_length`](Bpm::beat_length): a tempo whose beat
    /// lasts the given duration. The conversion formula is self-inverse.
    pub fn for_beat_length(beat_length: impl Into<Interval>) -> Self {
        Self::new(MS_PER_MINUTE / beat_length.into().to_ms())
    }

    pub fn current(&self) -> f64 {
        self.value.get()
    }

    /// Length of one beat at the current tempo.
    pub fn beat_length(&self) -> Interval {
        Interval::from_ms(MS_PER_MINUTE / self.current())
    }

    /// Adjust the tempo by a delta and notify observers.
    pub fn change_by(&self, delta: f64) {
        self.update(self.current() + delta);
    }

    /// Set the tempo and notify observers.
    pub fn change_to(&self, value: f64) {
        self.update(value);
    }

    /// Re-emit the current value on demand.
    pub fn report(&self) {
        self.observers.emit(&BpmEvent::Changed(self.clone()));
    }

    pub fn subscribe(&self, handler: impl FnMut(&BpmEvent) + 'static) -> Subscription {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.observers.unsubscribe(subscription);
    }

    fn update(&self, value: f64) {
        self.value.set(sanitize(value));
        self.report();
    }
}

impl From<f64> for Bpm {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<u32> for Bpm {
    fn from(value: u32) -> Self {
        Self::new(value as f64)
    }
}

impl From<&Bpm> for Bpm {
    /// Copies the current numeric value into a fresh, independent tempo.
    fn from(other: &Bpm) -> Self {
        Self::new(other.current())
    }
}

impl fmt::Debug for Bpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bpm").field("value", &self.current()).finish()
    }
}

impl fmt::Display for Bpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bpm", self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn capture_changes(bpm: &Bpm) -> Rc<RefCell<Vec<f64>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bpm.subscribe(move |event| {
            let BpmEvent::Changed(bpm) = event;
            sink.borrow_mut().push(bpm.current());
        });
        seen
    }

    #[test]
    fn test_defaults_to_120() {
        assert_eq!(Bpm::new(0.0).current(), 120.0);
        assert_eq!(Bpm::new(f64::NAN).current(), 120.0);
    }

    #[test]
    fn test_no_notification_on_construction() {
        let bpm = Bpm::new(100.0);
        let seen = capture_changes(&bpm);
        assert!(seen.borrow().is_empty());

        bpm.report();
        assert_eq!(*seen.borrow(), vec![100.0]);
    }

    #[test]
    fn test_change_by_and_change_to_notify() {
        let bpm = Bpm::new(120.0);
        let seen = capture_changes(&bpm);

        bpm.change_by(3.0);
        bpm.change_by(-10.0);
        bpm.change_to(100.0);
        assert_eq!(*seen.borrow(), vec![123.0, 113.0, 100.0]);
    }

    #[test]
    fn test_clamps_to_range() {
        let bpm = Bpm::new(120.0);
        bpm.change_by(500.0);
        assert_eq!(bpm.current(), 300.0);

        bpm.change_by(-500.0);
        assert_eq!(bpm.current(), 20.0);

        assert_eq!(Bpm::new(-42.0).current(), 20.0);
    }

    #[test]
    fn test_rounds_to_two_decimal_places() {
        let bpm = Bpm::new(120.0);
        bpm.change_to(120.055);
        assert_eq!(bpm.current(), 120.06);

        bpm.change_by(1.005);
        assert_eq!(bpm.current(), 121.07);
    }

    #[test]
    fn test_beat_length_conversion() {
        let bpm = Bpm::new(120.0);
        assert_eq!(bpm.beat_length().to_ms(), 500.0);

        assert_eq!(Bpm::for_beat_length(1000.0).current(), 60.0);
    }

    #[test]
    fn test_beat_length_round_trip() {
        for ms in [250.0, 333.0, 500.0, 750.0, 1000.0, 2000.0] {
            let round_tripped = Bpm::for_beat_length(ms).beat_length().to_ms();
            assert!(
                (round_tripped - ms).abs() < 0.1,
                "beat length {ms} round-tripped to {round_tripped}"
            );
        }
    }

    #[test]
    fn test_copy_construction_from_existing_bpm() {
        let original = Bpm::new(88.0);
        let copy = Bpm::from(&original);
        original.change_to(140.0);
        assert_eq!(copy.current(), 88.0);
    }

    #[test]
    fn test_shared_handles_see_the_same_value() {
        let bpm = Bpm::new(90.0);
        let shared = bpm.clone();
        bpm.change_to(150.0);
        assert_eq!(shared.current(), 150.0);
    }
}
