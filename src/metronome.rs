// Metronome - Tempo-driven beat ticking with bar accents
// A Repeater timed by a shared Bpm, plus a wrapping beat counter

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::bpm::{Bpm, BpmEvent};
use crate::clock::Clock;
use crate::interval::Interval;
use crate::observer::{Observers, Subscription};
use crate::repeater::{Repeater, RepeaterEvent};

pub const MIN_BEATS: u32 = 1;
pub const MAX_BEATS: u32 = 16;

/// Notifications published by a [`Metronome`].
#[derive(Debug)]
pub enum MetronomeEvent {
    /// First beat of the bar (the counter wrapped to zero).
    Accent { beat: u32 },
    /// Any other beat, carrying its zero-based index within the bar.
    Tick { beat: u32 },
    Running { next_tick: Interval },
    Stopped,
    BpmChanged(f64),
    NumberOfBeats(u32),
}

struct MetronomeState {
    count: i64,
    beats: u32,
}

/// A Repeater whose interval tracks one beat of a [`Bpm`], counting beats
/// modulo the bar length and accenting the downbeat.
///
/// The Bpm handle may be shared with other owners; any change to it,
/// whoever makes it, retimes the next tick relative to the last one.
#[derive(Clone)]
pub struct Metronome {
    repeater: Repeater,
    bpm: Bpm,
    state: Rc<RefCell<MetronomeState>>,
    observers: Observers<MetronomeEvent>,
}

impl Metronome {
    pub fn new(clock: Rc<dyn Clock>, number_of_beats: u32, bpm: impl Into<Bpm>) -> Self {
        let bpm = bpm.into();
        let repeater = Repeater::new(clock, bpm.beat_length());
        let state = Rc::new(RefCell::new(MetronomeState {
            count: -1,
            beats: number_of_beats.clamp(MIN_BEATS, MAX_BEATS),
        }));
        let observers = Observers::new();

        // A shared Bpm's change notification is the single trigger that
        // retimes the Repeater, wherever the change came from.
        {
            let repeater = repeater.clone();
            let observers = observers.clone();
            bpm.subscribe(move |event| {
                let BpmEvent::Changed(bpm) = event;
                repeater.update_interval(bpm.beat_length());
                observers.emit(&MetronomeEvent::BpmChanged(bpm.current()));
            });
        }
        {
            let state = state.clone();
            let observers = observers.clone();
            repeater.subscribe(move |event| match event {
                RepeaterEvent::Started {
                    next_repeat_time, ..
                } => observers.emit(&MetronomeEvent::Running {
                    next_tick: *next_repeat_time,
                }),
                RepeaterEvent::Stopped => {
                    state.borrow_mut().count = -1;
                    observers.emit(&MetronomeEvent::Stopped);
                }
                RepeaterEvent::IntervalChanged { .. } => {}
            });
        }

        Self {
            repeater,
            bpm,
            state,
            observers,
        }
    }

    /// Start ticking. The first beat is always an accent. No-op while
    /// already running.
    pub fn start(&self) {
        let state = self.state.clone();
        let observers = self.observers.clone();
        self.repeater.start(move || {
            let beat = {
                let mut state = state.borrow_mut();
                state.count = (state.count + 1) % i64::from(state.beats);
                state.count as u32
            };
            if beat == 0 {
                observers.emit(&MetronomeEvent::Accent { beat });
            } else {
                observers.emit(&MetronomeEvent::Tick { beat });
            }
        });
    }

    /// Stop ticking and reset the beat counter, so the next start opens on
    /// an accent. Safe when already stopped.
    pub fn stop(&self) {
        self.repeater.stop();
    }

    /// Change the bar length (clamped to [1, 16]). Takes effect when the
    /// counter next wraps; the Repeater keeps ticking undisturbed.
    pub fn update_number_of_beats(&self, number_of_beats: u32) {
        let beats = number_of_beats.clamp(MIN_BEATS, MAX_BEATS);
        self.state.borrow_mut().beats = beats;
        debug!("metronome bar length set to {beats}");
        self.observers.emit(&MetronomeEvent::NumberOfBeats(beats));
    }

    /// Change the tempo through the shared Bpm handle. The next tick is
    /// re-timed relative to the last one, not to now.
    pub fn update_bpm(&self, value: f64) {
        self.bpm.change_to(value);
    }

    /// The shared tempo handle.
    pub fn bpm(&self) -> Bpm {
        self.bpm.clone()
    }

    pub fn number_of_beats(&self) -> u32 {
        self.state.borrow().beats
    }

    pub fn is_running(&self) -> bool {
        self.repeater.is_running()
    }

    pub fn subscribe(&self, handler: impl FnMut(&MetronomeEvent) + 'static) -> Subscription {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.observers.unsubscribe(subscription);
    }
}
