// Rhythmic - Precision event timing for musical applications

pub mod bpm;
pub mod clock;
pub mod interval;
pub mod metronome;
pub mod observer;
pub mod repeater;
pub mod scheduling;
pub mod sequence;
pub mod tap;

// Re-export commonly used types for convenience
pub use bpm::{Bpm, BpmEvent};
pub use clock::{
    CancelHandle, Clock, ManualClock, ScheduledCallback, SchedulingError, SchedulingResult,
    SystemClock,
};
pub use interval::Interval;
pub use metronome::{Metronome, MetronomeEvent};
pub use observer::{Observers, Subscription};
pub use repeater::{Repeater, RepeaterEvent};
pub use scheduling::Scheduling;
pub use sequence::{EventSnapshot, LoopSnapshot, Sequence, SequenceEvent, SequenceSnapshot};
pub use tap::{Tap, TapEvent};
