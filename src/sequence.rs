// Sequence - Timeline of named, timed events
// Single-shot or looped playback, live rescaling, live loop changes, snapshots

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{CancelHandle, Clock, SchedulingError, SchedulingResult};
use crate::interval::Interval;
use crate::observer::{Observers, Subscription};

/// Trailing grace so the stop notification of an unlooped pass is
/// observably after its last event.
const STOP_GRACE_MS: f64 = 10.0;

/// Notifications published by a [`Sequence`].
#[derive(Debug)]
pub enum SequenceEvent {
    /// A scheduled event fired, carrying its caller-chosen name and payload.
    Fired { name: String, data: Value },
    /// A looped pass completed and the next one begins.
    Loop,
    Stopped,
    Reset,
}

/// Pure-data snapshot of a sequence.
///
/// Wire format: `{ "loop": { "lengthMs": n }, "events": [ { "when", "name",
/// "data" } ] }`, JSON-compatible, no version field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    #[serde(rename = "loop")]
    pub loop_info: LoopSnapshot,
    pub events: Vec<EventSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSnapshot {
    #[serde(
        rename = "lengthMs",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub length_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub when: f64,
    pub name: String,
    pub data: Value,
}

struct ScheduledEvent {
    when: f64,
    name: String,
    data: Value,
    cancel: CancelHandle,
}

struct SequenceState {
    events: Vec<ScheduledEvent>,
    loop_length: Option<f64>,
    absolute_start: Option<f64>,
    running: bool,
    epoch: u64,
    stop_when: f64,
    restart_cancel: CancelHandle,
    stop_cancel: CancelHandle,
}

/// A timeline of named events with offsets relative to one absolute start
/// instant.
///
/// On every loop restart the start instant shifts forward by the loop
/// length instead of resetting to "now", preserving long-run phase
/// accuracy. Out-of-range input clamps; redundant operations are no-ops.
#[derive(Clone)]
pub struct Sequence {
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<SequenceState>>,
    observers: Observers<SequenceEvent>,
}

impl Sequence {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(SequenceState {
                events: Vec::new(),
                loop_length: None,
                absolute_start: None,
                running: false,
                epoch: 0,
                stop_when: 0.0,
                restart_cancel: CancelHandle::noop(),
                stop_cancel: CancelHandle::noop(),
            })),
            observers: Observers::new(),
        }
    }

    /// Add an event at an offset from the sequence start. Valid at any
    /// time; while running unlooped, a still-future event is scheduled into
    /// the current pass (and pushes the stop marker out if needed).
    pub fn add_event_at(&self, offset_ms: f64, name: impl Into<String>, data: impl Into<Value>) {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.events.push(ScheduledEvent {
            when: offset_ms,
            name: name.into(),
            data: data.into(),
            cancel: CancelHandle::noop(),
        });
        let index = state.events.len() - 1;

        if state.running && state.loop_length.is_none() {
            let base = state.absolute_start.unwrap_or(now);
            if base + offset_ms > now {
                let epoch = state.epoch;
                let this = self.clone();
                state.events[index].cancel = self.clock.schedule_at(
                    Interval::from_ms(base + offset_ms),
                    Box::new(move || this.fire_event(epoch, index)),
                );
                if offset_ms + STOP_GRACE_MS > state.stop_when {
                    state.stop_when = offset_ms + STOP_GRACE_MS;
                    state.stop_cancel.cancel();
                    let this = self.clone();
                    state.stop_cancel = self.clock.schedule_at(
                        Interval::from_ms(base + state.stop_when),
                        Box::new(move || this.stop()),
                    );
                }
            }
        }
    }

    /// Add an event at the current position. Before the first start, the
    /// first call establishes the implicit start instant (offset zero) and
    /// later calls measure from it.
    pub fn add_event_now(&self, name: impl Into<String>, data: impl Into<Value>) {
        let now = self.clock.now_ms();
        let offset = {
            let mut state = self.state.borrow_mut();
            let start = *state.absolute_start.get_or_insert(now);
            now - start
        };
        self.add_event_at(offset, name, data);
    }

    /// Start playing from offset zero.
    pub fn start(&self) {
        self.start_from(0.0);
    }

    /// Start playing from an offset into the timeline.
    pub fn start_from(&self, offset_ms: f64) {
        self.start_at(Interval::from_ms(self.clock.now_ms()), offset_ms);
    }

    /// Start playing at an absolute instant (clamped to not precede now),
    /// from an offset into the timeline. When looping, the offset wraps
    /// modulo the loop length.
    pub fn start_at(&self, time: impl Into<Interval>, offset_ms: f64) {
        let now = self.clock.now_ms();
        let time = time.into().to_ms().max(0.0).max(now);
        let mut offset = offset_ms.max(0.0);

        let epoch = {
            let mut state = self.state.borrow_mut();
            if let Some(length) = state.loop_length {
                offset %= length;
            }
            state.absolute_start = Some(time - offset);
            if state.running {
                Self::cancel_all(&mut state);
            }
            state.running = true;
            state.epoch += 1;
            state.epoch
        };
        debug!("sequence started at {time} with offset {offset}");
        self.schedule_pass(epoch, offset);
    }

    /// Cancel everything pending. Emits `Stopped` only if actually running.
    pub fn stop(&self) {
        let was_running = {
            let mut state = self.state.borrow_mut();
            let was_running = state.running;
            state.running = false;
            state.epoch += 1;
            if was_running {
                Self::cancel_all(&mut state);
            }
            was_running
        };
        if was_running {
            debug!("sequence stopped");
            self.observers.emit(&SequenceEvent::Stopped);
        }
    }

    /// Set, change, or clear (length ≤ 0) the loop length. While running,
    /// playback re-derives its position against the new length and
    /// reschedules from there; shrinking the loop mid-cycle can wrap the
    /// position immediately.
    pub fn set_loop(&self, length_ms: f64) {
        let running = {
            let mut state = self.state.borrow_mut();
            state.loop_length = (length_ms > 0.0).then_some(length_ms);
            state.running
        };
        if running {
            let position = match (length_ms > 0.0, self.current_position_ms()) {
                (true, position) => position % length_ms,
                // Loop cleared mid-flight: continue unlooped from here
                (false, position) => position,
            };
            self.start_from(position);
        }
    }

    /// Multiply every event offset and the loop length by `factor`.
    /// Negative factors and exactly 1 are no-ops. While running, elapsed
    /// time is rescaled too: fired events stay fired, future events shift
    /// to the new timeline speed.
    pub fn scale(&self, factor: f64) {
        if factor < 0.0 || factor == 1.0 {
            return;
        }
        let rescheduled = {
            let mut state = self.state.borrow_mut();
            let running = state.running;
            if running {
                Self::cancel_all(&mut state);
            }
            for event in &mut state.events {
                event.when *= factor;
            }
            state.loop_length = state.loop_length.map(|length| length * factor);

            if running {
                let now = self.clock.now_ms();
                let position = state
                    .absolute_start
                    .map(|start| now - start)
                    .unwrap_or(0.0);
                let offset = position * factor;
                state.absolute_start = Some(now - offset);
                state.epoch += 1;
                Some((state.epoch, offset))
            } else {
                None
            }
        };
        if let Some((epoch, offset)) = rescheduled {
            self.schedule_pass(epoch, offset);
        }
    }

    /// Elapsed time since the absolute start instant; zero if never started.
    pub fn current_position_ms(&self) -> f64 {
        let now = self.clock.now_ms();
        self.state
            .borrow()
            .absolute_start
            .map(|start| now - start)
            .unwrap_or(0.0)
    }

    pub fn loop_length_ms(&self) -> Option<f64> {
        self.state.borrow().loop_length
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Stop and clear all events and loop state.
    pub fn reset(&self) {
        self.stop();
        {
            let mut state = self.state.borrow_mut();
            state.events.clear();
            state.loop_length = None;
            state.absolute_start = None;
            state.stop_when = 0.0;
        }
        self.observers.emit(&SequenceEvent::Reset);
    }

    /// Pure-data snapshot of the current events and loop length.
    pub fn snapshot(&self) -> SequenceSnapshot {
        let state = self.state.borrow();
        SequenceSnapshot {
            loop_info: LoopSnapshot {
                length_ms: state.loop_length,
            },
            events: state
                .events
                .iter()
                .map(|event| EventSnapshot {
                    when: event.when,
                    name: event.name.clone(),
                    data: event.data.clone(),
                })
                .collect(),
        }
    }

    /// Replace events and loop length from a snapshot. Loading is
    /// destructive to run state: the sequence is stopped first.
    pub fn load(&self, snapshot: &SequenceSnapshot) {
        self.stop();
        let mut state = self.state.borrow_mut();
        state.events = snapshot
            .events
            .iter()
            .map(|event| ScheduledEvent {
                when: event.when,
                name: event.name.clone(),
                data: event.data.clone(),
                cancel: CancelHandle::noop(),
            })
            .collect();
        state.loop_length = snapshot
            .loop_info
            .length_ms
            .filter(|length| *length > 0.0);
    }

    /// Serialize the snapshot to a JSON string.
    pub fn to_json(&self) -> SchedulingResult<String> {
        serde_json::to_string(&self.snapshot())
            .map_err(|e| SchedulingError::Snapshot(e.to_string()))
    }

    /// Stop and load events and loop length from a JSON snapshot string.
    pub fn load_json(&self, json: &str) -> SchedulingResult<()> {
        let snapshot: SequenceSnapshot =
            serde_json::from_str(json).map_err(|e| SchedulingError::Snapshot(e.to_string()))?;
        self.load(&snapshot);
        Ok(())
    }

    pub fn subscribe(&self, handler: impl FnMut(&SequenceEvent) + 'static) -> Subscription {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.observers.unsubscribe(subscription);
    }

    /// Schedule every event whose offset lies in `[from_offset, loop_end)`
    /// plus exactly one terminal marker: restart when looping, stop
    /// (trailing the last scheduled event) when not.
    fn schedule_pass(&self, epoch: u64, from_offset: f64) {
        let mut state = self.state.borrow_mut();
        if !state.running || state.epoch != epoch {
            return;
        }
        let base = match state.absolute_start {
            Some(base) => base,
            None => return,
        };
        let loop_end = state.loop_length;

        let mut last_when = 0.0f64;
        for index in 0..state.events.len() {
            let when = state.events[index].when;
            let in_window = when >= from_offset && loop_end.map_or(true, |end| when < end);
            if !in_window {
                continue;
            }
            last_when = last_when.max(when);
            let this = self.clone();
            state.events[index].cancel.cancel();
            state.events[index].cancel = self.clock.schedule_at(
                Interval::from_ms(base + when),
                Box::new(move || this.fire_event(epoch, index)),
            );
        }

        state.stop_when = last_when + STOP_GRACE_MS;
        state.restart_cancel.cancel();
        state.stop_cancel.cancel();
        match loop_end {
            Some(end) => {
                let this = self.clone();
                state.restart_cancel = self.clock.schedule_at(
                    Interval::from_ms(base + end),
                    Box::new(move || this.restart(epoch)),
                );
            }
            None => {
                let this = self.clone();
                state.stop_cancel = self.clock.schedule_at(
                    Interval::from_ms(base + state.stop_when),
                    Box::new(move || this.stop()),
                );
            }
        }
    }

    fn fire_event(&self, epoch: u64, index: usize) {
        let payload = {
            let state = self.state.borrow();
            if !state.running || state.epoch != epoch {
                return;
            }
            state
                .events
                .get(index)
                .map(|event| (event.name.clone(), event.data.clone()))
        };
        if let Some((name, data)) = payload {
            self.observers.emit(&SequenceEvent::Fired { name, data });
        }
    }

    /// End of a looped pass: shift the start instant forward by one loop
    /// length (never re-anchor on "now") and schedule the next pass.
    fn restart(&self, epoch: u64) {
        {
            let mut state = self.state.borrow_mut();
            if !state.running || state.epoch != epoch {
                return;
            }
            if let (Some(start), Some(length)) = (state.absolute_start, state.loop_length) {
                state.absolute_start = Some(start + length);
            }
        }
        self.observers.emit(&SequenceEvent::Loop);
        self.schedule_pass(epoch, 0.0);
    }

    fn cancel_all(state: &mut SequenceState) {
        for event in &mut state.events {
            event.cancel.cancel();
        }
        state.restart_cancel.cancel();
        state.stop_cancel.cancel();
    }
}
