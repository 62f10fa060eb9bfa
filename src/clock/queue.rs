// Pending queue - min-ordered one-shot callbacks with lazy deletion
// The heap holds keys; the live map is the source of truth for cancellation

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::ScheduledCallback;

/// Heap key ordered by (deadline, insertion order) for deterministic firing.
struct Key {
    deadline: f64,
    id: u64,
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.to_bits() == other.deadline.to_bits() && self.id == other.id
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap; reverse for min-heap behavior. total_cmp gives
// a deterministic order for every float value.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.deadline.total_cmp(&other.deadline) {
            Ordering::Equal => self.id.cmp(&other.id),
            ordering => ordering,
        }
        .reverse()
    }
}

/// Min-priority queue of pending one-shot callbacks. Cancellation removes
/// the callback from the live map; stale heap keys are discarded on pop.
pub(crate) struct PendingQueue {
    heap: BinaryHeap<Key>,
    live: HashMap<u64, ScheduledCallback>,
    next_id: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_id: 0,
        }
    }

    /// Queue a callback for the given deadline; returns its id.
    pub fn insert(&mut self, deadline: f64, callback: ScheduledCallback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, callback);
        self.heap.push(Key { deadline, id });
        id
    }

    /// Drop a pending callback. Returns false if it already fired or was
    /// already cancelled.
    pub fn remove(&mut self, id: u64) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Earliest live deadline, discarding stale keys along the way.
    pub fn next_deadline(&mut self) -> Option<f64> {
        while let Some(key) = self.heap.peek() {
            if self.live.contains_key(&key.id) {
                return Some(key.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop the earliest callback due at or before `cutoff`.
    pub fn pop_due(&mut self, cutoff: f64) -> Option<(f64, ScheduledCallback)> {
        loop {
            let deadline = self.next_deadline()?;
            if deadline > cutoff {
                return None;
            }
            if let Some(key) = self.heap.pop() {
                if let Some(callback) = self.live.remove(&key.id) {
                    return Some((key.deadline, callback));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
