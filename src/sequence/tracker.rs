use parking_lot::Mutex;
use serde::Serialize;

use super::fibonacci::{is_fibonacci, next_fibonacci_after};

/// Outcome of one admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Counter value assigned to this admission (1-based)
    pub position: i64,
    /// Whether `position` is a Fibonacci number
    pub is_fibonacci: bool,
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    pub counter: i64,
    pub is_fibonacci: bool,
    /// `None` only when the next member would not fit in an i64
    pub next_fibonacci: Option<i64>,
    pub pending_count: usize,
}

#[derive(Debug)]
struct TrackerState<T> {
    counter: i64,
    pending: Vec<T>,
}

/// Shared admission counter plus the set of deferred items
///
/// Counter and pending set sit behind a single lock, so each public method is
/// one atomic step. Concurrent `advance` calls never observe the same
/// position.
#[derive(Debug)]
pub struct SequenceTracker<T> {
    state: Mutex<TrackerState<T>>,
}

impl<T: Clone> SequenceTracker<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                counter: 0,
                pending: Vec::new(),
            }),
        }
    }

    /// Increment the counter and classify the new position.
    pub fn advance(&self) -> Admission {
        let mut state = self.state.lock();
        Self::next_admission(&mut state)
    }

    /// Take the next position and settle the pending set in the same step.
    ///
    /// `make` builds the item under the lock, so anything it stamps (a
    /// timestamp, say) follows position order. A deferred item is appended to
    /// the pending set. A member position empties the set and returns what it
    /// held, oldest first.
    ///
    /// # Arguments
    /// * `make` - Builds the item from its admission.
    pub fn admit(&self, make: impl FnOnce(Admission) -> T) -> (Admission, T, Vec<T>) {
        let mut state = self.state.lock();
        let admission = Self::next_admission(&mut state);
        let item = make(admission);

        let released = if admission.is_fibonacci {
            std::mem::take(&mut state.pending)
        } else {
            state.pending.push(item.clone());
            Vec::new()
        };
        (admission, item, released)
    }

    /// Undo the pending-set change of an [`admit`](Self::admit) whose item
    /// never made it downstream. The position stays consumed.
    ///
    /// A deferred item matching `is_item` leaves the pending set. Items a
    /// member admission released go back to the front, ahead of anything
    /// deferred since.
    pub fn withdraw(&self, admission: Admission, released: Vec<T>, is_item: impl Fn(&T) -> bool) {
        let mut state = self.state.lock();
        if admission.is_fibonacci {
            state.pending.splice(0..0, released);
        } else if let Some(at) = state.pending.iter().position(|item| is_item(item)) {
            state.pending.remove(at);
        }
    }

    fn next_admission(state: &mut TrackerState<T>) -> Admission {
        state.counter += 1;
        let position = state.counter;
        Admission {
            position,
            is_fibonacci: is_fibonacci(position),
        }
    }

    pub fn snapshot(&self) -> TrackerStatus {
        let state = self.state.lock();
        TrackerStatus {
            counter: state.counter,
            is_fibonacci: is_fibonacci(state.counter),
            next_fibonacci: next_fibonacci_after(state.counter),
            pending_count: state.pending.len(),
        }
    }

    pub fn enqueue_pending(&self, item: T) {
        self.state.lock().pending.push(item);
    }

    /// Empty the pending set and hand back its contents in insertion order.
    pub fn drain_pending(&self) -> Vec<T> {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Copy of the pending set, left in place.
    pub fn peek_pending(&self) -> Vec<T> {
        self.state.lock().pending.clone()
    }

    /// Counter back to zero and pending set cleared, as one step.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.counter = 0;
        state.pending.clear();
    }
}

impl<T: Clone> Default for SequenceTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}
