//! A stable min-heap keyed on (deadline, insertion order).
//!
//! `std::collections::BinaryHeap` is a max-heap, so entries are ordered by
//! the reverse of `(deadline, seq)`: the smallest deadline compares
//! greatest, and ties are broken by insertion order so that two timers
//! firing at the same instant still resolve in the order they were
//! scheduled (a stable heap).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

struct Entry<T> {
    deadline: Instant,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest deadline
        // (and, on ties, the smallest seq) to sit at the top.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-heap of `(Instant, T)`, stable on insertion order for equal
/// deadlines.
pub struct TimerHeap<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for TimerHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerHeap<T> {
    pub fn new() -> Self {
        TimerHeap {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert `payload` with the given deadline. Returns the sequence
    /// number assigned, usable for diagnostics.
    pub fn push(&mut self, deadline: Instant, payload: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            payload,
        });
        seq
    }

    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pop the earliest entry if its deadline has passed.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        if self.heap.peek().is_some_and(|e| e.deadline <= now) {
            self.heap.pop().map(|e| e.payload)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// True if every remaining entry is reported dead by `is_live`. Used to
    /// check for leaks without requiring eager removal of entries whose
    /// referent (task or operation) has already finished before its
    /// deadline arrived.
    pub fn all_dead<F: Fn(&T) -> bool>(&self, is_live: F) -> bool {
        self.heap.iter().all(|e| !is_live(&e.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pops_in_deadline_order() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        heap.push(base + Duration::from_millis(30), "c");
        heap.push(base + Duration::from_millis(10), "a");
        heap.push(base + Duration::from_millis(20), "b");

        let far_future = base + Duration::from_secs(1);
        assert_eq!(heap.pop_due(far_future), Some("a"));
        assert_eq!(heap.pop_due(far_future), Some("b"));
        assert_eq!(heap.pop_due(far_future), Some("c"));
        assert_eq!(heap.pop_due(far_future), None);
    }

    #[test]
    fn ties_broken_by_insertion_order() {
        let deadline = Instant::now();
        let mut heap = TimerHeap::new();
        heap.push(deadline, "first");
        heap.push(deadline, "second");
        heap.push(deadline, "third");

        assert_eq!(heap.pop_due(deadline), Some("first"));
        assert_eq!(heap.pop_due(deadline), Some("second"));
        assert_eq!(heap.pop_due(deadline), Some("third"));
    }

    #[test]
    fn does_not_pop_before_deadline() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        heap.push(base + Duration::from_secs(10), "late");
        assert_eq!(heap.pop_due(base), None);
    }
}
