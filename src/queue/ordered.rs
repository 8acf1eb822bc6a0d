//! Time-ordered event buffer.

use crate::core::{EventId, StateId, Value};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;
use thiserror::Error;

/// What a queued record asks the executor to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Queued {
    /// Deliver a declared event to the handlers.
    Event {
        id: EventId,
        payload: Option<Value>,
    },
    /// A `timed_goto_state` timer fired: transition, do not deliver.
    TimedGoto(StateId),
}

/// A queued record with its origin timestamp.
#[derive(Clone, Debug)]
pub struct QueuedEvent {
    pub time: Duration,
    pub item: Queued,
    seq: u64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// The queue refused a record because it already holds `pending` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event queue full ({pending} pending)")]
pub struct QueueFull {
    pub pending: usize,
}

/// Min-heap of events keyed by (timestamp, insertion sequence).
///
/// Dequeue order is non-decreasing in time; records with equal timestamps
/// come out in the order they were enqueued.
#[derive(Debug)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueuedEvent>>,
    capacity: usize,
    next_seq: u64,
}

impl EventQueue {
    /// Empty queue holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(4096)),
            capacity,
            next_seq: 0,
        }
    }

    /// Append a record. Never blocks; fails only when at capacity.
    pub fn enqueue(&mut self, time: Duration, item: Queued) -> Result<(), QueueFull> {
        if self.heap.len() >= self.capacity {
            return Err(QueueFull {
                pending: self.heap.len(),
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(QueuedEvent { time, item, seq }));
        Ok(())
    }

    /// Remove and return the earliest record.
    pub fn dequeue(&mut self) -> Option<QueuedEvent> {
        self.heap.pop().map(|Reverse(event)| event)
    }

    /// Timestamp of the earliest record, without removing it.
    pub fn peek_time(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(event)| event.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
