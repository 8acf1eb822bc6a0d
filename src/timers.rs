//! Named, cancelable delayed events.
//!
//! Timers are plain deadlines polled by the executor between dispatches, so
//! a firing timer only ever enqueues; it never runs handler code itself.
//! At most one timer is pending per event name: arming a name that is
//! already pending replaces the old deadline.

use crate::core::{EventId, StateId};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Identity of a pending timer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TimerKey {
    /// User timer, named after the event it enqueues.
    Event(EventId),
    /// Private timer armed by `timed_goto_state`, unique per call.
    Goto { serial: u64, target: StateId },
}

/// A timer whose deadline has passed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Expired {
    pub key: TimerKey,
    /// The deadline, used as the queued event's timestamp.
    pub due: Duration,
}

#[derive(Clone, Copy, Debug)]
struct Armed {
    due: Duration,
    seq: u64,
}

/// Manages every pending timer of a session.
#[derive(Debug, Default)]
pub struct TimerManager {
    armed: HashMap<TimerKey, Armed>,
    /// Paused user timers and the time they had left.
    paused: HashMap<EventId, Duration>,
    next_seq: u64,
    next_goto: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn arm(&mut self, key: TimerKey, due: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.armed.insert(key, Armed { due, seq }).is_some() {
            trace!(?key, "Pending timer replaced");
        }
        debug!(?key, ?due, "Timer set");
    }

    /// Arm the timer for `event` to fire at `now + delay`.
    ///
    /// If the name already has a pending or paused timer it is invalidated
    /// first and will not fire.
    pub fn set_timer(&mut self, event: EventId, delay: Duration, now: Duration) {
        self.paused.remove(&event);
        self.arm(TimerKey::Event(event), now.saturating_add(delay));
    }

    /// Cancel the timer for `event`, pending or paused.
    ///
    /// Returns whether anything was cancelled; absent timers are a no-op.
    pub fn disarm(&mut self, event: EventId) -> bool {
        let armed = self.armed.remove(&TimerKey::Event(event)).is_some();
        let paused = self.paused.remove(&event).is_some();
        if armed || paused {
            debug!(?event, "Timer cancelled");
        }
        armed || paused
    }

    /// Arm a uniquely named timer that requests a transition to `target`.
    pub fn arm_goto(&mut self, target: StateId, delay: Duration, now: Duration) -> TimerKey {
        let key = TimerKey::Goto {
            serial: self.next_goto,
            target,
        };
        self.next_goto += 1;
        self.arm(key, now.saturating_add(delay));
        key
    }

    /// Cancel every pending `timed_goto_state` timer.
    pub fn cancel_gotos(&mut self) -> usize {
        let before = self.armed.len();
        self.armed.retain(|key, _| matches!(key, TimerKey::Event(_)));
        let cancelled = before - self.armed.len();
        if cancelled > 0 {
            debug!(cancelled, "Timed transitions cancelled");
        }
        cancelled
    }

    /// Freeze a pending timer, keeping its remaining time.
    pub fn pause(&mut self, event: EventId, now: Duration) -> bool {
        match self.armed.remove(&TimerKey::Event(event)) {
            Some(armed) => {
                let left = armed.due.saturating_sub(now);
                self.paused.insert(event, left);
                debug!(?event, ?left, "Timer paused");
                true
            }
            None => false,
        }
    }

    /// Re-arm a paused timer with the time it had left.
    pub fn unpause(&mut self, event: EventId, now: Duration) -> bool {
        match self.paused.remove(&event) {
            Some(left) => {
                self.arm(TimerKey::Event(event), now.saturating_add(left));
                true
            }
            None => false,
        }
    }

    /// Time until the timer for `event` fires, or `None` if absent.
    ///
    /// Paused timers report their frozen remainder.
    pub fn remaining(&self, event: EventId, now: Duration) -> Option<Duration> {
        if let Some(armed) = self.armed.get(&TimerKey::Event(event)) {
            return Some(armed.due.saturating_sub(now));
        }
        self.paused.get(&event).copied()
    }

    /// Whether `key` is pending (paused timers are not).
    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.armed.contains_key(key)
    }

    /// Earliest pending deadline.
    pub fn next_due(&self) -> Option<Duration> {
        self.armed.values().map(|a| a.due).min()
    }

    /// Remove and return every timer due at or before `now`.
    ///
    /// Results are ordered by deadline, then by arming order, so replays are
    /// deterministic.
    pub fn expire(&mut self, now: Duration) -> Vec<Expired> {
        let mut due: Vec<(TimerKey, Armed)> = self
            .armed
            .iter()
            .filter(|(_, armed)| armed.due <= now)
            .map(|(key, armed)| (*key, *armed))
            .collect();
        if due.is_empty() {
            return Vec::new();
        }
        due.sort_by_key(|(_, armed)| (armed.due, armed.seq));
        due.into_iter()
            .map(|(key, armed)| {
                self.armed.remove(&key);
                trace!(?key, due = ?armed.due, "Timer fired");
                Expired {
                    key,
                    due: armed.due,
                }
            })
            .collect()
    }

    /// Number of pending (not paused) timers.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty() && self.paused.is_empty()
    }

    /// Drop every timer. Called when the session stops.
    pub fn clear(&mut self) {
        let count = self.armed.len() + self.paused.len();
        self.armed.clear();
        self.paused.clear();
        if count > 0 {
            debug!(count, "All timers cleared");
        }
    }
}
