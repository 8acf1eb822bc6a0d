//! Events as delivered to handlers.

use super::ids::{EventId, ENTRY, EXIT};
use super::value::Value;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

/// What kind of occurrence an event is.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum EventKind {
    /// Synthetic, delivered to a state right after it becomes current.
    Entry,
    /// Synthetic, delivered to a state right before it stops being current.
    Exit,
    /// A task-declared event.
    Declared(EventId),
}

/// An immutable event record.
///
/// `time` is the origin timestamp: when a device produced it, when a timer
/// was due, or when a transition happened for `entry`/`exit`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    #[serde(serialize_with = "serialize_name")]
    name: Arc<str>,
    kind: EventKind,
    #[serde(serialize_with = "serialize_millis")]
    time: Duration,
    payload: Option<Value>,
}

fn serialize_name<S: Serializer>(name: &Arc<str>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(name)
}

fn serialize_millis<S: Serializer>(time: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(super::as_millis(*time))
}

impl Event {
    pub(crate) fn declared(
        id: EventId,
        name: Arc<str>,
        time: Duration,
        payload: Option<Value>,
    ) -> Self {
        Self {
            name,
            kind: EventKind::Declared(id),
            time,
            payload,
        }
    }

    pub(crate) fn entry(time: Duration) -> Self {
        Self {
            name: Arc::from(ENTRY),
            kind: EventKind::Entry,
            time,
            payload: None,
        }
    }

    pub(crate) fn exit(time: Duration) -> Self {
        Self {
            name: Arc::from(EXIT),
            kind: EventKind::Exit,
            time,
            payload: None,
        }
    }

    /// Declared event name, or `entry`/`exit`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when this event carries the given name.
    pub fn is(&self, name: &str) -> bool {
        *self.name == *name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Declared event id; `None` for `entry` and `exit`.
    pub fn id(&self) -> Option<EventId> {
        match self.kind {
            EventKind::Declared(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.kind == EventKind::Entry
    }

    pub fn is_exit(&self) -> bool {
        self.kind == EventKind::Exit
    }

    /// Origin timestamp; the due time for timer events.
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Value attached by the producer, if any.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}
