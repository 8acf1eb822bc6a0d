//! Core task vocabulary.
//!
//! This module contains the passive data the rest of the runtime moves around:
//! - Dense state and event identifiers resolved from task-declared names
//! - Tagged variable values
//! - Delivered events with their timestamps and payloads
//! - Ordered transition history
//!
//! Nothing in this module performs I/O or touches the clock.

mod event;
mod history;
mod ids;
mod value;

pub use event::{Event, EventKind};
pub use history::{StateHistory, TransitionRecord};
pub use ids::{EventId, NameTable, StateId, ENTRY, EXIT};
pub use value::Value;

/// Convert a session timestamp into whole milliseconds.
pub fn as_millis(time: std::time::Duration) -> u64 {
    u64::try_from(time.as_millis()).unwrap_or(u64::MAX)
}
