//! Event queue and producer handles.
//!
//! Producers never touch the session directly. Devices, threshold detectors
//! and the control surface hold cheap clonable handles that push into a
//! bounded inbox; the executor is the single consumer and moves inbox items
//! into a time-ordered [`EventQueue`] between dispatches.

mod inbox;
mod ordered;

pub use inbox::{ControlHandle, EventSender, SendError};
pub use ordered::{EventQueue, QueueFull, Queued, QueuedEvent};

pub(crate) use inbox::{channel, Inbound, Inbox};
