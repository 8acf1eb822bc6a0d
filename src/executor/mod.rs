//! Single-threaded dispatch loop.
//!
//! A [`Session`] owns the ordered queue, the timers and the variables of
//! one task run. Handler code reaches them only through [`TaskContext`].

mod context;
mod error;
mod session;

pub use context::TaskContext;
pub use error::{ConfigurationError, SessionError};
pub use session::{Session, SessionSummary, StepOutcome};
