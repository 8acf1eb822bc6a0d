//! Taskfsm: a run-to-completion state machine runtime for timed tasks
//!
//! A task declares a closed set of states and events, a handler per state
//! and optionally one handler that sees every event in every state. A
//! [`Session`] runs the task: it pulls events off a time-ordered queue and
//! delivers each one to completion before looking at the next.
//!
//! # Core Concepts
//!
//! - **Task**: immutable declaration built and validated by [`TaskBuilder`]
//! - **Session**: the dispatch loop, owning the queue, timers and variables
//! - **Context**: what a handler may do ([`TaskContext`])
//! - **Producers**: devices and detectors that only enqueue ([`EventSender`])
//!
//! # Example
//!
//! ```rust
//! use taskfsm::clock::ManualClock;
//! use taskfsm::{Session, SessionConfig, TaskBuilder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let task = TaskBuilder::new("blink")
//!     .states(["off", "on"])
//!     .events(["toggle"])
//!     .initial_state("off")
//!     .handler("off", |ctx, event| {
//!         if event.is_entry() {
//!             ctx.set_timer("toggle", Duration::from_millis(500));
//!         } else if event.is("toggle") {
//!             ctx.goto_state("on");
//!         }
//!     })
//!     .handler("on", |ctx, event| {
//!         if event.is("toggle") {
//!             ctx.stop_framework();
//!         }
//!     })
//!     .build()
//!     .unwrap();
//!
//! let clock = ManualClock::new();
//! let mut session =
//!     Session::with_clock(task, SessionConfig::default(), Arc::new(clock.clone())).unwrap();
//! session.start().unwrap();
//!
//! clock.advance_ms(500);
//! session.run_until_idle().unwrap();
//! assert_eq!(session.current_state(), "on");
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod devices;
pub mod executor;
pub mod queue;
pub mod recorder;
pub mod snapshot;
pub mod task;
pub mod timers;
pub mod variables;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use config::{ConfigError, SessionConfig};
pub use crate::core::{Event, EventKind, StateHistory, TransitionRecord, Value};
pub use devices::{DigitalInput, DigitalOutput, Output, ThresholdCrossing};
pub use executor::{
    ConfigurationError, Session, SessionError, SessionSummary, StepOutcome, TaskContext,
};
pub use queue::{ControlHandle, EventSender, SendError};
pub use recorder::{ApiHooks, MemoryRecorder, Record, Recorder, TracingRecorder};
pub use snapshot::{SnapshotError, VariableSnapshot};
pub use task::{BuildError, BuildErrors, TaskBuilder, TaskDefinition};
pub use variables::{VariableError, VariableStore};
