//! Immutable task definitions.
//!
//! A task is the closed set of states and events it declares, the handler
//! for each state, an optional handler for all states, lifecycle hooks and
//! initial variables. It is built once with [`TaskBuilder`] and shared by
//! reference with every session that runs it.

mod builder;
mod error;

pub use builder::TaskBuilder;
pub use error::{BuildError, BuildErrors};

use crate::core::{Event, EventId, NameTable, StateId, Value};
use crate::devices::Output;
use crate::executor::TaskContext;
use std::fmt;
use std::sync::Arc;

/// Handler invoked with every event delivered to a state.
pub type Handler = Arc<dyn Fn(&mut TaskContext<'_>, &Event) + Send + Sync>;

/// Session lifecycle hook (`run_start`, `run_end`).
pub type Hook = Arc<dyn Fn(&mut TaskContext<'_>) + Send + Sync>;

/// Validated, immutable task declaration.
pub struct TaskDefinition {
    pub(crate) name: String,
    pub(crate) states: NameTable,
    pub(crate) events: NameTable,
    pub(crate) initial: StateId,
    pub(crate) handlers: Vec<Option<Handler>>,
    pub(crate) all_states: Option<Handler>,
    pub(crate) run_start: Option<Hook>,
    pub(crate) run_end: Option<Hook>,
    pub(crate) variables: Vec<(String, Value)>,
    pub(crate) outputs: Vec<Arc<dyn Output>>,
}

impl TaskDefinition {
    /// Task name, checked when loading snapshots.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared states, in declaration order.
    pub fn states(&self) -> &NameTable {
        &self.states
    }

    /// Declared events, in declaration order.
    pub fn events(&self) -> &NameTable {
        &self.events
    }

    /// State entered when a session starts.
    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    /// Resolve a state name, `None` if undeclared.
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.states.lookup(name).map(StateId)
    }

    /// Resolve an event name, `None` if undeclared.
    pub fn event_id(&self, name: &str) -> Option<EventId> {
        self.events.lookup(name).map(EventId)
    }

    /// Name of a state id from this task.
    pub fn state_name(&self, id: StateId) -> &str {
        self.states.name(id.index()).map_or("?", |n| n.as_ref())
    }

    pub(crate) fn event_name(&self, id: EventId) -> Arc<str> {
        self.events
            .name(id.index())
            .cloned()
            .unwrap_or_else(|| Arc::from("?"))
    }

    pub(crate) fn handler(&self, state: StateId) -> Option<&Handler> {
        self.handlers.get(state.index()).and_then(Option::as_ref)
    }

    /// Initial variable values, in declaration order.
    pub fn variables(&self) -> &[(String, Value)] {
        &self.variables
    }

    /// Whether an `all_states` handler is registered.
    pub fn has_global_handler(&self) -> bool {
        self.all_states.is_some()
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("states", &self.states.iter().collect::<Vec<_>>())
            .field("events", &self.events.iter().collect::<Vec<_>>())
            .field("initial", &self.state_name(self.initial))
            .field("all_states", &self.all_states.is_some())
            .field("variables", &self.variables)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
