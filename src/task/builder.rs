//! Builder for task definitions.
//!
//! Validation accumulates every problem instead of stopping at the first,
//! so a task author sees all undeclared names and duplicates in one pass.

use super::error::{BuildError, BuildErrors};
use super::{Handler, Hook, TaskDefinition};
use crate::core::{Event, NameTable, StateId, Value, ENTRY, EXIT};
use crate::devices::Output;
use crate::executor::TaskContext;
use std::collections::HashSet;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<BuildError>>;

/// Fluent builder for [`TaskDefinition`].
///
/// # Example
///
/// ```
/// use taskfsm::task::TaskBuilder;
///
/// let task = TaskBuilder::new("button")
///     .states(["led_off", "led_on"])
///     .events(["button_press"])
///     .initial_state("led_off")
///     .handler("led_off", |ctx, event| {
///         if event.is("button_press") {
///             ctx.goto_state("led_on");
///         }
///     })
///     .handler("led_on", |ctx, event| {
///         if event.is("button_press") {
///             ctx.goto_state("led_off");
///         }
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(task.states().len(), 2);
/// ```
pub struct TaskBuilder {
    name: String,
    states: Vec<String>,
    events: Vec<String>,
    initial: Option<String>,
    handlers: Vec<(String, Handler)>,
    all_states: Option<Handler>,
    run_start: Option<Hook>,
    run_end: Option<Hook>,
    variables: Vec<(String, Value)>,
    outputs: Vec<Arc<dyn Output>>,
}

impl TaskBuilder {
    /// Start a task declaration named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            events: Vec::new(),
            initial: None,
            handlers: Vec::new(),
            all_states: None,
            run_start: None,
            run_end: None,
            variables: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Declare one state.
    pub fn state(mut self, name: impl Into<String>) -> Self {
        self.states.push(name.into());
        self
    }

    /// Declare several states, in order.
    pub fn states<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.states.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare one event.
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.events.push(name.into());
        self
    }

    /// Declare several events, in order.
    pub fn events<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.events.extend(names.into_iter().map(Into::into));
        self
    }

    /// Set the state entered when the session starts (required).
    pub fn initial_state(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Register the handler for a state. States without one ignore events.
    pub fn handler<F>(mut self, state: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>, &Event) + Send + Sync + 'static,
    {
        self.handlers.push((state.into(), Arc::new(f)));
        self
    }

    /// Register the handler that sees every declared event before the
    /// current state's handler does.
    pub fn all_states<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>, &Event) + Send + Sync + 'static,
    {
        self.all_states = Some(Arc::new(f));
        self
    }

    /// Hook run once before the initial state is entered. Timers may be armed here.
    pub fn run_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>) + Send + Sync + 'static,
    {
        self.run_start = Some(Arc::new(f));
        self
    }

    /// Hook run once after the session stops, including after a fatal error.
    pub fn run_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>) + Send + Sync + 'static,
    {
        self.run_end = Some(Arc::new(f));
        self
    }

    /// Declare a variable with its initial value.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }

    /// Register an output that is reset whenever the session stops.
    pub fn output(mut self, output: Arc<dyn Output>) -> Self {
        self.outputs.push(output);
        self
    }

    fn check_names(names: &[String], kind: &'static str, checks: &mut Vec<Check>) {
        let mut seen = HashSet::new();
        for name in names {
            if name.is_empty() {
                checks.push(Validation::fail(BuildError::EmptyName(kind)));
            } else if !seen.insert(name.as_str()) {
                checks.push(Validation::fail(match kind {
                    "state" => BuildError::DuplicateState(name.clone()),
                    _ => BuildError::DuplicateEvent(name.clone()),
                }));
            }
        }
        if names.len() > usize::from(u16::MAX) {
            checks.push(Validation::fail(BuildError::TooManyNames {
                kind,
                count: names.len(),
            }));
        }
    }

    fn validate(&self) -> Vec<Check> {
        let mut checks = Vec::new();

        if self.states.is_empty() {
            checks.push(Validation::fail(BuildError::NoStates));
        }
        Self::check_names(&self.states, "state", &mut checks);
        Self::check_names(&self.events, "event", &mut checks);

        for event in &self.events {
            if event == ENTRY || event == EXIT {
                checks.push(Validation::fail(BuildError::ReservedEventName(event.clone())));
            }
        }

        match &self.initial {
            None => checks.push(Validation::fail(BuildError::MissingInitialState)),
            Some(initial) if !self.states.contains(initial) => checks.push(Validation::fail(
                BuildError::UndeclaredInitialState(initial.clone()),
            )),
            Some(_) => checks.push(Validation::success(())),
        }

        let mut handled = HashSet::new();
        for (state, _) in &self.handlers {
            if !self.states.contains(state) {
                checks.push(Validation::fail(BuildError::UndeclaredHandlerState(
                    state.clone(),
                )));
            } else if !handled.insert(state.as_str()) {
                checks.push(Validation::fail(BuildError::DuplicateHandler(state.clone())));
            }
        }

        checks
    }

    /// Validate the declaration and resolve every name to a dense index.
    pub fn build(self) -> Result<TaskDefinition, BuildErrors> {
        if let Validation::Failure(errors) = Validation::all_vec(self.validate()) {
            return Err(BuildErrors(errors.iter().cloned().collect()));
        }

        let states = NameTable::new(&self.states);
        let events = NameTable::new(&self.events);

        let initial = self
            .initial
            .as_deref()
            .and_then(|name| states.lookup(name))
            .map(StateId)
            .ok_or_else(|| BuildErrors(vec![BuildError::MissingInitialState]))?;

        let mut handlers: Vec<Option<Handler>> = vec![None; states.len()];
        for (state, handler) in self.handlers {
            if let Some(index) = states.lookup(&state) {
                handlers[usize::from(index)] = Some(handler);
            }
        }

        Ok(TaskDefinition {
            name: self.name,
            states,
            events,
            initial,
            handlers,
            all_states: self.all_states,
            run_start: self.run_start,
            run_end: self.run_end,
            variables: self.variables,
            outputs: self.outputs,
        })
    }
}
