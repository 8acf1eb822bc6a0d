//! What handler code can do.
//!
//! Handlers never see the session itself. They get a [`TaskContext`] that
//! borrows the session's runtime state for exactly one invocation, which is
//! what keeps every mutation inside the dispatch loop.

use super::error::{ConfigurationError, SessionError};
use crate::clock::SharedClock;
use crate::core::{as_millis, EventId, StateHistory, StateId, Value};
use crate::queue::{EventQueue, Queued};
use crate::recorder::{Record, Recorder, VariableSource};
use crate::task::TaskDefinition;
use crate::timers::TimerManager;
use crate::variables::VariableStore;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Session lifecycle phase.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Phase {
    Idle,
    /// `run_start` is executing; timers may be armed but nothing fires.
    Starting,
    Running,
    Stopped,
}

/// Which kind of code a context was handed to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Scope {
    RunStart,
    RunEnd,
    Global,
    State,
    EntryExit,
}

impl Scope {
    fn describe(self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::RunEnd => "run_end",
            Self::Global => "the all_states handler",
            Self::State => "a state handler",
            Self::EntryExit => "entry/exit handling",
        }
    }
}

/// Fan-out of records to logging collaborators and the API batch.
#[derive(Default)]
pub(crate) struct Sinks {
    pub(crate) recorders: Vec<Box<dyn Recorder>>,
    /// Records not yet handed to `process_data`; only kept when API hooks
    /// are installed.
    pub(crate) batch: Option<Vec<Record>>,
}

impl Sinks {
    pub(crate) fn emit(&mut self, record: Record) {
        for recorder in &mut self.recorders {
            recorder.record(&record);
        }
        if let Some(batch) = &mut self.batch {
            batch.push(record);
        }
    }
}

/// Mutable runtime state of a session, owned by its dispatch loop.
pub(crate) struct Core {
    pub(crate) clock: SharedClock,
    pub(crate) queue: EventQueue,
    pub(crate) timers: TimerManager,
    pub(crate) variables: VariableStore,
    pub(crate) current: StateId,
    pub(crate) phase: Phase,
    pub(crate) pending_goto: Option<StateId>,
    pub(crate) stop_requested: bool,
    /// First fatal error raised during the current dispatch.
    pub(crate) fatal: Option<SessionError>,
    pub(crate) sinks: Sinks,
    pub(crate) history: StateHistory,
    pub(crate) started_at: Duration,
    /// Something the control surface can see changed since the last publish.
    pub(crate) boundary_dirty: bool,
}

impl Core {
    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }

    pub(crate) fn raise(&mut self, error: impl Into<SessionError>) {
        if self.fatal.is_none() {
            self.fatal = Some(error.into());
        }
    }

    fn timers_active(&self) -> bool {
        matches!(self.phase, Phase::Starting | Phase::Running)
    }
}

/// Handle given to handlers and lifecycle hooks for one invocation.
pub struct TaskContext<'a> {
    core: &'a mut Core,
    task: &'a TaskDefinition,
    scope: Scope,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(core: &'a mut Core, task: &'a TaskDefinition, scope: Scope) -> Self {
        Self { core, task, scope }
    }

    fn resolve_event(&mut self, name: &str) -> Option<EventId> {
        let id = self.task.event_id(name);
        if id.is_none() {
            self.core
                .raise(ConfigurationError::UndeclaredEvent(name.to_string()));
        }
        id
    }

    fn resolve_state(&mut self, name: &str) -> Option<StateId> {
        let id = self.task.state_id(name);
        if id.is_none() {
            self.core
                .raise(ConfigurationError::UndeclaredState(name.to_string()));
        }
        id
    }

    /// Request a transition once the current handler returns.
    ///
    /// The last request in a dispatch wins. Transitioning to the current
    /// state still runs its exit and entry.
    pub fn goto_state(&mut self, state: &str) {
        let Some(target) = self.resolve_state(state) else {
            return;
        };
        match self.scope {
            Scope::Global | Scope::State => self.core.pending_goto = Some(target),
            Scope::RunEnd => trace!(state, "goto_state ignored after stop"),
            Scope::RunStart | Scope::EntryExit => {
                self.core.raise(ConfigurationError::TransitionNotAllowed {
                    target: state.to_string(),
                    during: self.scope.describe(),
                })
            }
        }
    }

    /// Transition to `state` after `delay`, via a private timer.
    pub fn timed_goto_state(&mut self, state: &str, delay: Duration) {
        let Some(target) = self.resolve_state(state) else {
            return;
        };
        if self.core.timers_active() {
            let now = self.core.now();
            self.core.timers.arm_goto(target, delay, now);
        }
    }

    /// Disarm every pending `timed_goto_state`.
    pub fn cancel_timed_gotos(&mut self) {
        if self.core.timers_active() {
            self.core.timers.cancel_gotos();
        }
    }

    /// Enqueue `event` after `delay`, replacing any pending timer for it.
    pub fn set_timer(&mut self, event: &str, delay: Duration) {
        let Some(id) = self.resolve_event(event) else {
            return;
        };
        if self.core.timers_active() {
            let now = self.core.now();
            self.core.timers.set_timer(id, delay, now);
        }
    }

    /// Cancel the timer for `event`. Effective immediately; absent is fine.
    pub fn disarm_timer(&mut self, event: &str) {
        let Some(id) = self.resolve_event(event) else {
            return;
        };
        if self.core.timers_active() {
            self.core.timers.disarm(id);
        }
    }

    /// Freeze the timer for `event`, keeping its remaining time.
    pub fn pause_timer(&mut self, event: &str) {
        let Some(id) = self.resolve_event(event) else {
            return;
        };
        if self.core.timers_active() {
            let now = self.core.now();
            self.core.timers.pause(id, now);
        }
    }

    /// Re-arm a paused timer with the time it had left.
    pub fn unpause_timer(&mut self, event: &str) {
        let Some(id) = self.resolve_event(event) else {
            return;
        };
        if self.core.timers_active() {
            let now = self.core.now();
            self.core.timers.unpause(id, now);
        }
    }

    /// Milliseconds until the timer for `event` fires, rounded up; `0` when
    /// no timer is pending.
    pub fn timer_remaining(&mut self, event: &str) -> u64 {
        let Some(id) = self.resolve_event(event) else {
            return 0;
        };
        let now = self.core.now();
        self.core
            .timers
            .remaining(id, now)
            .map_or(0, |left| u64::try_from(left.as_micros().div_ceil(1000)).unwrap_or(u64::MAX))
    }

    /// Enqueue a declared event now. It is delivered after the current
    /// dispatch completes, never inline.
    pub fn publish_event(&mut self, event: &str, payload: Option<Value>) {
        let Some(id) = self.resolve_event(event) else {
            return;
        };
        if self.core.phase == Phase::Stopped {
            return;
        }
        let now = self.core.now();
        if let Err(full) = self.core.queue.enqueue(now, Queued::Event { id, payload }) {
            self.core.raise(SessionError::QueueOverflow {
                dropped: 1,
                pending: full.pending,
            });
        }
    }

    /// Halt the session once the in-flight event, including any transition
    /// it requested, has been handled.
    pub fn stop_framework(&mut self) {
        debug!("stop_framework requested");
        self.core.stop_requested = true;
    }

    /// Milliseconds since the session started.
    pub fn current_time(&self) -> u64 {
        as_millis(self.elapsed())
    }

    /// Session clock time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.core.now().saturating_sub(self.core.started_at)
    }

    /// Name of the state whose handler is running.
    pub fn current_state(&self) -> &str {
        self.task.state_name(self.core.current)
    }

    /// False in `run_start` and `run_end`.
    pub fn is_running(&self) -> bool {
        self.core.phase == Phase::Running
    }

    /// Current value of a variable.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.core.variables.get(name)
    }

    /// Integer view of a variable, `None` if absent or not an int.
    pub fn var_int(&self, name: &str) -> Option<i64> {
        self.var(name).and_then(Value::as_int)
    }

    /// Numeric view of a variable, `None` if absent or not a number.
    pub fn var_float(&self, name: &str) -> Option<f64> {
        self.var(name).and_then(Value::as_float)
    }

    /// Boolean view of a variable, `None` if absent or not a bool.
    pub fn var_bool(&self, name: &str) -> Option<bool> {
        self.var(name).and_then(Value::as_bool)
    }

    /// Assign a variable; the mutation is recorded.
    pub fn set_var(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let time = self.core.now();
        self.core.variables.set(name, value.clone());
        self.core.boundary_dirty = true;
        self.core.sinks.emit(Record::Variable {
            time,
            name: name.to_string(),
            value,
            source: VariableSource::Task,
        });
    }

    /// Every variable, hidden ones included.
    pub fn variables(&self) -> &VariableStore {
        &self.core.variables
    }

    /// User output, routed to the record stream.
    pub fn print(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(task = %self.task.name(), "{message}");
        let time = self.core.now();
        self.core.sinks.emit(Record::Print { time, message });
    }
}
