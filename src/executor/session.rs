//! Session: one run of a task.

use super::context::{Core, Phase, Scope, Sinks, TaskContext};
use super::error::{ConfigurationError, SessionError};
use crate::clock::{MonotonicClock, SharedClock};
use crate::config::SessionConfig;
use crate::core::{Event, EventId, StateHistory, StateId, TransitionRecord, Value};
use crate::queue::{channel, ControlHandle, EventQueue, EventSender, Inbound, Inbox, Queued, QueuedEvent};
use crate::recorder::{ApiHooks, Record, Recorder, VariableSource};
use crate::snapshot::VariableSnapshot;
use crate::task::TaskDefinition;
use crate::timers::{TimerKey, TimerManager};
use crate::variables::VariableStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// What a call to [`Session::step`] did.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepOutcome {
    /// One queued record was handled.
    Dispatched,
    /// Nothing was due.
    Idle,
    /// The session has stopped.
    Stopped,
}

/// Summary returned when a session stops.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub task: String,
    pub started_at: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub final_state: String,
    pub events_delivered: u64,
    pub transitions: usize,
    pub variables: BTreeMap<String, Value>,
    pub error: Option<String>,
}

/// A running (or runnable) instance of a task.
///
/// The session owns every piece of mutable runtime state. Producers reach
/// it only through [`EventSender`] and [`ControlHandle`], which enqueue.
///
/// Dispatch order for each declared event is fixed: the `all_states`
/// handler first, then the current state's handler. If either requested a
/// transition, the last request wins and is performed after both return:
/// `exit` to the old state, then `entry` to the new one, back to back.
pub struct Session {
    id: Uuid,
    task: Arc<TaskDefinition>,
    config: SessionConfig,
    core: Core,
    inbox: Inbox,
    sender: EventSender,
    control: ControlHandle,
    api: Option<Box<dyn ApiHooks>>,
    started_wall: Option<DateTime<Utc>>,
    stopped_at: Option<Duration>,
    last_api: Duration,
    delivered: u64,
    error: Option<String>,
}

impl Session {
    /// Create a session on a fresh monotonic clock.
    pub fn new(
        task: impl Into<Arc<TaskDefinition>>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        Self::with_clock(task, config, Arc::new(MonotonicClock::new()))
    }

    /// Create a session reading time from `clock`.
    pub fn with_clock(
        task: impl Into<Arc<TaskDefinition>>,
        config: SessionConfig,
        clock: SharedClock,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let task = task.into();
        let (sender, control, inbox) = channel(
            config.queue_capacity,
            task.events().clone(),
            Arc::clone(&clock),
        );
        let variables: VariableStore = task.variables().iter().cloned().collect();
        let core = Core {
            clock,
            queue: EventQueue::new(config.queue_capacity),
            timers: TimerManager::new(),
            variables,
            current: task.initial_state(),
            phase: Phase::Idle,
            pending_goto: None,
            stop_requested: false,
            fatal: None,
            sinks: Sinks::default(),
            history: StateHistory::new(),
            started_at: Duration::ZERO,
            boundary_dirty: true,
        };
        Ok(Self {
            id: Uuid::new_v4(),
            task,
            config,
            core,
            inbox,
            sender,
            control,
            api: None,
            started_wall: None,
            stopped_at: None,
            last_api: Duration::ZERO,
            delivered: 0,
            error: None,
        })
    }

    /// Attach a logging collaborator. Records flow in delivery order.
    pub fn add_recorder(&mut self, recorder: impl Recorder + 'static) {
        self.core.sinks.recorders.push(Box::new(recorder));
    }

    /// Install host-side hooks.
    pub fn set_api_hooks(&mut self, hooks: impl ApiHooks + 'static) {
        self.api = Some(Box::new(hooks));
        self.core.sinks.batch.get_or_insert_with(Vec::new);
    }

    /// Producer handle for devices.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Handle for the control surface.
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Unique id of this session, also carried by its summary.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The task this session runs.
    pub fn task(&self) -> &TaskDefinition {
        &self.task
    }

    /// Name of the current state.
    pub fn current_state(&self) -> &str {
        self.task.state_name(self.core.current)
    }

    /// Dense id of the current state.
    pub fn current_state_id(&self) -> StateId {
        self.core.current
    }

    /// Live variable values, including hidden ones.
    pub fn variables(&self) -> &VariableStore {
        &self.core.variables
    }

    /// Every transition so far, starting with the initial entry.
    pub fn history(&self) -> &StateHistory {
        &self.core.history
    }

    /// Whether events are currently delivered to handlers.
    pub fn is_running(&self) -> bool {
        self.core.phase == Phase::Running
    }

    /// Whether the session has stopped, normally or on a fatal error.
    pub fn is_stopped(&self) -> bool {
        self.core.phase == Phase::Stopped
    }

    /// Records waiting in the ordered queue.
    pub fn queued(&self) -> usize {
        self.core.queue.len()
    }

    /// Milliseconds left on the timer for `event`, `0` if none is pending.
    pub fn timer_remaining(&self, event: &str) -> u64 {
        self.task
            .event_id(event)
            .and_then(|id| self.core.timers.remaining(id, self.core.now()))
            .map_or(0, |left| {
                u64::try_from(left.as_micros().div_ceil(1000)).unwrap_or(u64::MAX)
            })
    }

    /// Copy every variable into a snapshot.
    pub fn save_variables(&self) -> VariableSnapshot {
        VariableSnapshot::capture(self.task.name(), &self.core.variables)
    }

    /// Restore variables from a snapshot taken from the same task.
    ///
    /// Only callable between dispatches, which is the only time the caller
    /// can hold `&mut Session` anyway.
    pub fn load_variables(&mut self, snapshot: &VariableSnapshot) -> Result<(), SessionError> {
        snapshot.check_task(self.task.name())?;
        let time = self.core.now();
        for (name, value) in &snapshot.variables {
            self.core.variables.set(name, value.clone());
            self.core.sinks.emit(Record::Variable {
                time,
                name: name.clone(),
                value: value.clone(),
                source: VariableSource::Snapshot,
            });
        }
        self.core.boundary_dirty = true;
        self.publish_boundary();
        debug!(count = snapshot.variables.len(), "Variables loaded from snapshot");
        Ok(())
    }

    fn invoke_hook(&mut self, scope: Scope) {
        let task = Arc::clone(&self.task);
        let hook = match scope {
            Scope::RunStart => task.run_start.as_ref(),
            Scope::RunEnd => task.run_end.as_ref(),
            _ => None,
        };
        if let Some(hook) = hook {
            let mut ctx = TaskContext::new(&mut self.core, &task, scope);
            hook(&mut ctx);
        }
    }

    /// Run `run_start`, then enter the initial state.
    ///
    /// A `stop_framework` call inside `run_start` stops the session before
    /// the initial state sees `entry`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.core.phase != Phase::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        self.started_wall = Some(Utc::now());
        self.core.started_at = self.core.now();
        info!(task = %self.task.name(), session = %self.id, "Session starting");

        if let Some(api) = self.api.as_mut() {
            api.run_start();
        }

        self.core.phase = Phase::Starting;
        self.invoke_hook(Scope::RunStart);
        if let Some(err) = self.core.fatal.take() {
            return Err(self.abort(err));
        }
        if self.core.stop_requested {
            debug!("Stop requested in run_start, initial state not entered");
            self.shutdown();
            return Ok(());
        }

        self.core.phase = Phase::Running;
        let initial = self.task.initial_state();
        let now = self.core.now();
        self.core.current = initial;
        self.record_transition(None, initial, now);
        self.deliver_synthetic(initial, Event::entry(now));
        if let Some(err) = self.core.fatal.take() {
            return Err(self.abort(err));
        }

        self.core.boundary_dirty = true;
        self.publish_boundary();
        Ok(())
    }

    /// Handle at most one queued record.
    ///
    /// Inbox items and expired timers are moved into the ordered queue
    /// first, then the earliest record is dispatched to completion. Records
    /// stamped later than the clock stay queued until their time comes.
    pub fn step(&mut self) -> Result<StepOutcome, SessionError> {
        match self.core.phase {
            Phase::Idle => return Err(SessionError::NotStarted),
            Phase::Stopped => return Ok(StepOutcome::Stopped),
            Phase::Starting | Phase::Running => {}
        }

        self.ingest();
        self.poll_timers();
        if let Some(err) = self.core.fatal.take() {
            return Err(self.abort(err));
        }
        if self.core.stop_requested || self.inbox.stop_requested() {
            self.stop();
            return Ok(StepOutcome::Stopped);
        }

        let now = self.core.now();
        let next = match self.core.queue.peek_time() {
            Some(time) if time <= now => self.core.queue.dequeue(),
            _ => None,
        };
        let Some(next) = next else {
            self.publish_boundary();
            self.service_api(false);
            return Ok(StepOutcome::Idle);
        };

        self.dispatch(next);
        if let Some(err) = self.core.fatal.take() {
            return Err(self.abort(err));
        }
        self.publish_boundary();

        if self.core.stop_requested {
            self.stop();
            return Ok(StepOutcome::Stopped);
        }
        self.service_api(false);
        Ok(StepOutcome::Dispatched)
    }

    /// Step until nothing is due. Returns the number of records handled.
    pub fn run_until_idle(&mut self) -> Result<usize, SessionError> {
        let mut handled = 0;
        loop {
            match self.step()? {
                StepOutcome::Dispatched => handled += 1,
                StepOutcome::Idle | StepOutcome::Stopped => return Ok(handled),
            }
        }
    }

    /// Start (if needed) and run until stopped or the configured run
    /// duration elapses, blocking on input between dispatches.
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        if self.core.phase == Phase::Idle {
            self.start()?;
        }
        let deadline = self
            .config
            .run_duration()
            .map(|d| self.core.started_at.saturating_add(d));

        loop {
            if let Some(deadline) = deadline {
                if self.core.now() >= deadline && !self.core.stop_requested {
                    info!("Run duration elapsed");
                    self.core.stop_requested = true;
                }
            }
            match self.step()? {
                StepOutcome::Stopped => break,
                StepOutcome::Dispatched => {}
                StepOutcome::Idle => self.wait_for_input(deadline),
            }
        }
        Ok(self.summary())
    }

    /// Run for `duration` of session time, then stop.
    pub fn run_for(&mut self, duration: Duration) -> Result<SessionSummary, SessionError> {
        self.config = self.config.clone().with_run_duration(duration);
        self.run()
    }

    fn wait_for_input(&mut self, deadline: Option<Duration>) {
        let now = self.core.now();
        let mut timeout = self.config.max_idle_wait();
        let wakeups = [
            self.core.timers.next_due(),
            self.core.queue.peek_time(),
            deadline,
            self.api
                .as_ref()
                .map(|_| self.last_api.saturating_add(self.config.api_interval())),
        ];
        for wake in wakeups.into_iter().flatten() {
            timeout = timeout.min(wake.saturating_sub(now));
        }
        if timeout.is_zero() {
            return;
        }
        if let Some(item) = self.inbox.recv_timeout(timeout) {
            self.accept(item);
        }
    }

    /// Stop the session: clear timers, reset outputs, run `run_end` once.
    ///
    /// Safe to call repeatedly; later calls only return the summary.
    pub fn stop(&mut self) -> SessionSummary {
        match self.core.phase {
            Phase::Stopped => {}
            Phase::Idle => self.core.phase = Phase::Stopped,
            Phase::Starting | Phase::Running => self.shutdown(),
        }
        self.summary()
    }

    fn shutdown(&mut self) {
        self.core.phase = Phase::Stopped;
        let now = self.core.now();
        self.stopped_at = Some(now);
        self.core.timers.clear();
        self.core.pending_goto = None;
        self.drain_undelivered();

        for output in &self.task.outputs {
            trace!(output = output.name(), "Resetting output");
            output.reset();
        }

        self.invoke_hook(Scope::RunEnd);
        if let Some(err) = self.core.fatal.take() {
            warn!(%err, "Error raised during run_end");
            self.core.sinks.emit(Record::Error {
                time: now,
                message: err.to_string(),
            });
        }

        self.service_api(true);
        if let Some(api) = self.api.as_mut() {
            api.run_end();
        }

        self.inbox.clear_stop();
        self.core.boundary_dirty = true;
        self.publish_boundary();
        info!(
            task = %self.task.name(),
            session = %self.id,
            state = %self.current_state(),
            "Session stopped"
        );
    }

    /// Fatal error path: report, then stop exactly as a normal stop would.
    fn abort(&mut self, err: SessionError) -> SessionError {
        error!(%err, "Fatal session error, stopping");
        self.core.sinks.emit(Record::Error {
            time: self.core.now(),
            message: err.to_string(),
        });
        self.error = Some(err.to_string());
        if matches!(self.core.phase, Phase::Starting | Phase::Running) {
            self.shutdown();
        }
        err
    }

    fn summary(&self) -> SessionSummary {
        let end = self.stopped_at.unwrap_or_else(|| self.core.now());
        SessionSummary {
            id: self.id,
            task: self.task.name().to_string(),
            started_at: self.started_wall,
            duration: end.saturating_sub(self.core.started_at),
            final_state: self.current_state().to_string(),
            events_delivered: self.delivered,
            transitions: self.core.history.len(),
            variables: self.core.variables.to_map(),
            error: self.error.clone(),
        }
    }

    /// Move everything producers have sent into the ordered queue.
    fn ingest(&mut self) {
        let dropped = self.inbox.take_dropped();
        if dropped > 0 {
            self.core.raise(SessionError::QueueOverflow {
                dropped,
                pending: self.core.queue.len() + self.inbox.pending(),
            });
            return;
        }
        while let Some(item) = self.inbox.try_recv() {
            self.accept(item);
            if self.core.fatal.is_some() {
                return;
            }
        }
    }

    fn accept(&mut self, item: Inbound) {
        match item {
            Inbound::Event { id, time, payload } => self.enqueue(time, Queued::Event { id, payload }),
            Inbound::Undeclared { name } => {
                self.core.raise(ConfigurationError::UndeclaredEvent(name));
            }
            Inbound::SetVariable { name, value } => self.apply_edit(name, value),
        }
    }

    fn enqueue(&mut self, time: Duration, item: Queued) {
        if let Err(full) = self.core.queue.enqueue(time, item) {
            self.core.raise(SessionError::QueueOverflow {
                dropped: 1,
                pending: full.pending + self.inbox.pending(),
            });
        }
    }

    fn apply_edit(&mut self, name: String, value: Value) {
        let time = self.core.now();
        match self.core.variables.apply_edit(&name, value.clone()) {
            Ok(old) => {
                debug!(%name, %old, new = %value, "Variable edited from control surface");
                self.core.boundary_dirty = true;
                self.core.sinks.emit(Record::Variable {
                    time,
                    name,
                    value,
                    source: VariableSource::Control,
                });
            }
            Err(err) => {
                warn!(%err, "Control edit rejected");
                self.core.sinks.emit(Record::RejectedEdit {
                    time,
                    name,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn poll_timers(&mut self) {
        if self.core.phase != Phase::Running {
            return;
        }
        let now = self.core.now();
        for expired in self.core.timers.expire(now) {
            let item = match expired.key {
                TimerKey::Event(id) => Queued::Event { id, payload: None },
                TimerKey::Goto { target, .. } => Queued::TimedGoto(target),
            };
            self.enqueue(expired.due, item);
            if self.core.fatal.is_some() {
                return;
            }
        }
    }

    fn dispatch(&mut self, next: QueuedEvent) {
        let running = self.core.phase == Phase::Running;
        match next.item {
            Queued::TimedGoto(target) => {
                if running {
                    trace!(state = %self.task.state_name(target), "Timed transition fired");
                    self.transition(target);
                }
            }
            Queued::Event { id, payload } => {
                let name = self.task.event_name(id);
                self.core.sinks.emit(Record::Event {
                    time: next.time,
                    name: name.to_string(),
                    payload: payload.clone(),
                    delivered: running,
                });
                if !running {
                    return;
                }
                self.delivered += 1;
                let event = Event::declared(id, name, next.time, payload);
                self.deliver(&event);
            }
        }
    }

    fn deliver(&mut self, event: &Event) {
        let task = Arc::clone(&self.task);
        self.core.pending_goto = None;

        if let Some(global) = task.all_states.as_ref() {
            let mut ctx = TaskContext::new(&mut self.core, &task, Scope::Global);
            global(&mut ctx, event);
            if self.core.fatal.is_some() {
                return;
            }
        }

        if let Some(handler) = task.handler(self.core.current) {
            let mut ctx = TaskContext::new(&mut self.core, &task, Scope::State);
            handler(&mut ctx, event);
            if self.core.fatal.is_some() {
                return;
            }
        }

        if let Some(target) = self.core.pending_goto.take() {
            self.transition(target);
        }
    }

    fn deliver_synthetic(&mut self, state: StateId, event: Event) {
        let task = Arc::clone(&self.task);
        if let Some(handler) = task.handler(state) {
            let mut ctx = TaskContext::new(&mut self.core, &task, Scope::EntryExit);
            handler(&mut ctx, &event);
        }
    }

    fn transition(&mut self, target: StateId) {
        let from = self.core.current;
        let now = self.core.now();
        self.deliver_synthetic(from, Event::exit(now));
        if self.core.fatal.is_some() {
            return;
        }
        self.core.current = target;
        self.record_transition(Some(from), target, now);
        self.deliver_synthetic(target, Event::entry(now));
    }

    fn record_transition(&mut self, from: Option<StateId>, to: StateId, time: Duration) {
        let from = from.map(|id| self.task.state_name(id).to_string());
        let to = self.task.state_name(to).to_string();
        debug!(?from, %to, ?time, "Transition");
        self.core.history.record(TransitionRecord {
            from: from.clone(),
            to: to.clone(),
            time,
        });
        self.core.sinks.emit(Record::Transition { time, from, to });
        self.core.boundary_dirty = true;
    }

    /// Record every event that will never reach a handler: the ordered
    /// queue first, then whatever is still in the inbox.
    fn drain_undelivered(&mut self) {
        while let Some(next) = self.core.queue.dequeue() {
            if let Queued::Event { id, payload } = next.item {
                self.emit_undelivered(id, next.time, payload);
            }
        }
        while let Some(item) = self.inbox.try_recv() {
            if let Inbound::Event { id, time, payload } = item {
                self.emit_undelivered(id, time, payload);
            }
        }
    }

    fn emit_undelivered(&mut self, id: EventId, time: Duration, payload: Option<Value>) {
        self.core.sinks.emit(Record::Event {
            time,
            name: self.task.event_name(id).to_string(),
            payload,
            delivered: false,
        });
    }

    fn publish_boundary(&mut self) {
        if !self.core.boundary_dirty {
            return;
        }
        self.core.boundary_dirty = false;
        let state = self.task.state_name(self.core.current).to_string();
        self.inbox
            .publish(Some(&state), self.core.variables.visible());
    }

    fn service_api(&mut self, force: bool) {
        let Some(api) = self.api.as_mut() else {
            return;
        };
        let now = self.core.now();
        if !force && now.saturating_sub(self.last_api) < self.config.api_interval() {
            return;
        }
        self.last_api = now;
        let batch = match self.core.sinks.batch.as_mut() {
            Some(batch) if !batch.is_empty() => std::mem::take(batch),
            _ => return,
        };
        api.process_data(&batch);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if matches!(self.core.phase, Phase::Starting | Phase::Running) {
            self.shutdown();
        }
    }
}
