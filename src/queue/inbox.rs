//! Bounded inbox shared by every producer.

use crate::clock::SharedClock;
use crate::core::{EventId, NameTable, Value};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Errors returned to producers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("event '{0}' is not declared by the task")]
    Undeclared(String),

    #[error("inbox full: event dropped ({pending} pending)")]
    Overflow { pending: usize },

    #[error("session is no longer accepting input")]
    Closed,
}

/// Records crossing from producer threads into the executor.
#[derive(Debug, Clone)]
pub(crate) enum Inbound {
    Event {
        id: EventId,
        time: Duration,
        payload: Option<Value>,
    },
    /// A producer named an event outside the declared set.
    Undeclared { name: String },
    /// Control-surface edit, validated and applied between dispatches.
    SetVariable { name: String, value: Value },
}

/// State published by the executor at dispatch boundaries.
#[derive(Debug, Clone, Default)]
struct Published {
    state: Option<String>,
    variables: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct Shared {
    dropped: AtomicUsize,
    stop: AtomicBool,
    published: RwLock<Published>,
}

/// Create the inbox and its producer handles.
pub(crate) fn channel(
    capacity: usize,
    events: NameTable,
    clock: SharedClock,
) -> (EventSender, ControlHandle, Inbox) {
    let (tx, rx) = bounded(capacity);
    let shared = Arc::new(Shared::default());
    let sender = EventSender {
        tx: tx.clone(),
        events,
        clock,
        shared: Arc::clone(&shared),
    };
    let control = ControlHandle {
        tx,
        shared: Arc::clone(&shared),
    };
    (sender, control, Inbox { rx, shared })
}

fn push(tx: &Sender<Inbound>, shared: &Shared, item: Inbound) -> Result<(), SendError> {
    match tx.try_send(item) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            shared.dropped.fetch_add(1, Ordering::AcqRel);
            Err(SendError::Overflow { pending: tx.len() })
        }
        Err(TrySendError::Disconnected(_)) => Err(SendError::Closed),
    }
}

/// Producer handle for device callbacks and detectors.
///
/// Sending only enqueues; it never runs handler code. Safe to use from any
/// thread and cheap to clone.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<Inbound>,
    events: NameTable,
    clock: SharedClock,
    shared: Arc<Shared>,
}

impl EventSender {
    /// Enqueue a declared event stamped with the current session time.
    pub fn send(&self, name: &str) -> Result<(), SendError> {
        self.send_with(name, None)
    }

    /// Enqueue a declared event with a payload.
    pub fn send_with(&self, name: &str, payload: Option<Value>) -> Result<(), SendError> {
        self.send_at(name, self.clock.now(), payload)
    }

    /// Enqueue a declared event with an explicit origin timestamp.
    ///
    /// A timestamp ahead of the clock holds the event back until the clock
    /// reaches it.
    ///
    /// An undeclared name is reported back to the caller and also forwarded
    /// to the executor, which treats it as a fatal configuration error.
    pub fn send_at(
        &self,
        name: &str,
        time: Duration,
        payload: Option<Value>,
    ) -> Result<(), SendError> {
        let Some(index) = self.events.lookup(name) else {
            let _ = push(
                &self.tx,
                &self.shared,
                Inbound::Undeclared {
                    name: name.to_string(),
                },
            );
            return Err(SendError::Undeclared(name.to_string()));
        };
        push(
            &self.tx,
            &self.shared,
            Inbound::Event {
                id: EventId(index),
                time,
                payload,
            },
        )
    }

    /// Session time according to the shared clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Whether the task declares this event.
    pub fn declares(&self, name: &str) -> bool {
        self.events.contains(name)
    }
}

/// Handle for the control surface.
///
/// Edits are queued and applied only between dispatches; reads see the
/// snapshot published at the last dispatch boundary.
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<Inbound>,
    shared: Arc<Shared>,
}

impl ControlHandle {
    /// Request a variable change.
    pub fn set_variable(&self, name: &str, value: impl Into<Value>) -> Result<(), SendError> {
        push(
            &self.tx,
            &self.shared,
            Inbound::SetVariable {
                name: name.to_string(),
                value: value.into(),
            },
        )
    }

    /// Ask the session to stop after the in-flight dispatch.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Visible variables as of the last dispatch boundary.
    pub fn variables(&self) -> BTreeMap<String, Value> {
        self.read(|p| p.variables.clone())
    }

    /// Current state name as of the last dispatch boundary.
    pub fn current_state(&self) -> Option<String> {
        self.read(|p| p.state.clone())
    }

    fn read<R>(&self, f: impl FnOnce(&Published) -> R) -> R {
        match self.shared.published.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

/// Consumer side, owned by the executor.
pub(crate) struct Inbox {
    rx: Receiver<Inbound>,
    shared: Arc<Shared>,
}

impl Inbox {
    pub(crate) fn try_recv(&self) -> Option<Inbound> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block until an item arrives or `timeout` passes.
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<Inbound> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Number of producer sends refused since the last call.
    pub(crate) fn take_dropped(&self) -> usize {
        self.shared.dropped.swap(0, Ordering::AcqRel)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    pub(crate) fn clear_stop(&self) {
        self.shared.stop.store(false, Ordering::Release);
    }

    /// Publish a boundary snapshot for control-surface readers.
    pub(crate) fn publish(&self, state: Option<&str>, variables: BTreeMap<String, Value>) {
        let update = |p: &mut Published| {
            p.state = state.map(str::to_string);
            p.variables = variables;
        };
        match self.shared.published.write() {
            Ok(mut guard) => update(&mut guard),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }
}
