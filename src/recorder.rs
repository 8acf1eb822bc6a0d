//! Append-only record stream for logging collaborators.
//!
//! The executor emits a [`Record`] synchronously at the point each event,
//! transition, variable mutation or print happens. Persisting them is the
//! collaborator's business.

use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

/// Who changed a variable.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    Task,
    Control,
    Snapshot,
}

/// One entry of the session record stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    /// A declared event left the queue. `delivered` is false when the
    /// session was not running and handlers were skipped.
    Event {
        time: Duration,
        name: String,
        payload: Option<Value>,
        delivered: bool,
    },
    Transition {
        time: Duration,
        from: Option<String>,
        to: String,
    },
    Variable {
        time: Duration,
        name: String,
        value: Value,
        source: VariableSource,
    },
    /// A control-surface edit refused at the boundary.
    RejectedEdit {
        time: Duration,
        name: String,
        reason: String,
    },
    Print {
        time: Duration,
        message: String,
    },
    Error {
        time: Duration,
        message: String,
    },
}

impl Record {
    /// Session time at which the record was produced.
    pub fn time(&self) -> Duration {
        match self {
            Self::Event { time, .. }
            | Self::Transition { time, .. }
            | Self::Variable { time, .. }
            | Self::RejectedEdit { time, .. }
            | Self::Print { time, .. }
            | Self::Error { time, .. } => *time,
        }
    }
}

/// Receives records in the order they occur.
pub trait Recorder: Send {
    fn record(&mut self, record: &Record);
}

/// Keeps every record in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drop every stored record.
    pub fn clear(&self) {
        match self.records.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Recorder for MemoryRecorder {
    fn record(&mut self, record: &Record) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}

/// Forwards records to `tracing` at info level (errors at error level).
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn record(&mut self, record: &Record) {
        match record {
            Record::Event {
                time,
                name,
                payload,
                delivered,
            } => info!(?time, %name, ?payload, delivered, "event"),
            Record::Transition { time, from, to } => info!(?time, ?from, %to, "transition"),
            Record::Variable {
                time,
                name,
                value,
                source,
            } => info!(?time, %name, %value, ?source, "variable"),
            Record::RejectedEdit { time, name, reason } => {
                info!(?time, %name, %reason, "edit rejected")
            }
            Record::Print { time, message } => info!(?time, "{message}"),
            Record::Error { time, message } => error!(?time, %message, "session error"),
        }
    }
}

/// Optional host-side hooks. They run outside the dispatch loop's timing
/// guarantees and only ever see copies of session data.
pub trait ApiHooks: Send {
    fn run_start(&mut self) {}

    fn run_end(&mut self) {}

    /// Records produced since the previous call, in order.
    fn process_data(&mut self, _batch: &[Record]) {}
}
