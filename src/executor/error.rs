//! Session errors.

use crate::config::ConfigError;
use crate::snapshot::SnapshotError;
use thiserror::Error;

/// A task referenced something outside its declared contract.
///
/// Always fatal: the session stops and `run_end` runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Transition to undeclared state '{0}'")]
    UndeclaredState(String),

    #[error("Undeclared event '{0}'")]
    UndeclaredEvent(String),

    #[error("goto_state('{target}') is not allowed during {during}")]
    TransitionNotAllowed {
        target: String,
        during: &'static str,
    },
}

/// Errors that stop a session or prevent it from starting.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Event queue overflow: {dropped} event(s) dropped, {pending} pending")]
    QueueOverflow { dropped: usize, pending: usize },

    #[error("Invalid session config: {0}")]
    Config(#[from] ConfigError),

    #[error("Snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session not started. Call .start() first")]
    NotStarted,
}

impl SessionError {
    /// Fatal errors abort a running session; the rest are usage errors
    /// reported without touching session state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::QueueOverflow { .. })
    }
}
