//! Task definition errors.

use std::fmt;
use thiserror::Error;

/// A single problem found while building a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("No states declared. Add at least one state")]
    NoStates,

    #[error("Initial state not specified. Call .initial_state(name) before .build()")]
    MissingInitialState,

    #[error("Initial state '{0}' is not a declared state")]
    UndeclaredInitialState(String),

    #[error("Handler registered for undeclared state '{0}'")]
    UndeclaredHandlerState(String),

    #[error("State '{0}' has more than one handler")]
    DuplicateHandler(String),

    #[error("State '{0}' declared more than once")]
    DuplicateState(String),

    #[error("Event '{0}' declared more than once")]
    DuplicateEvent(String),

    #[error("Event name '{0}' is reserved for synthetic events")]
    ReservedEventName(String),

    #[error("Empty {0} name")]
    EmptyName(&'static str),

    #[error("Too many {kind}s declared ({count})")]
    TooManyNames { kind: &'static str, count: usize },
}

/// Every problem found in one build attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildErrors(pub Vec<BuildError>);

impl BuildErrors {
    pub fn errors(&self) -> &[BuildError] {
        &self.0
    }

    pub fn contains(&self, error: &BuildError) -> bool {
        self.0.contains(error)
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task definition ({} problem(s))", self.0.len())?;
        for error in &self.0 {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}
