//! State transition history tracking.
//!
//! Every transition the executor performs is appended here in the order it
//! happened, including the initial entry into the task's first state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single state transition.
///
/// # Example
///
/// ```rust
/// use taskfsm::core::TransitionRecord;
/// use std::time::Duration;
///
/// let record = TransitionRecord {
///     from: Some("wait_for_poke".to_string()),
///     to: "reward".to_string(),
///     time: Duration::from_millis(1250),
/// };
/// assert!(!record.is_self_transition());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state being left; `None` for the session's initial entry
    pub from: Option<String>,
    /// The state being entered
    pub to: String,
    /// Session time of the transition
    pub time: Duration,
}

impl TransitionRecord {
    /// True for `goto_state(current)`, which still runs exit and entry.
    pub fn is_self_transition(&self) -> bool {
        self.from.as_deref() == Some(self.to.as_str())
    }
}

/// Ordered history of state transitions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<TransitionRecord>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Append a transition.
    pub fn record(&mut self, transition: TransitionRecord) {
        self.transitions.push(transition);
    }

    /// Get the path of states traversed.
    ///
    /// Returns the first transition's source (if any), then the target of
    /// every transition in order.
    ///
    /// ```rust
    /// use taskfsm::core::{StateHistory, TransitionRecord};
    /// use std::time::Duration;
    ///
    /// let mut history = StateHistory::new();
    /// history.record(TransitionRecord { from: None, to: "A".into(), time: Duration::ZERO });
    /// history.record(TransitionRecord {
    ///     from: Some("A".into()),
    ///     to: "B".into(),
    ///     time: Duration::from_millis(10),
    /// });
    ///
    /// assert_eq!(history.get_path(), vec!["A", "B"]);
    /// ```
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        if let Some(from) = self.transitions.first().and_then(|t| t.from.as_deref()) {
            path.push(from);
        }
        for transition in &self.transitions {
            path.push(transition.to.as_str());
        }
        path
    }

    /// Session time between the first and last transition.
    ///
    /// Returns `None` if there are no transitions.
    pub fn duration(&self) -> Option<Duration> {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => Some(last.time.saturating_sub(first.time)),
            _ => None,
        }
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
