//! Named, live-editable task variables.
//!
//! Handler code reads and writes the store freely; no schema is enforced.
//! Edits arriving from the control surface go through [`VariableStore::apply_edit`],
//! which is where type and visibility checks live.

use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Suffix marking a variable as hidden from the control surface.
pub const HIDDEN_SUFFIX: &str = "___";

/// Whether the control surface may show and edit a variable.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    /// Naming convention only: a trailing `___` hides the variable.
    pub fn of(name: &str) -> Self {
        if name.ends_with(HIDDEN_SUFFIX) {
            Self::Hidden
        } else {
            Self::Visible
        }
    }
}

/// Reasons a control-surface edit is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    #[error("unknown variable '{0}'")]
    Unknown(String),

    #[error("variable '{0}' is hidden from the control surface")]
    Hidden(String),

    #[error("variable '{name}' holds {expected}, cannot assign {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Process-wide task variables for one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStore {
    values: BTreeMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`, if declared.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Store a value, replacing whatever was there (including its type).
    /// Returns the previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.to_string(), value.into())
    }

    /// Whether `name` has a value.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All variables in name order, hidden ones included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Variables the control surface is allowed to see.
    pub fn visible(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .filter(|(name, _)| Visibility::of(name) == Visibility::Visible)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Clone of every variable, hidden ones included.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    /// Validate an edit from the control surface without applying it.
    ///
    /// The variable must exist and be visible. Numeric variables accept any
    /// number, booleans only booleans, strings only strings; a variable that
    /// currently holds `None` accepts anything.
    pub fn check_edit(&self, name: &str, value: &Value) -> Result<(), VariableError> {
        let current = self
            .values
            .get(name)
            .ok_or_else(|| VariableError::Unknown(name.to_string()))?;
        if Visibility::of(name) == Visibility::Hidden {
            return Err(VariableError::Hidden(name.to_string()));
        }
        let compatible = match current {
            Value::None => true,
            Value::Int(_) | Value::Float(_) => value.is_numeric(),
            Value::Bool(_) => matches!(value, Value::Bool(_)),
            Value::Str(_) => matches!(value, Value::Str(_)),
        };
        if compatible {
            Ok(())
        } else {
            Err(VariableError::TypeMismatch {
                name: name.to_string(),
                expected: current.kind(),
                found: value.kind(),
            })
        }
    }

    /// Validate and apply a control-surface edit. Returns the old value.
    pub fn apply_edit(&mut self, name: &str, value: Value) -> Result<Value, VariableError> {
        self.check_edit(name, &value)?;
        Ok(self.values.insert(name.to_string(), value).unwrap_or_default())
    }
}

impl FromIterator<(String, Value)> for VariableStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
