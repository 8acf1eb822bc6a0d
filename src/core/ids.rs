//! Dense identifiers for task-declared states and events.
//!
//! Names are resolved once, when a task definition is built, into
//! small integer indices so dispatch is a table lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reserved name of the synthetic event delivered to a state on entry.
pub const ENTRY: &str = "entry";

/// Reserved name of the synthetic event delivered to a state on exit.
pub const EXIT: &str = "exit";

/// Index of a declared state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct StateId(pub(crate) u16);

/// Index of a declared event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct EventId(pub(crate) u16);

impl StateId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl EventId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Closed, ordered set of names with O(1) lookup in both directions.
///
/// The table is immutable once built and cheap to clone, so producer
/// handles on other threads can resolve names without touching the session.
#[derive(Clone, Debug, Default)]
pub struct NameTable {
    names: Arc<[Arc<str>]>,
    index: Arc<HashMap<Arc<str>, u16>>,
}

impl NameTable {
    /// Build a table from names that have already been checked for
    /// duplicates. Later duplicates shadow nothing: the first index wins.
    pub(crate) fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let names: Vec<Arc<str>> = names.into_iter().map(|n| Arc::from(n.as_ref())).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let i = u16::try_from(i).unwrap_or(u16::MAX);
            index.entry(Arc::clone(name)).or_insert(i);
        }
        Self {
            names: names.into(),
            index: Arc::new(index),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub(crate) fn name(&self, index: usize) -> Option<&Arc<str>> {
        self.names.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| n.as_ref())
    }
}
