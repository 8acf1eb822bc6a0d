//! Save and restore task variables.
//!
//! A snapshot captures every variable of a session, hidden ones included,
//! so a rig can be restarted with the parameters an operator tuned live.
//! Snapshots are versioned and can be stored as JSON or compact binary.

use crate::core::Value;
use crate::variables::VariableStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

/// Version identifier for snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable copy of a session's variables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableSnapshot {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: Uuid,

    /// Name of the task the variables belong to
    pub task: String,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    pub variables: BTreeMap<String, Value>,
}

impl VariableSnapshot {
    /// Copy every variable of `store`, stamped with the current wall time.
    pub fn capture(task: &str, store: &VariableStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            task: task.to_string(),
            taken_at: Utc::now(),
            variables: store.to_map(),
        }
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    /// Decode JSON, rejecting unsupported versions.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(text)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Encode in the compact binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    /// Decode the binary form, rejecting unsupported versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = bincode::deserialize(bytes)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version == SNAPSHOT_VERSION {
            Ok(())
        } else {
            Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            })
        }
    }

    /// Refuse a snapshot taken from another task.
    pub fn check_task(&self, task: &str) -> Result<(), SnapshotError> {
        if self.task == task {
            Ok(())
        } else {
            Err(SnapshotError::TaskMismatch {
                expected: task.to_string(),
                found: self.task.clone(),
            })
        }
    }
}
