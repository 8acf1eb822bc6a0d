//! Snapshot error types.

use thiserror::Error;

/// Errors that can occur while saving or loading variable snapshots
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Snapshot version is not supported by this version
    #[error("Unsupported snapshot version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Snapshot was taken from a different task
    #[error("Snapshot belongs to task '{found}', expected '{expected}'")]
    TaskMismatch { expected: String, found: String },
}
