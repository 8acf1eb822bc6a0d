//! Session configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```
//! use taskfsm::config::SessionConfig;
//!
//! let config = SessionConfig::from_json_str(r#"{ "queue_capacity": 64 }"#).unwrap();
//! assert_eq!(config.queue_capacity, 64);
//! assert_eq!(config.api_interval_ms, SessionConfig::default().api_interval_ms);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the producer inbox and of the ordered event queue.
    pub queue_capacity: usize,
    /// How often `process_data` is offered new records, in milliseconds.
    pub api_interval_ms: u64,
    /// Longest the run loop blocks waiting for input when no timer is due.
    pub max_idle_wait_ms: u64,
    /// Stop automatically after this much session time.
    pub run_duration_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            api_interval_ms: 100,
            max_idle_wait_ms: 10,
            run_duration_ms: None,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_idle_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "max_idle_wait_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_run_duration(mut self, duration: Duration) -> Self {
        self.run_duration_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn api_interval(&self) -> Duration {
        Duration::from_millis(self.api_interval_ms)
    }

    pub fn max_idle_wait(&self) -> Duration {
        Duration::from_millis(self.max_idle_wait_ms)
    }

    /// `None` runs until stopped.
    pub fn run_duration(&self) -> Option<Duration> {
        self.run_duration_ms.map(Duration::from_millis)
    }
}
