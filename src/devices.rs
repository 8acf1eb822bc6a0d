//! Device boundary.
//!
//! Concrete drivers live outside the runtime. A device only ever talks to a
//! session through an [`EventSender`]; outputs register with the task so the
//! session can force them to a safe level whenever it stops.

use crate::core::Value;
use crate::queue::{EventSender, SendError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Command sink driven synchronously from handlers.
pub trait Output: Send + Sync {
    fn name(&self) -> &str;

    /// Return to the inactive level. Called on every session stop.
    fn reset(&self);
}

/// Binary output such as an LED, solenoid or TTL line.
#[derive(Debug)]
pub struct DigitalOutput {
    name: String,
    level: AtomicBool,
}

impl DigitalOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: AtomicBool::new(false),
        }
    }

    /// Drive the output active.
    pub fn on(&self) {
        self.level.store(true, Ordering::Release);
        trace!(output = %self.name, "on");
    }

    /// Drive the output inactive.
    pub fn off(&self) {
        self.level.store(false, Ordering::Release);
        trace!(output = %self.name, "off");
    }

    /// Invert the current level.
    pub fn toggle(&self) {
        let was = self.level.fetch_xor(true, Ordering::AcqRel);
        trace!(output = %self.name, on = !was, "toggle");
    }

    pub fn is_on(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

impl Output for DigitalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self) {
        self.off();
    }
}

fn declared(sender: &EventSender, name: Option<&str>) -> Result<Option<String>, SendError> {
    match name {
        Some(name) if !sender.declares(name) => Err(SendError::Undeclared(name.to_string())),
        other => Ok(other.map(str::to_string)),
    }
}

/// Maps edges of a binary input line onto task events.
///
/// Call [`DigitalInput::signal`] from the driver's interrupt or polling
/// context with each new level; only level changes produce events.
pub struct DigitalInput {
    sender: EventSender,
    rising: Option<String>,
    falling: Option<String>,
    level: AtomicBool,
}

impl DigitalInput {
    /// Both event names, when given, must be declared by the task.
    pub fn new(
        sender: EventSender,
        rising: Option<&str>,
        falling: Option<&str>,
    ) -> Result<Self, SendError> {
        Ok(Self {
            rising: declared(&sender, rising)?,
            falling: declared(&sender, falling)?,
            sender,
            level: AtomicBool::new(false),
        })
    }

    /// Report the current line level.
    pub fn signal(&self, high: bool) -> Result<(), SendError> {
        let was = self.level.swap(high, Ordering::AcqRel);
        let event = match (was, high) {
            (false, true) => self.rising.as_deref(),
            (true, false) => self.falling.as_deref(),
            _ => None,
        };
        match event {
            Some(name) => self.sender.send(name),
            None => Ok(()),
        }
    }

    /// Last level reported by the driver.
    pub fn level(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

/// Direction of a threshold crossing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Crossing {
    Rising,
    Falling,
}

/// Turns a sampled continuous signal into discrete crossing events.
///
/// The first sample only establishes which side of the threshold the
/// signal is on. Crossing events carry the triggering sample as payload.
pub struct ThresholdCrossing {
    sender: EventSender,
    threshold: f64,
    rising: Option<String>,
    falling: Option<String>,
    above: Option<bool>,
}

impl ThresholdCrossing {
    pub fn new(
        sender: EventSender,
        threshold: f64,
        rising: Option<&str>,
        falling: Option<&str>,
    ) -> Result<Self, SendError> {
        Ok(Self {
            rising: declared(&sender, rising)?,
            falling: declared(&sender, falling)?,
            sender,
            threshold,
            above: None,
        })
    }

    /// Move the threshold; the next sample re-establishes the side.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
        self.above = None;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Feed one sample. Returns the crossing it produced, if any.
    pub fn sample(&mut self, value: f64) -> Result<Option<Crossing>, SendError> {
        let above = value > self.threshold;
        let previous = self.above.replace(above);
        let crossing = match (previous, above) {
            (Some(false), true) => Crossing::Rising,
            (Some(true), false) => Crossing::Falling,
            _ => return Ok(None),
        };
        let event = match crossing {
            Crossing::Rising => self.rising.as_deref(),
            Crossing::Falling => self.falling.as_deref(),
        };
        if let Some(name) = event {
            self.sender.send_with(name, Some(Value::Float(value)))?;
        }
        Ok(Some(crossing))
    }
}
