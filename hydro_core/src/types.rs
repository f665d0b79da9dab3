//! Value types crossing the controller boundary.

use std::fmt;

/// Name of an observation stream ("ph", "tds", "temperature", ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<hydro_config::SensorKind> for SensorId {
    fn from(k: hydro_config::SensorKind) -> Self {
        Self::new(k.as_str())
    }
}

/// One calibrated reading delivered by the polling collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub sensor: SensorId,
    pub value: f64,
    /// Monotonic milliseconds on the caller's clock.
    pub at_ms: u64,
}

impl Observation {
    pub fn new(sensor: impl Into<SensorId>, value: f64, at_ms: u64) -> Self {
        Self {
            sensor: sensor.into(),
            value,
            at_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DosingAction {
    Activate,
    Deactivate,
}

impl DosingAction {
    pub fn is_on(self) -> bool {
        matches!(self, DosingAction::Activate)
    }
}

/// Relay command emitted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosingEvent {
    pub channel: String,
    pub relay_channel: u8,
    pub action: DosingAction,
    pub at_ms: u64,
}
