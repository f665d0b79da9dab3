//! Outcomes and snapshots returned by the dosing controller.

use crate::filter::RejectReason;
use crate::types::{DosingEvent, SensorId};

/// Why an observation produced no channel evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sample filtered out before reaching the buffer.
    Rejected(RejectReason),
    /// Average undefined (no samples, or overflowed to non-finite).
    NoData,
    /// Fewer buffered samples than `min_samples`.
    WarmingUp { have: usize, need: usize },
    /// Manual override is engaged.
    Override,
    /// No channel watches the sensor and it is not tracked for status.
    Unbound,
}

/// Result of delivering one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Nothing evaluated; breach counters untouched.
    Skipped(SkipReason),
    /// Channels bound to the sensor were evaluated against `average`.
    Evaluated {
        average: f64,
        events: Vec<DosingEvent>,
    },
}

impl Decision {
    /// Relay events to forward (empty for skipped observations).
    pub fn events(&self) -> &[DosingEvent] {
        match self {
            Decision::Skipped(_) => &[],
            Decision::Evaluated { events, .. } => events,
        }
    }

    pub fn into_events(self) -> Vec<DosingEvent> {
        match self {
            Decision::Skipped(_) => Vec::new(),
            Decision::Evaluated { events, .. } => events,
        }
    }
}

/// Filtered view of one sensor stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorStatus {
    pub sensor: SensorId,
    /// None until the first sample is buffered.
    pub average: Option<f64>,
    pub samples: usize,
}

/// Hysteresis and pulse state of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub name: String,
    pub sensor: SensorId,
    pub relay_channel: u8,
    pub active: bool,
    pub consecutive_breaches: u32,
    pub last_activation_ms: Option<u64>,
    /// Deadline of the in-flight pulse, if the relay is energised.
    pub pulse_off_at_ms: Option<u64>,
}

/// Point-in-time snapshot for a host UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub override_mode: bool,
    pub sensors: Vec<SensorStatus>,
    pub channels: Vec<ChannelStatus>,
}
