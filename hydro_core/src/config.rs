//! Configuration types for the dosing controller.
//!
//! These are the runtime structs consumed by `DosingController`. They are
//! separate from the TOML-deserialized config in `hydro_config`.

use std::time::Duration;

/// Sample conditioning ahead of the moving average.
#[derive(Debug, Clone, Copy)]
pub struct FilterCfg {
    /// Moving-average window per sensor (samples).
    pub window: usize,
    /// Channels are not evaluated until the window holds this many samples.
    pub min_samples: usize,
    /// Reject samples beyond this many standard deviations of the window
    /// (needs at least 3 buffered samples). 0.0 disables.
    pub outlier_sigma: f64,
    /// Drop negative readings.
    pub reject_negative: bool,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            window: 5,
            min_samples: 1,
            outlier_sigma: 0.0,
            reject_negative: true,
        }
    }
}

/// Which side of the threshold counts as a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Dose when the average falls below `trigger_on`.
    Below,
    /// Dose when the average rises above `trigger_on`.
    Above,
}

/// One dosing action bound to one sensor stream and one relay.
#[derive(Debug, Clone)]
pub struct ChannelCfg {
    pub name: String,
    pub sensor: String,
    pub condition: Condition,
    pub trigger_on: f64,
    /// Recovery threshold; the gap to `trigger_on` is the dead band.
    pub trigger_off: f64,
    pub required_consecutive: u32,
    pub cooldown: Duration,
    pub pulse: Duration,
    pub relay_channel: u8,
}

impl ChannelCfg {
    /// A channel with the rig's default confirmation, cooldown and pulse.
    pub fn new(
        name: impl Into<String>,
        sensor: impl Into<String>,
        condition: Condition,
        trigger_on: f64,
        trigger_off: f64,
        relay_channel: u8,
    ) -> Self {
        Self {
            name: name.into(),
            sensor: sensor.into(),
            condition,
            trigger_on,
            trigger_off,
            required_consecutive: 3,
            cooldown: Duration::from_secs(30),
            pulse: Duration::from_secs(2),
            relay_channel,
        }
    }

    pub fn with_required_consecutive(mut self, n: u32) -> Self {
        self.required_consecutive = n;
        self
    }

    pub fn with_cooldown(mut self, d: Duration) -> Self {
        self.cooldown = d;
        self
    }

    pub fn with_pulse(mut self, d: Duration) -> Self {
        self.pulse = d;
        self
    }

    pub(crate) fn cooldown_ms(&self) -> u64 {
        u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) fn pulse_ms(&self) -> u64 {
        u64::try_from(self.pulse.as_millis()).unwrap_or(u64::MAX)
    }

    #[inline]
    pub(crate) fn is_breached(&self, avg: f64) -> bool {
        match self.condition {
            Condition::Below => avg < self.trigger_on,
            Condition::Above => avg > self.trigger_on,
        }
    }

    #[inline]
    pub(crate) fn is_recovered(&self, avg: f64) -> bool {
        match self.condition {
            Condition::Below => avg > self.trigger_off,
            Condition::Above => avg < self.trigger_off,
        }
    }
}

/// Channels wired on the reference rig.
pub fn default_channels() -> Vec<ChannelCfg> {
    vec![
        ChannelCfg::new("ph_up", "ph", Condition::Below, 5.5, 5.8, 3),
        ChannelCfg::new("ph_down", "ph", Condition::Above, 7.0, 6.7, 2),
        ChannelCfg::new("nutrient", "tds", Condition::Below, 675.0, 800.0, 1),
    ]
}
