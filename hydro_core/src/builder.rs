//! Builder for `DosingController`.
//!
//! All validation happens in `try_build()`; a controller that exists is a
//! controller whose channels and filter are internally consistent.

use std::collections::BTreeSet;

use crate::config::{ChannelCfg, Condition, FilterCfg, default_channels};
use crate::controller::DosingController;
use crate::error::{BuildError, Result};
use crate::types::SensorId;

/// Upper bound on the moving-average window (samples).
pub const MAX_WINDOW: usize = 1_000;

#[derive(Debug, Default)]
pub struct DosingControllerBuilder {
    filter: Option<FilterCfg>,
    channels: Vec<ChannelCfg>,
    tracked: Vec<SensorId>,
    override_mode: bool,
}

impl DosingControllerBuilder {
    pub fn with_filter(mut self, filter: FilterCfg) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_channel(mut self, channel: ChannelCfg) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelCfg>) -> Self {
        self.channels.extend(channels);
        self
    }

    /// Add the reference rig's pH up/down and nutrient channels.
    pub fn with_default_channels(self) -> Self {
        self.with_channels(default_channels())
    }

    /// Buffer a sensor no channel watches so `status` can report it.
    pub fn with_tracked_sensor(mut self, sensor: impl Into<String>) -> Self {
        self.tracked.push(SensorId::new(sensor));
        self
    }

    pub fn with_tracked_sensors<S: Into<String>>(
        mut self,
        sensors: impl IntoIterator<Item = S>,
    ) -> Self {
        self.tracked.extend(sensors.into_iter().map(SensorId::new));
        self
    }

    /// Start with manual override engaged.
    pub fn with_override(mut self, on: bool) -> Self {
        self.override_mode = on;
        self
    }

    pub fn try_build(self) -> Result<DosingController> {
        let filter = self.filter.unwrap_or_default();
        validate_filter(&filter)?;

        if self.channels.is_empty() {
            return Err(eyre::Report::new(BuildError::NoChannels));
        }
        let mut seen = BTreeSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.name.as_str()) {
                return Err(eyre::Report::new(BuildError::DuplicateChannel(
                    ch.name.clone(),
                )));
            }
            validate_channel(ch)?;
        }
        if self.tracked.iter().any(|s| s.as_str().trim().is_empty()) {
            return Err(invalid("tracked sensor name must not be empty"));
        }

        let mut controller = DosingController::from_parts(filter, self.channels, self.tracked);
        controller.set_override(self.override_mode);
        tracing::debug!(
            channels = controller.channel_names().count(),
            sensors = controller.tracked_sensors().count(),
            window = filter.window,
            "dosing controller built"
        );
        Ok(controller)
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate_filter(filter: &FilterCfg) -> Result<()> {
    if filter.window == 0 {
        return Err(invalid("filter window must be >= 1"));
    }
    if filter.window > MAX_WINDOW {
        return Err(invalid("filter window must be <= 1000"));
    }
    if filter.min_samples == 0 || filter.min_samples > filter.window {
        return Err(invalid("min_samples must be in [1, window]"));
    }
    if !filter.outlier_sigma.is_finite() || filter.outlier_sigma < 0.0 {
        return Err(invalid("outlier_sigma must be finite and >= 0"));
    }
    Ok(())
}

fn validate_channel(ch: &ChannelCfg) -> Result<()> {
    if ch.name.trim().is_empty() {
        return Err(invalid("channel name must not be empty"));
    }
    if ch.sensor.trim().is_empty() {
        return Err(invalid("channel sensor must not be empty"));
    }
    if !ch.trigger_on.is_finite() || !ch.trigger_off.is_finite() {
        return Err(invalid("channel thresholds must be finite"));
    }
    let dead_band_ok = match ch.condition {
        Condition::Below => ch.trigger_off > ch.trigger_on,
        Condition::Above => ch.trigger_off < ch.trigger_on,
    };
    if !dead_band_ok {
        return Err(invalid("trigger_off must lie on the recovered side of trigger_on"));
    }
    if ch.required_consecutive == 0 {
        return Err(invalid("required_consecutive must be >= 1"));
    }
    if ch.pulse.is_zero() {
        return Err(invalid("pulse duration must be > 0"));
    }
    if ch.relay_channel == 0 {
        return Err(invalid("relay_channel is 1-based"));
    }
    Ok(())
}
