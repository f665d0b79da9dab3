//! `From` implementations bridging `hydro_config` types to `hydro_core` types.

use std::time::Duration;

use crate::calibration::CalibrationPoint;
use crate::config::{ChannelCfg, Condition, FilterCfg};

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&hydro_config::FilterCfg> for FilterCfg {
    fn from(c: &hydro_config::FilterCfg) -> Self {
        Self {
            window: c.window,
            min_samples: c.min_samples,
            outlier_sigma: c.outlier_sigma,
            reject_negative: c.reject_negative,
        }
    }
}

// ── Condition ────────────────────────────────────────────────────────────────

impl From<hydro_config::Condition> for Condition {
    fn from(c: hydro_config::Condition) -> Self {
        match c {
            hydro_config::Condition::Below => Self::Below,
            hydro_config::Condition::Above => Self::Above,
        }
    }
}

// ── ChannelCfg ───────────────────────────────────────────────────────────────

impl From<&hydro_config::ChannelCfg> for ChannelCfg {
    fn from(c: &hydro_config::ChannelCfg) -> Self {
        Self {
            name: c.name.clone(),
            sensor: c.sensor.clone(),
            condition: c.condition.into(),
            trigger_on: c.trigger_on,
            trigger_off: c.trigger_off,
            required_consecutive: c.required_consecutive,
            cooldown: Duration::from_millis(c.cooldown_ms),
            pulse: Duration::from_millis(c.pulse_ms),
            relay_channel: c.relay_channel,
        }
    }
}

// ── Calibration points ───────────────────────────────────────────────────────

/// Convert a batch of CSV rows in one go.
pub fn points_from_rows(rows: &[hydro_config::CalibrationPointRow]) -> Vec<CalibrationPoint> {
    rows.iter().map(CalibrationPoint::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_millis_become_durations() {
        let cfg = hydro_config::ChannelCfg {
            name: "ph_up".into(),
            sensor: "ph".into(),
            condition: hydro_config::Condition::Below,
            trigger_on: 5.5,
            trigger_off: 5.8,
            required_consecutive: 4,
            cooldown_ms: 45_000,
            pulse_ms: 1_500,
            relay_channel: 3,
        };
        let ch = ChannelCfg::from(&cfg);
        assert_eq!(ch.condition, Condition::Below);
        assert_eq!(ch.cooldown, Duration::from_secs(45));
        assert_eq!(ch.pulse, Duration::from_millis(1_500));
        assert_eq!(ch.required_consecutive, 4);
    }

    #[test]
    fn default_filter_maps_field_for_field() {
        let f = FilterCfg::from(&hydro_config::FilterCfg::default());
        assert_eq!(f.window, 5);
        assert_eq!(f.min_samples, 1);
        assert!(f.reject_negative);
    }
}
