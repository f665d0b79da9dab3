//! Anti-fluctuation dosing controller.
//!
//! Observations are pushed in, relay events pop out. Per sensor stream the
//! controller keeps a moving average; per channel it keeps hysteresis state
//! (`active`), a consecutive-breach counter, the last activation time for
//! the cooldown, and a pulse slot that schedules the relay's auto-off.
//!
//! The controller is a single-writer state machine: every mutating call
//! takes `&mut self`, and nothing here blocks or spawns.

use std::collections::{BTreeMap, BTreeSet};

use crate::builder::DosingControllerBuilder;
use crate::config::{ChannelCfg, FilterCfg};
use crate::error::ControlError;
use crate::filter::MovingAverage;
use crate::status::{ChannelStatus, ControllerStatus, Decision, SensorStatus, SkipReason};
use crate::types::{DosingAction, DosingEvent, Observation, SensorId};
use crate::util::elapsed_ms;

/// Relay auto-off slot for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulseState {
    #[default]
    Idle,
    /// Relay energised; a Deactivate is owed at `off_at_ms`.
    Pulsing { off_at_ms: u64 },
}

#[derive(Debug, Clone, Default)]
struct ChannelState {
    active: bool,
    consecutive_breaches: u32,
    last_activation_ms: Option<u64>,
    pulse: PulseState,
}

#[derive(Debug, Clone)]
struct Channel {
    cfg: ChannelCfg,
    sensor: SensorId,
    state: ChannelState,
}

impl Channel {
    fn event(&self, action: DosingAction, at_ms: u64) -> DosingEvent {
        DosingEvent {
            channel: self.cfg.name.clone(),
            relay_channel: self.cfg.relay_channel,
            action,
            at_ms,
        }
    }

    /// Apply one averaged sample; pushes any relay events into `out`.
    fn evaluate(&mut self, avg: f64, now_ms: u64, out: &mut Vec<DosingEvent>) {
        let breached = self.cfg.is_breached(avg);
        let should_deactivate = self.state.active && self.cfg.is_recovered(avg);

        if should_deactivate {
            self.state.active = false;
            self.state.consecutive_breaches = 0;
            tracing::debug!(channel = %self.cfg.name, avg, "hysteresis released");
        } else if breached && !self.state.active {
            self.state.consecutive_breaches = self.state.consecutive_breaches.saturating_add(1);
            tracing::trace!(
                channel = %self.cfg.name,
                avg,
                breaches = self.state.consecutive_breaches,
                "breach confirmed"
            );
        } else {
            self.state.consecutive_breaches = 0;
        }

        let cooled_down = self
            .state
            .last_activation_ms
            .is_none_or(|t| elapsed_ms(now_ms, t) > self.cfg.cooldown_ms());
        if self.state.consecutive_breaches >= self.cfg.required_consecutive
            && !self.state.active
            && cooled_down
        {
            self.fire(avg, now_ms, out);
        }
    }

    fn fire(&mut self, avg: f64, now_ms: u64, out: &mut Vec<DosingEvent>) {
        // A pulse still owed an off (cooldown shorter than the pulse, or the
        // scheduler has not polled yet) is closed before the new one starts.
        if let PulseState::Pulsing { .. } = self.state.pulse {
            out.push(self.event(DosingAction::Deactivate, now_ms));
        }
        let off_at_ms = now_ms.saturating_add(self.cfg.pulse_ms());
        self.state.active = true;
        self.state.consecutive_breaches = 0;
        self.state.last_activation_ms = Some(now_ms);
        self.state.pulse = PulseState::Pulsing { off_at_ms };
        out.push(self.event(DosingAction::Activate, now_ms));
        tracing::info!(
            channel = %self.cfg.name,
            relay = self.cfg.relay_channel,
            avg,
            pulse_ms = self.cfg.pulse_ms(),
            "dosing pulse fired"
        );
    }

    /// Emit the owed Deactivate if the pulse is due. Runs at most once per pulse.
    fn poll_pulse(&mut self, now_ms: u64) -> Option<DosingEvent> {
        match self.state.pulse {
            PulseState::Pulsing { off_at_ms } if now_ms >= off_at_ms => {
                self.state.pulse = PulseState::Idle;
                tracing::debug!(channel = %self.cfg.name, "pulse complete");
                Some(self.event(DosingAction::Deactivate, now_ms))
            }
            _ => None,
        }
    }

    /// Cancel any pending pulse and drop hysteresis state. The cooldown
    /// reference is kept so a reset cannot be used to dose back-to-back.
    fn reset(&mut self, now_ms: u64) -> Option<DosingEvent> {
        let cancelled = matches!(self.state.pulse, PulseState::Pulsing { .. })
            .then(|| self.event(DosingAction::Deactivate, now_ms));
        self.state = ChannelState {
            last_activation_ms: self.state.last_activation_ms,
            ..ChannelState::default()
        };
        cancelled
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus {
            name: self.cfg.name.clone(),
            sensor: self.sensor.clone(),
            relay_channel: self.cfg.relay_channel,
            active: self.state.active,
            consecutive_breaches: self.state.consecutive_breaches,
            last_activation_ms: self.state.last_activation_ms,
            pulse_off_at_ms: match self.state.pulse {
                PulseState::Idle => None,
                PulseState::Pulsing { off_at_ms } => Some(off_at_ms),
            },
        }
    }
}

/// Owns every channel's state and a moving-average window per tracked sensor.
#[derive(Debug, Clone)]
pub struct DosingController {
    filter: FilterCfg,
    channels: Vec<Channel>,
    /// Sensors that get a buffer: every channel's sensor plus extra streams.
    tracked: BTreeSet<SensorId>,
    buffers: BTreeMap<SensorId, MovingAverage>,
    override_mode: bool,
}

impl DosingController {
    /// Start building a controller.
    pub fn builder() -> DosingControllerBuilder {
        DosingControllerBuilder::default()
    }

    /// Assemble from already-validated parts (see the builder).
    pub(crate) fn from_parts(
        filter: FilterCfg,
        channels: Vec<ChannelCfg>,
        extra_sensors: impl IntoIterator<Item = SensorId>,
    ) -> Self {
        let channels: Vec<Channel> = channels
            .into_iter()
            .map(|cfg| Channel {
                sensor: SensorId::new(cfg.sensor.clone()),
                cfg,
                state: ChannelState::default(),
            })
            .collect();
        let tracked = channels
            .iter()
            .map(|c| c.sensor.clone())
            .chain(extra_sensors)
            .collect();
        Self {
            filter,
            channels,
            tracked,
            buffers: BTreeMap::new(),
            override_mode: false,
        }
    }

    pub fn filter_cfg(&self) -> &FilterCfg {
        &self.filter
    }

    /// Deliver one observation and evaluate every channel bound to its sensor.
    /// Streams that are not tracked are dropped without allocating a buffer.
    pub fn observe(&mut self, obs: &Observation) -> Decision {
        if !self.tracked.contains(&obs.sensor) {
            tracing::trace!(sensor = %obs.sensor, "untracked sensor ignored");
            return Decision::Skipped(SkipReason::Unbound);
        }
        let window = self.filter.window;
        let buf = self
            .buffers
            .entry(obs.sensor.clone())
            .or_insert_with(|| MovingAverage::new(window));

        if let Err(reason) = buf.admit(obs.value, &self.filter) {
            tracing::warn!(sensor = %obs.sensor, value = obs.value, ?reason, "sample rejected");
            return Decision::Skipped(SkipReason::Rejected(reason));
        }
        let avg = buf.push(obs.value);
        let samples = buf.len();
        tracing::trace!(sensor = %obs.sensor, value = obs.value, avg, samples, "sample buffered");

        if !avg.is_finite() {
            return Decision::Skipped(SkipReason::NoData);
        }
        if self.override_mode {
            return Decision::Skipped(SkipReason::Override);
        }
        if samples < self.filter.min_samples {
            return Decision::Skipped(SkipReason::WarmingUp {
                have: samples,
                need: self.filter.min_samples,
            });
        }

        let mut events = Vec::new();
        for ch in self.channels.iter_mut().filter(|c| c.sensor == obs.sensor) {
            ch.evaluate(avg, obs.at_ms, &mut events);
        }
        Decision::Evaluated {
            average: avg,
            events,
        }
    }

    /// Emit every pulse auto-off that is due at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<DosingEvent> {
        self.channels
            .iter_mut()
            .filter_map(|ch| ch.poll_pulse(now_ms))
            .collect()
    }

    /// Earliest pending pulse deadline, if any relay is energised.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.channels
            .iter()
            .filter_map(|ch| match ch.state.pulse {
                PulseState::Pulsing { off_at_ms } => Some(off_at_ms),
                PulseState::Idle => None,
            })
            .min()
    }

    /// Clear one channel mid-pulse. Returns the Deactivate for a cancelled
    /// pulse so the relay is never left energised.
    pub fn reset_channel(
        &mut self,
        name: &str,
        now_ms: u64,
    ) -> Result<Option<DosingEvent>, ControlError> {
        let ch = self
            .channels
            .iter_mut()
            .find(|c| c.cfg.name == name)
            .ok_or_else(|| ControlError::UnknownChannel(name.to_string()))?;
        let ev = ch.reset(now_ms);
        tracing::info!(channel = name, cancelled_pulse = ev.is_some(), "channel reset");
        Ok(ev)
    }

    /// Reset every channel and empty every moving-average window.
    pub fn reset_all(&mut self, now_ms: u64) -> Vec<DosingEvent> {
        self.buffers.clear();
        self.channels
            .iter_mut()
            .filter_map(|ch| ch.reset(now_ms))
            .collect()
    }

    /// Suspend (or resume) automatic evaluation. Buffers keep filling and
    /// in-flight pulses still complete through `poll`.
    pub fn set_override(&mut self, on: bool) {
        if self.override_mode != on {
            tracing::info!(override_mode = on, "manual override changed");
        }
        self.override_mode = on;
    }

    pub fn override_mode(&self) -> bool {
        self.override_mode
    }

    /// Current moving average of `sensor`, if it has samples.
    pub fn average(&self, sensor: &str) -> Option<f64> {
        self.buffers
            .get(&SensorId::new(sensor))
            .map(MovingAverage::average)
            .filter(|a| a.is_finite())
    }

    /// Sensors that keep a moving average, in sorted order.
    pub fn tracked_sensors(&self) -> impl Iterator<Item = &SensorId> {
        self.tracked.iter()
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.cfg.name.as_str())
    }

    pub fn status(&self) -> ControllerStatus {
        let sensors = self
            .tracked
            .iter()
            .map(|id| match self.buffers.get(id) {
                Some(buf) => SensorStatus {
                    sensor: id.clone(),
                    average: Some(buf.average()).filter(|a| a.is_finite()),
                    samples: buf.len(),
                },
                None => SensorStatus {
                    sensor: id.clone(),
                    average: None,
                    samples: 0,
                },
            })
            .collect();
        ControllerStatus {
            override_mode: self.override_mode,
            sensors,
            channels: self.channels.iter().map(Channel::status).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Condition;

    fn ph_up() -> ChannelCfg {
        ChannelCfg::new("ph_up", "ph", Condition::Below, 5.5, 5.8, 3)
    }

    fn controller(window: usize) -> DosingController {
        DosingController::from_parts(
            FilterCfg {
                window,
                ..FilterCfg::default()
            },
            vec![ph_up()],
            [SensorId::new("temperature")],
        )
    }

    #[test]
    fn fires_once_and_schedules_auto_off() {
        let mut c = controller(1);
        assert!(c.observe(&Observation::new("ph", 5.0, 0)).events().is_empty());
        assert!(c.observe(&Observation::new("ph", 5.0, 1_000)).events().is_empty());
        let fired = c.observe(&Observation::new("ph", 5.0, 2_000)).into_events();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].action, DosingAction::Activate);
        assert_eq!(fired[0].relay_channel, 3);
        assert_eq!(c.next_deadline_ms(), Some(4_000));

        assert!(c.poll(3_999).is_empty());
        let off = c.poll(4_000);
        assert_eq!(off.len(), 1);
        assert_eq!(off[0].action, DosingAction::Deactivate);
        // Exactly once.
        assert!(c.poll(10_000).is_empty());
        assert_eq!(c.next_deadline_ms(), None);
    }

    #[test]
    fn tracked_sensor_without_channel_is_buffered_but_fires_nothing() {
        let mut c = controller(3);
        let d = c.observe(&Observation::new("temperature", 24.0, 0));
        assert_eq!(
            d,
            Decision::Evaluated {
                average: 24.0,
                events: vec![]
            }
        );
        assert_eq!(c.average("temperature"), Some(24.0));
    }

    #[test]
    fn untracked_sensors_never_allocate_a_buffer() {
        let mut c = controller(3);
        for i in 0..10_000u64 {
            let d = c.observe(&Observation::new(format!("stray_{i}").as_str(), 1.0, i));
            assert_eq!(d, Decision::Skipped(SkipReason::Unbound));
        }
        assert_eq!(c.buffers.len(), 0);
        let st = c.status();
        let names: Vec<&str> = st.sensors.iter().map(|s| s.sensor.as_str()).collect();
        assert_eq!(names, ["ph", "temperature"]);
        assert_eq!(c.average("stray_0"), None);
    }

    #[test]
    fn reset_keeps_cooldown_reference() {
        let mut c = controller(1);
        for t in [0, 1, 2] {
            c.observe(&Observation::new("ph", 5.0, t));
        }
        let ev = c.reset_channel("ph_up", 3).unwrap();
        assert!(ev.is_some());
        let st = c.status();
        assert!(!st.channels[0].active);
        assert_eq!(st.channels[0].last_activation_ms, Some(2));

        // Inside cooldown: three fresh breaches do not fire.
        for t in [4, 5, 6] {
            assert!(c.observe(&Observation::new("ph", 5.0, t)).events().is_empty());
        }
        // Past the 30 s cooldown the pending confirmation fires on the next breach.
        let later = 2 + 30_000 + 1;
        let fired = c.observe(&Observation::new("ph", 5.0, later)).into_events();
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn status_lists_bound_sensors_before_first_sample() {
        let c = controller(5);
        let st = c.status();
        assert_eq!(st.sensors.len(), 2);
        assert_eq!(st.sensors[0].sensor.as_str(), "ph");
        assert_eq!(st.sensors[0].average, None);
        assert_eq!(st.sensors[1].samples, 0);
        assert!(!st.override_mode);
    }
}
