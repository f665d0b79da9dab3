//! Simulated probe and relay for dry runs and tests.

use std::collections::BTreeMap;

use hydro_traits::{Probe, Relay};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adc::{counts_to_volts, volts_to_count};
use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct SimChannel {
    volts: f64,
    noise_v: f64,
    drift_v_per_read: f64,
}

/// Probe front end that synthesises 12-bit ADC samples around a set voltage.
///
/// Each read averages `oversample` noisy counts, the same way the sensor
/// node firmware does, so quantisation shows up in the output.
#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    channels: BTreeMap<u8, SimChannel>,
    oversample: u32,
    rng: StdRng,
}

impl SimulatedProbe {
    pub fn new(seed: u32) -> Self {
        Self {
            channels: BTreeMap::new(),
            oversample: 10,
            rng: StdRng::seed_from_u64(u64::from(seed)),
        }
    }

    /// Wire a probe to `channel`, reading `volts` with no noise or drift.
    pub fn with_channel(mut self, channel: u8, volts: f64) -> Self {
        self.channels.insert(
            channel,
            SimChannel {
                volts,
                noise_v: 0.0,
                drift_v_per_read: 0.0,
            },
        );
        self
    }

    /// Uniform noise amplitude (volts, +/-) on each raw sample.
    pub fn with_noise(mut self, channel: u8, noise_v: f64) -> Self {
        if let Some(ch) = self.channels.get_mut(&channel) {
            ch.noise_v = noise_v.abs();
        }
        self
    }

    /// Voltage added after every read, to mimic a drifting reservoir.
    pub fn with_drift(mut self, channel: u8, drift_v_per_read: f64) -> Self {
        if let Some(ch) = self.channels.get_mut(&channel) {
            ch.drift_v_per_read = drift_v_per_read;
        }
        self
    }

    pub fn with_oversample(mut self, n: u32) -> Self {
        self.oversample = n.max(1);
        self
    }

    pub fn set_voltage(&mut self, channel: u8, volts: f64) -> Result<(), HwError> {
        let ch = self
            .channels
            .get_mut(&channel)
            .ok_or(HwError::UnknownChannel(channel))?;
        ch.volts = volts;
        Ok(())
    }
}

impl Probe for SimulatedProbe {
    fn read_voltage(&mut self, channel: u8) -> Result<f64, BoxError> {
        let ch = *self
            .channels
            .get(&channel)
            .ok_or(HwError::UnknownChannel(channel))?;
        let mut sum = 0u64;
        for _ in 0..self.oversample {
            let v = self.rng.gen_range(-1.0..1.0f64).mul_add(ch.noise_v, ch.volts);
            sum += u64::from(volts_to_count(v));
        }
        let volts = counts_to_volts(sum, self.oversample);
        if let Some(c) = self.channels.get_mut(&channel) {
            c.volts += c.drift_v_per_read;
        }
        tracing::trace!(channel, volts, "simulated probe read");
        Ok(volts)
    }
}

/// Relay board stand-in: tracks state per 1-based channel and keeps a history.
#[derive(Debug, Clone)]
pub struct SimulatedRelay {
    states: Vec<bool>,
    history: Vec<(u8, bool)>,
}

impl SimulatedRelay {
    pub fn new(channels: u8) -> Self {
        Self {
            states: vec![false; usize::from(channels)],
            history: Vec::new(),
        }
    }

    pub fn is_on(&self, relay_channel: u8) -> bool {
        relay_channel
            .checked_sub(1)
            .and_then(|i| self.states.get(usize::from(i)))
            .copied()
            .unwrap_or(false)
    }

    /// Every accepted command in order.
    pub fn history(&self) -> &[(u8, bool)] {
        &self.history
    }

    pub fn any_on(&self) -> bool {
        self.states.iter().any(|s| *s)
    }
}

impl Relay for SimulatedRelay {
    fn set(&mut self, relay_channel: u8, on: bool) -> Result<(), BoxError> {
        let slot = relay_channel
            .checked_sub(1)
            .and_then(|i| self.states.get_mut(usize::from(i)))
            .ok_or(HwError::UnmappedRelay(relay_channel))?;
        *slot = on;
        self.history.push((relay_channel, on));
        tracing::info!(relay = relay_channel, on, "relay (simulated)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_probe_reads_quantised_setpoint() {
        let mut p = SimulatedProbe::new(7).with_channel(0, 1.5);
        let v = p.read_voltage(0).unwrap();
        assert!((v - 1.5).abs() < 0.001, "{v}");
    }

    #[test]
    fn drift_moves_subsequent_reads() {
        let mut p = SimulatedProbe::new(7)
            .with_channel(1, 1.0)
            .with_drift(1, -0.1);
        let a = p.read_voltage(1).unwrap();
        let b = p.read_voltage(1).unwrap();
        assert!(b < a);
    }

    #[test]
    fn same_seed_replays_the_same_noise() {
        let probe = |seed| {
            SimulatedProbe::new(seed)
                .with_channel(0, 1.5)
                .with_noise(0, 0.05)
        };
        let (mut a, mut b) = (probe(42), probe(42));
        for _ in 0..5 {
            let (va, vb) = (a.read_voltage(0).unwrap(), b.read_voltage(0).unwrap());
            assert_eq!(va, vb);
            assert!((va - 1.5).abs() <= 0.051, "{va}");
        }
    }

    #[test]
    fn relay_zero_is_unmapped() {
        let mut r = SimulatedRelay::new(3);
        assert!(r.set(0, true).is_err());
        assert!(!r.is_on(0));
    }
}
