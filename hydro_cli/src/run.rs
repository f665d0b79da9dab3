//! `run` subcommand: controller assembly, observation sources and the loop.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::WrapErr;
use hydro_config::{CalibrationTables, Config, SensorKind};
use hydro_core::runner::{self, RunOptions, RunSummary};
use hydro_core::{
    CalibrationResult, ChannelCfg, DosingController, DosingEvent, FilterCfg, Observation,
    default_tds_ppm,
};
use hydro_hardware::SimulatedProbe;
use hydro_traits::{MonotonicClock, Probe, Relay};
use serde::Deserialize;

use crate::cli::SimVoltage;

/// Build the controller from validated config via the core `From` impls.
pub fn build_controller(cfg: &Config, override_mode: bool) -> eyre::Result<DosingController> {
    let filter: FilterCfg = (&cfg.filter).into();
    let channels: Vec<ChannelCfg> = cfg.channels.iter().map(ChannelCfg::from).collect();
    DosingController::builder()
        .with_filter(filter)
        .with_channels(channels)
        .with_tracked_sensors(cfg.filter.track.iter().cloned())
        .with_override(override_mode)
        .try_build()
}

/// Relay sink for this build: GPIO with the `hardware` feature, otherwise
/// the simulated board.
pub fn make_relay(cfg: &Config) -> eyre::Result<Box<dyn Relay>> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let bank =
            hydro_hardware::GpioRelayBank::new(&cfg.hardware.relay_pins, cfg.hardware.active_low)?;
        Ok(Box::new(bank))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let n = u8::try_from(cfg.hardware.relay_pins.len()).unwrap_or(u8::MAX);
        Ok(Box::new(hydro_hardware::SimulatedRelay::new(n)))
    }
}

/// One JSON line on stdin.
#[derive(Debug, Deserialize)]
struct ObservationLine {
    sensor: String,
    value: f64,
    at_ms: u64,
}

/// Parse JSON-line observations. Blank lines are skipped; a malformed line
/// aborts with its line number.
pub fn parse_observations(input: impl BufRead) -> eyre::Result<Vec<Observation>> {
    let mut out = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line.wrap_err("read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: ObservationLine = serde_json::from_str(&line)
            .wrap_err_with(|| format!("invalid observation on line {}", idx + 1))?;
        out.push(Observation::new(rec.sensor.as_str(), rec.value, rec.at_ms));
    }
    Ok(out)
}

pub fn event_json(ev: &DosingEvent) -> serde_json::Value {
    serde_json::json!({
        "channel": ev.channel,
        "relay": ev.relay_channel,
        "action": if ev.action.is_on() { "activate" } else { "deactivate" },
        "at_ms": ev.at_ms,
    })
}

pub fn summary_json(s: &RunSummary) -> serde_json::Value {
    serde_json::json!({
        "ticks": s.ticks,
        "observations": s.observations,
        "rejected": s.rejected,
        "activations": s.activations,
        "deactivations": s.deactivations,
        "relay_errors": s.relay_errors,
    })
}

/// Replay stdin observations; each event is printed as it is dispatched.
pub fn run_replay(
    controller: &mut DosingController,
    relay: &mut dyn Relay,
    observations: Vec<Observation>,
    json: bool,
) -> RunSummary {
    runner::replay_with(controller, relay, observations, |ev| {
        if json {
            println!("{}", event_json(ev));
        } else {
            let action = if ev.action.is_on() { "ON " } else { "OFF" };
            println!(
                "{:>8} ms  {action}  {} (relay {})",
                ev.at_ms, ev.channel, ev.relay_channel
            );
        }
    })
}

/// Voltage-to-value mapping for one sampled sensor.
#[derive(Debug, Clone, Copy)]
enum Conversion {
    Calibrated(CalibrationResult),
    /// Uncalibrated TDS probe read through the factory curve.
    FactoryTds,
}

impl Conversion {
    fn value(&self, volts: f64, water_c: f64) -> f64 {
        match self {
            Conversion::Calibrated(cal) => cal.convert_compensated(volts, water_c),
            Conversion::FactoryTds => default_tds_ppm(volts, water_c),
        }
    }
}

/// Probe channel and conversion for every sensor that can be sampled.
struct Sampled {
    kind: SensorKind,
    adc_channel: u8,
    conversion: Conversion,
}

fn sampled_sensors(cfg: &Config, tables: &CalibrationTables) -> Vec<Sampled> {
    SensorKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let adc_channel = match kind {
                SensorKind::Ph => cfg.hardware.ph_adc_channel,
                SensorKind::DissolvedOxygen => cfg.hardware.do_adc_channel,
                SensorKind::Tds => cfg.hardware.tds_adc_channel,
            };
            let conversion = match (tables.get(kind), kind) {
                (Some(p), _) => Conversion::Calibrated(CalibrationResult::from_persisted(kind, &p)),
                (None, SensorKind::Tds) => {
                    tracing::info!(
                        sensor = kind.as_str(),
                        "no calibration stored; using factory curve"
                    );
                    Conversion::FactoryTds
                }
                (None, _) => {
                    tracing::warn!(sensor = kind.as_str(), "no calibration stored; not sampled");
                    return None;
                }
            };
            Some(Sampled {
                kind,
                adc_channel,
                conversion,
            })
        })
        .collect()
}

/// Default simulated probe voltages, overridden per sensor from the CLI.
fn simulated_probe(sensors: &[Sampled], overrides: &[SimVoltage]) -> SimulatedProbe {
    let mut probe = SimulatedProbe::new(0x5EED);
    for s in sensors {
        let default_v = match s.kind {
            SensorKind::Ph => 1.5,
            SensorKind::DissolvedOxygen => 1.0,
            SensorKind::Tds => 1.0,
        };
        let volts = overrides
            .iter()
            .rev()
            .find(|o| o.sensor == s.kind)
            .map_or(default_v, |o| o.volts);
        probe = probe
            .with_channel(s.adc_channel, volts)
            .with_noise(s.adc_channel, 0.005);
    }
    probe
}

pub struct LiveArgs<'a> {
    pub tables: &'a CalibrationTables,
    pub poll: Duration,
    pub max_ticks: Option<u64>,
    pub sim_voltage: &'a [SimVoltage],
}

/// Poll the (simulated) probe on a fixed cadence until Ctrl-C or the tick limit.
pub fn run_live(
    cfg: &Config,
    controller: &mut DosingController,
    relay: &mut dyn Relay,
    args: &LiveArgs<'_>,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<RunSummary> {
    let sensors = sampled_sensors(cfg, args.tables);
    let mut probe = simulated_probe(&sensors, args.sim_voltage);
    let water_c = cfg.runner.water_temperature_c;

    let source = |now_ms: u64| -> hydro_core::Result<Option<Vec<Observation>>> {
        let mut batch = Vec::with_capacity(sensors.len());
        for s in &sensors {
            match probe.read_voltage(s.adc_channel) {
                Ok(v) => {
                    let value = s.conversion.value(v, water_c);
                    tracing::debug!(sensor = s.kind.as_str(), volts = v, value, "probe sample");
                    batch.push(Observation::new(s.kind, value, now_ms));
                }
                Err(e) => {
                    tracing::warn!(sensor = s.kind.as_str(), error = %e, "probe read failed");
                }
            }
        }
        Ok(Some(batch))
    };

    let opts = RunOptions {
        poll: args.poll,
        max_ticks: args.max_ticks,
    };
    runner::run(controller, &MonotonicClock::new(), relay, source, opts, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_blank_lines_and_reports_bad_ones() {
        let ok = "{\"sensor\":\"ph\",\"value\":5.4,\"at_ms\":1000}\n\n{\"sensor\":\"tds\",\"value\":700,\"at_ms\":1000}\n";
        let obs = parse_observations(ok.as_bytes()).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].sensor.as_str(), "tds");

        let bad = "{\"sensor\":\"ph\",\"value\":5.4,\"at_ms\":1000}\nnot json\n";
        let err = parse_observations(bad.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn uncalibrated_ph_and_do_are_not_sampled() {
        let mut tables = CalibrationTables::default();
        tables.set(
            SensorKind::Ph,
            hydro_config::PersistedCalibration {
                slope: -5.0,
                offset: 13.0,
                reference_temperature_c: 25.0,
            },
        );
        let cfg = Config::default();
        let sensors = sampled_sensors(&cfg, &tables);
        let kinds: Vec<SensorKind> = sensors.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, [SensorKind::Ph, SensorKind::Tds]);
        assert!(matches!(sensors[0].conversion, Conversion::Calibrated(_)));
        assert_eq!(sensors[1].adc_channel, cfg.hardware.tds_adc_channel);
    }

    #[test]
    fn uncalibrated_tds_falls_back_to_the_factory_curve() {
        let sensors = sampled_sensors(&Config::default(), &CalibrationTables::default());
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].kind, SensorKind::Tds);
        let ppm = sensors[0].conversion.value(1.0, 25.0);
        assert!((ppm - 367.475).abs() < 1e-9, "{ppm}");
    }

    #[test]
    fn stored_tds_calibration_wins_over_the_factory_curve() {
        let mut tables = CalibrationTables::default();
        tables.set(
            SensorKind::Tds,
            hydro_config::PersistedCalibration {
                slope: 700.0,
                offset: 0.0,
                reference_temperature_c: 25.0,
            },
        );
        let sensors = sampled_sensors(&Config::default(), &tables);
        assert_eq!(sensors.len(), 1);
        assert!((sensors[0].conversion.value(1.0, 25.0) - 700.0).abs() < 1e-9);
    }

    #[test]
    fn default_config_builds_three_channels() {
        let c = build_controller(&Config::default(), false).unwrap();
        assert_eq!(c.channel_names().count(), 3);
    }

    #[test]
    fn filter_track_adds_status_streams() {
        let mut cfg = Config::default();
        cfg.filter.track = vec!["temperature".into()];
        let c = build_controller(&cfg, false).unwrap();
        let tracked: Vec<&str> = c.tracked_sensors().map(|s| s.as_str()).collect();
        assert_eq!(tracked, ["ph", "tds", "temperature"]);
    }
}
