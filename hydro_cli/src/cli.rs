//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use hydro_config::SensorKind;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "hydro", version, about = "Hydroponic probe calibration and dosing control")]
pub struct Cli {
    /// Path to config TOML; built-in rig defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and print results as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins, then
    /// this flag, then [logging] level, then "warn"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// One `INDEX:REFERENCE:VOLTS` triple from the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointArg {
    pub point_index: u32,
    pub reference_value: f64,
    pub voltage: f64,
}

impl std::str::FromStr for PointArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [idx, reference, volts] = parts.as_slice() else {
            return Err(format!("expected INDEX:REFERENCE:VOLTS, got '{s}'"));
        };
        Ok(Self {
            point_index: idx
                .parse()
                .map_err(|e| format!("point index '{idx}': {e}"))?,
            reference_value: reference
                .parse()
                .map_err(|e| format!("reference value '{reference}': {e}"))?,
            voltage: volts
                .parse()
                .map_err(|e| format!("voltage '{volts}': {e}"))?,
        })
    }
}

/// `SENSOR=VOLTS` override for the simulated probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimVoltage {
    pub sensor: SensorKind,
    pub volts: f64,
}

impl std::str::FromStr for SimVoltage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sensor, volts) = s
            .split_once('=')
            .ok_or_else(|| format!("expected SENSOR=VOLTS, got '{s}'"))?;
        Ok(Self {
            sensor: sensor.parse().map_err(|e: eyre::Report| e.to_string())?,
            volts: volts
                .trim()
                .parse()
                .map_err(|e| format!("voltage '{volts}': {e}"))?,
        })
    }
}

fn parse_sensor(s: &str) -> Result<SensorKind, String> {
    s.parse().map_err(|e: eyre::Report| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit a calibration from captured points and optionally persist it
    Calibrate {
        /// Probe to calibrate (ph, do, tds)
        #[arg(long, value_parser = parse_sensor)]
        sensor: SensorKind,
        /// CSV with headers point_index,reference_value,voltage
        #[arg(long, value_name = "FILE", conflicts_with = "point")]
        points: Option<PathBuf>,
        /// Inline point as INDEX:REFERENCE:VOLTS (repeatable)
        #[arg(long, value_name = "I:REF:V")]
        point: Vec<PointArg>,
        /// Required points (1-3); defaults to [calibration_modes] in the config
        #[arg(long)]
        mode: Option<u8>,
        /// Water temperature during capture, °C
        #[arg(long, value_name = "CELSIUS", default_value_t = 25.0, allow_negative_numbers = true)]
        temp: f64,
        /// Merge the result into this calibration TOML file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
    /// Convert a raw probe voltage with a stored calibration
    Convert {
        #[arg(long, value_parser = parse_sensor)]
        sensor: SensorKind,
        #[arg(long, value_name = "VOLTS", allow_negative_numbers = true)]
        voltage: f64,
        /// Water temperature for compensation (TDS); defaults to [runner] water_temperature_c
        #[arg(long, value_name = "CELSIUS", allow_negative_numbers = true)]
        temp: Option<f64>,
        /// Calibration TOML file; defaults to the config's [calibration] tables
        #[arg(long, value_name = "FILE")]
        calibration: Option<PathBuf>,
    },
    /// Drive the dosing controller
    Run {
        /// Read JSON-line observations from stdin instead of polling the probe
        #[arg(long, action = ArgAction::SetTrue)]
        stdin: bool,
        /// Stop after this many polling cycles
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Override [runner] poll_ms
        #[arg(long, value_name = "MS")]
        poll_ms: Option<u64>,
        /// Calibration TOML file; defaults to the config's [calibration] tables
        #[arg(long, value_name = "FILE")]
        calibration: Option<PathBuf>,
        /// Simulated probe voltage as SENSOR=VOLTS (repeatable)
        #[arg(long = "sim-voltage", value_name = "SENSOR=V")]
        sim_voltage: Vec<SimVoltage>,
        /// Start with manual override engaged (evaluate nothing)
        #[arg(long = "override", action = ArgAction::SetTrue)]
        override_mode: bool,
    },
    /// Validate config and report what would be driven
    SelfCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_arg_parses_triples() {
        let p: PointArg = "2: 7.0 :1.51".parse().unwrap();
        assert_eq!(
            p,
            PointArg {
                point_index: 2,
                reference_value: 7.0,
                voltage: 1.51
            }
        );
        assert!("2:7.0".parse::<PointArg>().is_err());
        assert!("x:7.0:1.5".parse::<PointArg>().is_err());
    }

    #[test]
    fn sim_voltage_parses_sensor_names() {
        let s: SimVoltage = "DO=1.25".parse().unwrap();
        assert_eq!(s.sensor, SensorKind::DissolvedOxygen);
        assert_eq!(s.volts, 1.25);
        assert!("ec=1.0".parse::<SimVoltage>().is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
