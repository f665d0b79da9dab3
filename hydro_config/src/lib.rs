#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration-point parsing for the hydro rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The calibration CSV loader enforces exact headers and rejects
//!   malformed or duplicated point indices before any fitting happens.
//! - Persisted calibration results round-trip through a small TOML file
//!   written atomically.
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest calibration point index (three-point mode).
pub const MAX_POINT_INDEX: u32 = 3;

/// Calibration CSV schema.
///
/// Expected headers:
/// point_index,reference_value,voltage
///
/// Example:
/// point_index,reference_value,voltage
/// 1,4.0,1.62
/// 2,7.0,1.45
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct CalibrationPointRow {
    pub point_index: u32,
    pub reference_value: f64,
    pub voltage: f64,
}

/// Probes the calibration engine knows how to model.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Ph,
    #[serde(alias = "do")]
    DissolvedOxygen,
    Tds,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Ph,
        SensorKind::DissolvedOxygen,
        SensorKind::Tds,
    ];

    /// Stream name used for observations of this probe.
    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Ph => "ph",
            SensorKind::DissolvedOxygen => "do",
            SensorKind::Tds => "tds",
        }
    }
}

impl std::str::FromStr for SensorKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ph" => Ok(SensorKind::Ph),
            "do" | "dissolved_oxygen" => Ok(SensorKind::DissolvedOxygen),
            "tds" => Ok(SensorKind::Tds),
            other => eyre::bail!("unknown sensor '{other}' (expected ph, do or tds)"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    /// Moving-average window per sensor (samples).
    pub window: usize,
    /// Minimum buffered samples before channels are evaluated.
    pub min_samples: usize,
    /// Reject samples farther than this many standard deviations from the
    /// buffer mean. 0.0 disables outlier rejection.
    pub outlier_sigma: f64,
    /// Drop negative readings before they reach the buffer.
    pub reject_negative: bool,
    /// Extra streams buffered for status although no channel watches them
    /// (e.g. "temperature"). Anything else is dropped on arrival.
    pub track: Vec<String>,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            window: 5,
            min_samples: 1,
            outlier_sigma: 0.0,
            reject_negative: true,
            track: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Below,
    Above,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelCfg {
    pub name: String,
    /// Observation stream this channel watches ("ph", "tds", ...).
    pub sensor: String,
    pub condition: Condition,
    pub trigger_on: f64,
    pub trigger_off: f64,
    #[serde(default = "default_required_consecutive")]
    pub required_consecutive: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
    /// 1-based relay index on the actuator board.
    pub relay_channel: u8,
}

fn default_required_consecutive() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_pulse_ms() -> u64 {
    2_000
}

/// Channels wired on the reference rig: pH up on relay 3, pH down on relay 2,
/// leafy-green nutrient mix on relay 1.
pub fn default_channels() -> Vec<ChannelCfg> {
    vec![
        ChannelCfg {
            name: "ph_up".into(),
            sensor: "ph".into(),
            condition: Condition::Below,
            trigger_on: 5.5,
            trigger_off: 5.8,
            required_consecutive: default_required_consecutive(),
            cooldown_ms: default_cooldown_ms(),
            pulse_ms: default_pulse_ms(),
            relay_channel: 3,
        },
        ChannelCfg {
            name: "ph_down".into(),
            sensor: "ph".into(),
            condition: Condition::Above,
            trigger_on: 7.0,
            trigger_off: 6.7,
            required_consecutive: default_required_consecutive(),
            cooldown_ms: default_cooldown_ms(),
            pulse_ms: default_pulse_ms(),
            relay_channel: 2,
        },
        ChannelCfg {
            name: "nutrient".into(),
            sensor: "tds".into(),
            condition: Condition::Below,
            trigger_on: 675.0,
            trigger_off: 800.0,
            required_consecutive: default_required_consecutive(),
            cooldown_ms: default_cooldown_ms(),
            pulse_ms: default_pulse_ms(),
            relay_channel: 1,
        },
    ]
}

/// Required captured points per probe before a session may be applied.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CalibrationModes {
    pub ph: u8,
    #[serde(rename = "do", alias = "dissolved_oxygen")]
    pub dissolved_oxygen: u8,
    pub tds: u8,
}

impl Default for CalibrationModes {
    fn default() -> Self {
        Self {
            ph: 2,
            dissolved_oxygen: 1,
            tds: 1,
        }
    }
}

impl CalibrationModes {
    pub fn for_sensor(&self, sensor: SensorKind) -> u8 {
        match sensor {
            SensorKind::Ph => self.ph,
            SensorKind::DissolvedOxygen => self.dissolved_oxygen,
            SensorKind::Tds => self.tds,
        }
    }
}

/// Stored conversion coefficients: value = slope * voltage + offset.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PersistedCalibration {
    pub slope: f64,
    #[serde(default)]
    pub offset: f64,
    /// Water temperature the fit was computed at.
    #[serde(default = "default_reference_temperature_c")]
    pub reference_temperature_c: f64,
}

fn default_reference_temperature_c() -> f64 {
    25.0
}

/// Per-probe persisted calibrations; absent entries mean "uncalibrated".
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct CalibrationTables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<PersistedCalibration>,
    #[serde(
        rename = "do",
        alias = "dissolved_oxygen",
        skip_serializing_if = "Option::is_none"
    )]
    pub dissolved_oxygen: Option<PersistedCalibration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tds: Option<PersistedCalibration>,
}

impl CalibrationTables {
    pub fn get(&self, sensor: SensorKind) -> Option<PersistedCalibration> {
        match sensor {
            SensorKind::Ph => self.ph,
            SensorKind::DissolvedOxygen => self.dissolved_oxygen,
            SensorKind::Tds => self.tds,
        }
    }

    pub fn set(&mut self, sensor: SensorKind, cal: PersistedCalibration) {
        match sensor {
            SensorKind::Ph => self.ph = Some(cal),
            SensorKind::DissolvedOxygen => self.dissolved_oxygen = Some(cal),
            SensorKind::Tds => self.tds = Some(cal),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Observation cadence for the polling loop (ms).
    pub poll_ms: u64,
    /// Water temperature used for temperature-compensated conversion.
    pub water_temperature_c: f64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            poll_ms: 2_000,
            water_temperature_c: 25.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// BCM pin per relay, index 0 = relay 1.
    pub relay_pins: Vec<u8>,
    /// Relay boards that energise on a low level.
    pub active_low: bool,
    /// ADC channel wired to each probe.
    pub ph_adc_channel: u8,
    pub tds_adc_channel: u8,
    pub do_adc_channel: u8,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            relay_pins: vec![19, 18, 27, 23, 14, 15, 12, 26, 13],
            active_low: true,
            ph_adc_channel: 0,
            tds_adc_channel: 1,
            do_adc_channel: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelCfg>,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub calibration_modes: CalibrationModes,
    /// Optional persisted calibrations; a `--calibration` file overrides these.
    #[serde(default)]
    pub calibration: CalibrationTables,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: FilterCfg::default(),
            channels: default_channels(),
            runner: RunnerCfg::default(),
            calibration_modes: CalibrationModes::default(),
            calibration: CalibrationTables::default(),
            logging: Logging::default(),
            hardware: Hardware::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_calibration_csv(path: &Path) -> eyre::Result<Vec<CalibrationPointRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["point_index", "reference_value", "voltage"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'point_index,reference_value,voltage', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<CalibrationPointRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationPointRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        validate_row(&row, idx + 2)?;
        // A repeated index replaces the earlier row, like a live re-capture.
        match rows.iter_mut().find(|r| r.point_index == row.point_index) {
            Some(prev) => *prev = row,
            None => rows.push(row),
        }
    }
    if rows.is_empty() {
        eyre::bail!("calibration CSV {:?} contains no points", path);
    }
    Ok(rows)
}

fn validate_row(row: &CalibrationPointRow, line: usize) -> eyre::Result<()> {
    if !(1..=MAX_POINT_INDEX).contains(&row.point_index) {
        eyre::bail!(
            "row {line}: point_index must be in 1..={MAX_POINT_INDEX}, got {}",
            row.point_index
        );
    }
    if !row.reference_value.is_finite() || !row.voltage.is_finite() {
        eyre::bail!("row {line}: reference_value and voltage must be finite");
    }
    Ok(())
}

/// Load a standalone calibration file (`[ph]`, `[do]`, `[tds]` tables).
/// A missing file yields empty tables.
pub fn load_calibration_file(path: &Path) -> eyre::Result<CalibrationTables> {
    if !path.exists() {
        return Ok(CalibrationTables::default());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read calibration file {:?}: {}", path, e))?;
    toml::from_str::<CalibrationTables>(&text)
        .map_err(|e| eyre::eyre!("parse calibration file {:?}: {}", path, e))
}

/// Write calibration tables via a temp file + rename so readers never see a
/// half-written file.
pub fn save_calibration_file(path: &Path, tables: &CalibrationTables) -> eyre::Result<()> {
    let text = toml::to_string_pretty(tables)
        .map_err(|e| eyre::eyre!("serialize calibration tables: {e}"))?;
    write_atomic(path, text.as_bytes())
        .map_err(|e| eyre::eyre!("write calibration file {:?}: {}", path, e))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let tmp = path.with_extension("new");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(tmp, path)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Filter
        if self.filter.window == 0 {
            eyre::bail!("filter.window must be >= 1");
        }
        if self.filter.window > 1_000 {
            eyre::bail!("filter.window is unreasonably large (>1000)");
        }
        if self.filter.min_samples == 0 || self.filter.min_samples > self.filter.window {
            eyre::bail!("filter.min_samples must be in [1, filter.window]");
        }
        if !self.filter.outlier_sigma.is_finite() || self.filter.outlier_sigma < 0.0 {
            eyre::bail!("filter.outlier_sigma must be >= 0.0 (0 disables)");
        }
        if let Some(i) = self.filter.track.iter().position(|s| s.trim().is_empty()) {
            eyre::bail!("filter.track[{i}] must not be empty");
        }

        // Channels
        if self.channels.is_empty() {
            eyre::bail!("at least one [[channels]] entry is required");
        }
        for (i, ch) in self.channels.iter().enumerate() {
            if ch.name.trim().is_empty() {
                eyre::bail!("channels[{i}].name must not be empty");
            }
            if self.channels[..i].iter().any(|c| c.name == ch.name) {
                eyre::bail!("channels[{i}].name '{}' is duplicated", ch.name);
            }
            if ch.sensor.trim().is_empty() {
                eyre::bail!("channels[{i}].sensor must not be empty");
            }
            if !ch.trigger_on.is_finite() || !ch.trigger_off.is_finite() {
                eyre::bail!("channels[{i}] triggers must be finite");
            }
            let dead_band_ok = match ch.condition {
                Condition::Below => ch.trigger_off > ch.trigger_on,
                Condition::Above => ch.trigger_off < ch.trigger_on,
            };
            if !dead_band_ok {
                eyre::bail!(
                    "channels[{i}].trigger_off must lie on the recovered side of trigger_on"
                );
            }
            if ch.required_consecutive == 0 {
                eyre::bail!("channels[{i}].required_consecutive must be >= 1");
            }
            if ch.pulse_ms == 0 {
                eyre::bail!("channels[{i}].pulse_ms must be >= 1");
            }
            if ch.pulse_ms > 10 * 60 * 1000 {
                eyre::bail!("channels[{i}].pulse_ms is unreasonably large (>10min)");
            }
            if ch.relay_channel == 0 {
                eyre::bail!("channels[{i}].relay_channel is 1-based and must be >= 1");
            }
        }

        // Calibration modes
        for sensor in SensorKind::ALL {
            let mode = self.calibration_modes.for_sensor(sensor);
            if !(1..=MAX_POINT_INDEX as u8).contains(&mode) {
                eyre::bail!(
                    "calibration_modes.{} must be 1, 2 or 3",
                    sensor.as_str()
                );
            }
            if let Some(cal) = self.calibration.get(sensor)
                && !(cal.slope.is_finite() && cal.offset.is_finite())
            {
                eyre::bail!("calibration.{} must be finite", sensor.as_str());
            }
        }

        // Runner
        if self.runner.poll_ms == 0 {
            eyre::bail!("runner.poll_ms must be >= 1");
        }
        if !(-5.0..=60.0).contains(&self.runner.water_temperature_c) {
            eyre::bail!("runner.water_temperature_c must be in [-5, 60]");
        }

        // Hardware
        if let Some(ch) = self
            .channels
            .iter()
            .find(|c| usize::from(c.relay_channel) > self.hardware.relay_pins.len())
        {
            eyre::bail!(
                "channel '{}' uses relay {} but hardware.relay_pins only maps {}",
                ch.name,
                ch.relay_channel,
                self.hardware.relay_pins.len()
            );
        }

        Ok(())
    }
}
