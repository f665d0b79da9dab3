//! `calibrate` and `convert` subcommands.

use std::path::Path;

use eyre::WrapErr;
use hydro_config::{CalibrationTables, Config, PersistedCalibration, SensorKind};
use hydro_core::{CalibrationEngine, CalibrationError, CalibrationResult, PointMode};

use crate::cli::PointArg;

/// Where the captured points come from.
pub enum PointSource<'a> {
    Csv(&'a Path),
    Inline(&'a [PointArg]),
}

pub struct CalibrateArgs<'a> {
    pub sensor: SensorKind,
    pub points: PointSource<'a>,
    pub mode: Option<u8>,
    pub temp_c: f64,
    pub save: Option<&'a Path>,
}

/// Replay the points through a capture session and apply the fit.
pub fn run_calibrate(cfg: &Config, args: &CalibrateArgs<'_>) -> eyre::Result<CalibrationResult> {
    let mode_n = args
        .mode
        .unwrap_or_else(|| cfg.calibration_modes.for_sensor(args.sensor));
    let mode = PointMode::try_from(mode_n)?;

    let points: Vec<PointArg> = match args.points {
        PointSource::Csv(path) => hydro_config::load_calibration_csv(path)?
            .iter()
            .map(|r| PointArg {
                point_index: r.point_index,
                reference_value: r.reference_value,
                voltage: r.voltage,
            })
            .collect(),
        PointSource::Inline(points) => points.to_vec(),
    };

    let mut engine = CalibrationEngine::new(args.sensor, mode);
    if let Some(prev) = cfg.calibration.get(args.sensor) {
        engine = engine.with_active(CalibrationResult::from_persisted(args.sensor, &prev));
    }
    for p in &points {
        // Each point is captured against the voltage read while in its solution.
        engine.observe_voltage(p.voltage);
        engine.capture(p.point_index, p.reference_value)?;
    }
    if !engine.is_ready() {
        tracing::warn!(
            sensor = args.sensor.as_str(),
            have = engine.session().points().len(),
            need = mode.count(),
            "calibration session incomplete"
        );
        return Err(
            eyre::Report::new(CalibrationError::InsufficientPoints).wrap_err(format!(
                "{} calibration needs {} point(s), got {}",
                args.sensor.as_str(),
                mode.count(),
                engine.session().points().len()
            )),
        );
    }
    let result = engine.apply(args.temp_c)?;

    if let Some(path) = args.save {
        let mut tables = hydro_config::load_calibration_file(path)?;
        tables.set(args.sensor, result.to_persisted());
        hydro_config::save_calibration_file(path, &tables)?;
        tracing::info!(sensor = args.sensor.as_str(), path = %path.display(), "calibration saved");
    }
    Ok(result)
}

/// Calibration tables from `--calibration FILE`, else the config's own.
pub fn resolve_tables(cfg: &Config, file: Option<&Path>) -> eyre::Result<CalibrationTables> {
    match file {
        Some(path) => {
            if !path.exists() {
                eyre::bail!("calibration file {} does not exist", path.display());
            }
            hydro_config::load_calibration_file(path)
        }
        None => Ok(cfg.calibration),
    }
}

pub fn lookup(tables: &CalibrationTables, sensor: SensorKind) -> eyre::Result<PersistedCalibration> {
    tables
        .get(sensor)
        .ok_or_else(|| eyre::eyre!("no calibration stored for {}", sensor.as_str()))
}

pub fn run_convert(
    tables: &CalibrationTables,
    sensor: SensorKind,
    voltage: f64,
    temp_c: f64,
) -> eyre::Result<f64> {
    if !voltage.is_finite() || !temp_c.is_finite() {
        return Err(eyre::Report::new(CalibrationError::NonFiniteInput));
    }
    let cal = CalibrationResult::from_persisted(sensor, &lookup(tables, sensor)?);
    Ok(cal.convert_compensated(voltage, temp_c))
}

pub fn result_json(r: &CalibrationResult) -> serde_json::Value {
    serde_json::json!({
        "sensor": r.sensor.as_str(),
        "slope": r.slope,
        "offset": r.offset,
        "reference_temperature_c": r.reference_temperature_c,
        "points_used": r.points_used,
    })
}

#[derive(serde::Serialize)]
struct Snippet {
    calibration: CalibrationTables,
}

/// TOML snippet ready to paste into the config file.
pub fn result_toml(r: &CalibrationResult) -> eyre::Result<String> {
    let mut calibration = CalibrationTables::default();
    calibration.set(r.sensor, r.to_persisted());
    toml::to_string_pretty(&Snippet { calibration }).wrap_err("serialize calibration")
}
