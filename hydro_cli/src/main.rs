#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod calibrate;
mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use hydro_config::Config;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::calibrate::{CalibrateArgs, PointSource};
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error hooks: {e}");
    }

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %err, "command failed");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            hydro_config::load_toml(&text).wrap_err("parse config")?
        }
        None => Config::default(),
    };
    cfg.validate().wrap_err("invalid config")?;
    Ok(cfg)
}

fn init_tracing(
    json: bool,
    level: Option<&str>,
    logging: &hydro_config::Logging,
) -> eyre::Result<()> {
    let level = level.or(logging.level.as_deref()).unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err("invalid log level")?;

    // Console goes to stderr so stdout stays machine-readable.
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "config loaded");

    match cli.cmd {
        Commands::Calibrate {
            sensor,
            points,
            point,
            mode,
            temp,
            save,
        } => {
            let source = match points.as_deref() {
                Some(path) => PointSource::Csv(path),
                None if !point.is_empty() => PointSource::Inline(&point),
                None => eyre::bail!("provide calibration points with --points FILE or --point I:REF:V"),
            };
            let result = calibrate::run_calibrate(
                &cfg,
                &CalibrateArgs {
                    sensor,
                    points: source,
                    mode,
                    temp_c: temp,
                    save: save.as_deref(),
                },
            )?;
            if cli.json {
                println!("{}", calibrate::result_json(&result));
            } else {
                print!("{}", calibrate::result_toml(&result)?);
            }
        }
        Commands::Convert {
            sensor,
            voltage,
            temp,
            calibration,
        } => {
            let tables = calibrate::resolve_tables(&cfg, calibration.as_deref())?;
            let temp_c = temp.unwrap_or(cfg.runner.water_temperature_c);
            let value = calibrate::run_convert(&tables, sensor, voltage, temp_c)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "sensor": sensor.as_str(), "voltage": voltage, "value": value })
                );
            } else {
                println!("{value:.4}");
            }
        }
        Commands::Run {
            stdin,
            max_ticks,
            poll_ms,
            calibration,
            sim_voltage,
            override_mode,
        } => {
            let mut controller = run::build_controller(&cfg, override_mode)?;
            let mut relay = run::make_relay(&cfg)?;
            let summary = if stdin {
                let observations = run::parse_observations(std::io::stdin().lock())?;
                run::run_replay(&mut controller, &mut *relay, observations, cli.json)
            } else {
                let shutdown = Arc::new(AtomicBool::new(false));
                {
                    let flag = Arc::clone(&shutdown);
                    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                        .wrap_err("install Ctrl-C handler")?;
                }
                let tables = calibrate::resolve_tables(&cfg, calibration.as_deref())?;
                let poll = Duration::from_millis(poll_ms.unwrap_or(cfg.runner.poll_ms).max(1));
                run::run_live(
                    &cfg,
                    &mut controller,
                    &mut *relay,
                    &run::LiveArgs {
                        tables: &tables,
                        poll,
                        max_ticks,
                        sim_voltage: &sim_voltage,
                    },
                    &shutdown,
                )?
            };
            if cli.json {
                println!("{}", run::summary_json(&summary));
            } else {
                println!(
                    "run complete: {} observations ({} rejected), {} activations, {} deactivations, {} relay errors",
                    summary.observations,
                    summary.rejected,
                    summary.activations,
                    summary.deactivations,
                    summary.relay_errors
                );
            }
        }
        Commands::SelfCheck => {
            let controller = run::build_controller(&cfg, false)?;
            let _relay = run::make_relay(&cfg)?;
            let calibrated: Vec<&str> = hydro_config::SensorKind::ALL
                .into_iter()
                .filter(|k| cfg.calibration.get(*k).is_some())
                .map(hydro_config::SensorKind::as_str)
                .collect();
            let channels: Vec<&str> = controller.channel_names().collect();
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "ok",
                        "channels": channels,
                        "calibrated": calibrated,
                        "relay_pins": cfg.hardware.relay_pins,
                    })
                );
            } else {
                println!("OK: channels [{}]", channels.join(", "));
                println!("calibrated probes: [{}]", calibrated.join(", "));
            }
        }
    }
    Ok(())
}
