#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core calibration and dosing logic (hardware-agnostic).
//!
//! Probes and relays are reached only through `hydro_traits::Probe` and
//! `hydro_traits::Relay`; time comes from `hydro_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Calibration**: voltage to engineering units for pH, dissolved oxygen
//!   and TDS (`calibration` module). One-point models use physical
//!   references, multi-point models use least squares.
//! - **Filtering**: per-sensor moving average with optional outlier and
//!   negative-value rejection (`filter` module)
//! - **Control**: hysteresis, consecutive-breach confirmation, cooldown and
//!   timed relay pulses (`controller` module)
//! - **Runner**: live polling loop and log replay (`runner` module)
//!
//! ## Units
//!
//! Controller timestamps are monotonic milliseconds on the caller's clock.
//! Voltages are volts, temperatures degrees Celsius.

pub mod builder;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod filter;
pub mod runner;
pub mod status;
pub mod types;
pub mod util;

pub use builder::DosingControllerBuilder;
pub use calibration::{
    CalibrationEngine, CalibrationPoint, CalibrationResult, CalibrationSession, PointMode,
    default_tds_ppm,
};
pub use config::{ChannelCfg, Condition, FilterCfg};
pub use controller::{DosingController, PulseState};
pub use error::{BuildError, CalibrationError, ControlError, Result};
pub use filter::{MovingAverage, RejectReason};
pub use runner::{RunOptions, RunSummary};
pub use status::{ChannelStatus, ControllerStatus, Decision, SensorStatus, SkipReason};
pub use types::{DosingAction, DosingEvent, Observation, SensorId};

pub use hydro_config::SensorKind;
