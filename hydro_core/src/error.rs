use thiserror::Error;

/// Validation failures from capturing points or fitting a calibration.
///
/// All variants are recoverable: the caller fixes the input and retries, and
/// any previously applied calibration stays in force.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no live reading has been observed for this sensor")]
    NoLiveReading,
    #[error("no calibration points captured")]
    InsufficientPoints,
    #[error("calibration voltage is zero")]
    DivisionByZero,
    #[error("all calibration points share the same voltage")]
    DegenerateRegression,
    #[error("point index {0} is outside the active calibration mode")]
    InvalidPointIndex(u32),
    #[error("calibration mode must be 1, 2 or 3 points, got {0}")]
    InvalidMode(u8),
    #[error("calibration input must be finite")]
    NonFiniteInput,
    #[error("calibration produced a non-finite slope or offset")]
    NonFiniteResult,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("no dosing channels configured")]
    NoChannels,
    #[error("duplicate dosing channel '{0}'")]
    DuplicateChannel(String),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("unknown dosing channel '{0}'")]
    UnknownChannel(String),
}
