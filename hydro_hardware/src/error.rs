use thiserror::Error;

/// Failures talking to probe or relay hardware.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("relay {0} is not mapped to an output")]
    UnmappedRelay(u8),
    #[error("no probe wired to adc channel {0}")]
    UnknownChannel(u8),
}

pub type Result<T> = std::result::Result<T, HwError>;
