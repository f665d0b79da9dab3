//! Probe and relay implementations behind the `hydro_traits` seams.
//!
//! The simulated devices are always available. The GPIO relay bank needs
//! the `hardware` feature and a Linux target.

pub mod adc;
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use error::HwError;
pub use sim::{SimulatedProbe, SimulatedRelay};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioRelayBank;
