//! Collaborator seams shared across the hydro workspace.
//!
//! The core never talks to wall-clock time or actuator hardware directly;
//! it goes through [`Clock`] and [`Relay`].
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Actuator sink for dosing decisions (relay board, HTTP bridge, simulator).
///
/// Delivery is fire-and-forget from the controller's point of view: callers
/// log failures and move on.
pub trait Relay {
    fn set(
        &mut self,
        relay_channel: u8,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<R: Relay + ?Sized> Relay for Box<R> {
    fn set(
        &mut self,
        relay_channel: u8,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set(relay_channel, on)
    }
}

/// Source of raw probe voltages, one per analog channel.
pub trait Probe {
    fn read_voltage(
        &mut self,
        channel: u8,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}
