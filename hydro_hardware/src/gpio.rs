use hydro_traits::Relay;
use rppal::gpio::{Gpio, OutputPin};

use crate::error::{HwError, Result};

/// Relay board driven directly from Raspberry Pi GPIO lines.
///
/// `pins[i]` drives relay channel `i + 1`. Most opto-isolated relay boards
/// energise on a low level, hence `active_low`.
pub struct GpioRelayBank {
    pins: Vec<OutputPin>,
    active_low: bool,
}

impl GpioRelayBank {
    pub fn new(pins: &[u8], active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut outputs = Vec::with_capacity(pins.len());
        for &bcm in pins {
            let mut out = gpio
                .get(bcm)
                .map_err(|e| HwError::Gpio(format!("pin {bcm}: {e}")))?
                .into_output();
            // Start de-energised.
            drive(&mut out, false, active_low);
            outputs.push(out);
        }
        tracing::info!(pins = ?pins, active_low, "gpio relay bank ready");
        Ok(Self {
            pins: outputs,
            active_low,
        })
    }
}

fn drive(pin: &mut OutputPin, on: bool, active_low: bool) {
    if on != active_low {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

impl Relay for GpioRelayBank {
    fn set(
        &mut self,
        relay_channel: u8,
        on: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let active_low = self.active_low;
        let pin = relay_channel
            .checked_sub(1)
            .and_then(|i| self.pins.get_mut(usize::from(i)))
            .ok_or(HwError::UnmappedRelay(relay_channel))?;
        drive(pin, on, active_low);
        tracing::debug!(relay = relay_channel, on, "gpio relay set");
        Ok(())
    }
}

impl Drop for GpioRelayBank {
    fn drop(&mut self) {
        for pin in &mut self.pins {
            drive(pin, false, self.active_low);
        }
    }
}
