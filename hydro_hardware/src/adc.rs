//! Raw ADC count handling for the probe front end.

/// Reference voltage of the probe ADC.
pub const ADC_VREF: f64 = 3.3;
/// Full-scale count of a 12-bit converter.
pub const ADC_MAX: u16 = 4095;

/// Average `samples` summed counts and scale to volts.
///
/// Returns 0.0 when `samples` is zero.
#[inline]
pub fn counts_to_volts(count_sum: u64, samples: u32) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    (count_sum as f64 / f64::from(samples) / f64::from(ADC_MAX)) * ADC_VREF
}

/// Quantize a voltage to a 12-bit count, clamped to the converter range.
#[inline]
pub fn volts_to_count(volts: f64) -> u16 {
    let scaled = (volts / ADC_VREF * f64::from(ADC_MAX)).round();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else if scaled >= f64::from(ADC_MAX) {
        ADC_MAX
    } else {
        // In range by the checks above.
        scaled as u16
    }
}
