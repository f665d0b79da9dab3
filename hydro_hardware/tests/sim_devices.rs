use hydro_hardware::adc::ADC_VREF;
use hydro_hardware::{HwError, SimulatedProbe, SimulatedRelay};
use hydro_traits::{Probe, Relay};
use rstest::rstest;

#[rstest]
#[case(0.0)]
#[case(0.75)]
#[case(2.2)]
fn probe_tracks_setpoint(#[case] volts: f64) {
    let mut p = SimulatedProbe::new(42)
        .with_channel(2, volts)
        .with_noise(2, 0.01)
        .with_oversample(64);
    let v = p.read_voltage(2).unwrap();
    assert!((v - volts).abs() < 0.02, "read {v} for {volts}");
}

#[rstest]
fn probe_output_is_clamped_to_adc_range() {
    let mut p = SimulatedProbe::new(1).with_channel(0, 5.0);
    assert_eq!(p.read_voltage(0).unwrap(), ADC_VREF);
}

#[rstest]
fn unknown_probe_channel_is_typed() {
    let mut p = SimulatedProbe::new(1);
    let err = p.read_voltage(9).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::UnknownChannel(9))
    ));
    assert!(p.set_voltage(9, 1.0).is_err());
}

#[rstest]
fn set_voltage_takes_effect() {
    let mut p = SimulatedProbe::new(1).with_channel(0, 1.0);
    p.set_voltage(0, 2.0).unwrap();
    assert!((p.read_voltage(0).unwrap() - 2.0).abs() < 0.001);
}

#[rstest]
fn relay_tracks_state_and_history() {
    let mut r = SimulatedRelay::new(3);
    r.set(3, true).unwrap();
    r.set(1, true).unwrap();
    r.set(3, false).unwrap();
    assert!(r.is_on(1));
    assert!(!r.is_on(3));
    assert!(r.any_on());
    assert_eq!(r.history(), [(3, true), (1, true), (3, false)]);
}

#[rstest]
fn relay_out_of_range_is_rejected() {
    let mut r = SimulatedRelay::new(3);
    let err = r.set(4, true).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::UnmappedRelay(4))
    ));
    assert!(r.history().is_empty());
}
