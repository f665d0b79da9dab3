use std::time::Duration;

use hydro_core::error::BuildError;
use hydro_core::{ChannelCfg, Condition, DosingController, FilterCfg};
use rstest::rstest;

fn ph_up() -> ChannelCfg {
    ChannelCfg::new("ph_up", "ph", Condition::Below, 5.5, 5.8, 3)
}

fn build_err(
    filter: FilterCfg,
    channels: Vec<ChannelCfg>,
) -> BuildError {
    let err = DosingController::builder()
        .with_filter(filter)
        .with_channels(channels)
        .try_build()
        .expect_err("should fail");
    err.downcast_ref::<BuildError>()
        .cloned()
        .unwrap_or_else(|| panic!("expected BuildError, got: {err:?}"))
}

#[rstest]
fn no_channels_is_typed() {
    assert_eq!(build_err(FilterCfg::default(), vec![]), BuildError::NoChannels);
}

#[rstest]
fn duplicate_channel_names_rejected() {
    assert_eq!(
        build_err(FilterCfg::default(), vec![ph_up(), ph_up()]),
        BuildError::DuplicateChannel("ph_up".into())
    );
}

#[rstest]
#[case::zero_window(FilterCfg { window: 0, ..FilterCfg::default() })]
#[case::huge_window(FilterCfg { window: 5_000, ..FilterCfg::default() })]
#[case::min_samples_zero(FilterCfg { min_samples: 0, ..FilterCfg::default() })]
#[case::min_samples_over_window(FilterCfg { window: 3, min_samples: 4, ..FilterCfg::default() })]
#[case::negative_sigma(FilterCfg { outlier_sigma: -1.0, ..FilterCfg::default() })]
#[case::nan_sigma(FilterCfg { outlier_sigma: f64::NAN, ..FilterCfg::default() })]
fn invalid_filter(#[case] filter: FilterCfg) {
    assert!(matches!(
        build_err(filter, vec![ph_up()]),
        BuildError::InvalidConfig(_)
    ));
}

#[rstest]
#[case::inverted_below(ChannelCfg::new("c", "ph", Condition::Below, 5.8, 5.5, 3))]
#[case::inverted_above(ChannelCfg::new("c", "ph", Condition::Above, 6.7, 7.0, 2))]
#[case::no_dead_band(ChannelCfg::new("c", "ph", Condition::Below, 5.5, 5.5, 3))]
#[case::nan_threshold(ChannelCfg::new("c", "ph", Condition::Below, f64::NAN, 5.5, 3))]
#[case::empty_name(ChannelCfg::new(" ", "ph", Condition::Below, 5.5, 5.8, 3))]
#[case::empty_sensor(ChannelCfg::new("c", "", Condition::Below, 5.5, 5.8, 3))]
#[case::zero_relay(ChannelCfg::new("c", "ph", Condition::Below, 5.5, 5.8, 0))]
#[case::zero_consecutive(ph_up().with_required_consecutive(0))]
#[case::zero_pulse(ph_up().with_pulse(Duration::ZERO))]
fn invalid_channel(#[case] channel: ChannelCfg) {
    assert!(matches!(
        build_err(FilterCfg::default(), vec![channel]),
        BuildError::InvalidConfig(_)
    ));
}

#[rstest]
fn zero_cooldown_is_allowed() {
    let c = DosingController::builder()
        .with_channel(ph_up().with_cooldown(Duration::ZERO))
        .try_build();
    assert!(c.is_ok());
}

#[rstest]
fn override_can_start_engaged() {
    let c = DosingController::builder()
        .with_default_channels()
        .with_override(true)
        .try_build()
        .unwrap();
    assert!(c.override_mode());
    assert_eq!(c.channel_names().collect::<Vec<_>>(), ["ph_up", "ph_down", "nutrient"]);
}

#[rstest]
fn blank_tracked_sensor_is_rejected() {
    let err = DosingController::builder()
        .with_channel(ph_up())
        .with_tracked_sensor("  ")
        .try_build()
        .expect_err("should fail");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}
