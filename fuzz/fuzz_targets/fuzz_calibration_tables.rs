#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(tables) = toml::from_str::<hydro_config::CalibrationTables>(data) else {
        return;
    };
    // Whatever parsed must serialize back and parse to the same tables.
    let text = toml::to_string_pretty(&tables).expect("serialize parsed tables");
    let again: hydro_config::CalibrationTables =
        toml::from_str(&text).expect("reparse serialized tables");
    for sensor in hydro_config::SensorKind::ALL {
        let (a, b) = (tables.get(sensor), again.get(sensor));
        match (a, b) {
            (Some(a), Some(b)) => {
                assert!(a.slope.to_bits() == b.slope.to_bits() || (a.slope.is_nan() && b.slope.is_nan()));
            }
            (None, None) => {}
            _ => panic!("{} table lost in round trip", sensor.as_str()),
        }
    }
});
