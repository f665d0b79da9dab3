use hydro_core::MovingAverage;
use proptest::prelude::*;

#[test]
fn spec_sequence() {
    let mut ma = MovingAverage::new(5);
    let out: Vec<f64> = (1..=6).map(|v| ma.push(f64::from(v))).collect();
    assert_eq!(out, [1.0, 1.5, 2.0, 2.5, 3.0, 4.0]);
}

proptest! {
    #[test]
    fn average_matches_tail_mean(
        window in 1usize..10,
        values in proptest::collection::vec(0.0f64..1_000.0, 1..50),
    ) {
        let mut ma = MovingAverage::new(window);
        for (i, v) in values.iter().enumerate() {
            let got = ma.push(*v);
            let start = (i + 1).saturating_sub(window);
            let tail = &values[start..=i];
            let want = tail.iter().sum::<f64>() / tail.len() as f64;
            prop_assert!((got - want).abs() < 1e-9);
            prop_assert!(ma.len() <= window);
        }
    }
}
