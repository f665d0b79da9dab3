//! Small numeric and time helpers shared by the core modules.

/// Arithmetic mean; `None` for an empty sequence.
#[inline]
pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0f64, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Population standard deviation; `None` for an empty sequence.
pub fn population_std_dev(values: impl Iterator<Item = f64> + Clone) -> Option<f64> {
    let m = mean(values.clone())?;
    let var = mean(values.map(|v| (v - m) * (v - m)))?;
    Some(var.sqrt())
}

/// Elapsed milliseconds from `since` to `now`, saturating at 0 when the
/// timestamps arrive out of order.
#[inline]
pub fn elapsed_ms(now_ms: u64, since_ms: u64) -> u64 {
    now_ms.saturating_sub(since_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(std::iter::empty()), None);
        assert_eq!(mean([2.0, 4.0].into_iter()), Some(3.0));
    }

    #[test]
    fn std_dev_matches_hand_computation() {
        let sd = population_std_dev([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter());
        assert_eq!(sd, Some(2.0));
    }

    #[test]
    fn elapsed_saturates() {
        assert_eq!(elapsed_ms(10, 4), 6);
        assert_eq!(elapsed_ms(4, 10), 0);
    }
}
