use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source for the sampling cadence and pulse deadlines.
///
/// Controller timestamps are milliseconds on a timeline that starts at an
/// `epoch` taken from the same clock; `ms_since` and `sleep_until_ms`
/// translate between the two.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }

    /// Block until `deadline_ms` on the timeline starting at `epoch`.
    /// Returns at once when the deadline has already passed.
    fn sleep_until_ms(&self, epoch: Instant, deadline_ms: u64) {
        let now = self.ms_since(epoch);
        if deadline_ms > now {
            self.sleep(Duration::from_millis(deadline_ms - now));
        }
    }
}

/// Wall-clock monotonic time backed by `Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Simulated clock for deterministic tests: `sleep` moves time forward
    /// instantly. Clones share the same timeline.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset_ms: Arc<AtomicU64>,
        sleeps: Arc<AtomicU64>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset_ms: Arc::new(AtomicU64::new(0)),
                sleeps: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn advance_ms(&self, ms: u64) {
            // fetch_update never fails with a closure that always returns Some.
            let _ = self
                .offset_ms
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                    Some(v.saturating_add(ms))
                });
        }

        pub fn advance(&self, d: Duration) {
            self.advance_ms(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        }

        /// Jump to an absolute position on the timeline (may move backwards).
        pub fn set_ms(&self, ms: u64) {
            self.offset_ms.store(ms, Ordering::SeqCst);
        }

        /// Current position on the timeline.
        pub fn elapsed_ms(&self) -> u64 {
            self.offset_ms.load(Ordering::SeqCst)
        }

        /// How many times `sleep` has been called.
        pub fn sleep_count(&self) -> u64 {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_millis(self.elapsed_ms())
        }

        fn sleep(&self, d: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            self.advance(d);
        }
    }

}
