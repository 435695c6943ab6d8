use crate::config::NavigationConfig;
use uom::si::f64::Time;
use uom::si::time::millisecond;

/// Drops samples that arrive sooner than a minimum interval after the last delivered one.
///
/// Time is taken from the samples themselves rather than a wall clock, so the limiter behaves
/// identically live and in replays. Dropped samples are gone; nothing is queued.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    min_interval_ms: f64,
    last_delivered_ms: Option<u64>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Time) -> Self {
        Self {
            min_interval_ms: min_interval.get::<millisecond>(),
            last_delivered_ms: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &NavigationConfig) -> Self {
        Self::new(config.min_frame_interval())
    }

    #[must_use]
    pub fn min_interval(&self) -> Time {
        Time::new::<millisecond>(self.min_interval_ms)
    }

    /// Decides whether a sample stamped `timestamp_ms` may be delivered, and records it if so.
    ///
    /// A timestamp earlier than the last delivery means the source restarted; such a sample is
    /// delivered and becomes the new reference point.
    pub fn admit(&mut self, timestamp_ms: u64) -> bool {
        match self.last_delivered_ms {
            Some(last)
                if timestamp_ms >= last && ((timestamp_ms - last) as f64) < self.min_interval_ms =>
            {
                false
            }
            _ => {
                self.last_delivered_ms = Some(timestamp_ms);
                true
            }
        }
    }

    /// Forgets the last delivery; the next sample is always admitted.
    pub fn reset(&mut self) {
        self.last_delivered_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;
    use rstest::rstest;

    fn at_20_hz() -> RateLimiter {
        RateLimiter::from_config(&NavigationConfig::default())
    }

    #[test]
    fn interval_follows_the_rate() {
        let limiter = RateLimiter::from_config(&NavigationConfig {
            target_update_rate_hz: 40.,
            ..Default::default()
        });
        approx::assert_relative_eq!(limiter.min_interval().get::<millisecond>(), 25., epsilon = 1e-9);
    }

    #[test]
    fn one_delivery_per_window() {
        let mut limiter = at_20_hz();
        // a 100 Hz source
        let admitted: Vec<_> = (0..10).map(|i| limiter.admit(i * 10)).collect();
        assert_eq!(
            admitted,
            [true, false, false, false, false, true, false, false, false, false]
        );
    }

    #[rstest]
    #[case(49, false)]
    #[case(50, true)]
    #[case(51, true)]
    fn boundary(#[case] next: u64, #[case] admitted: bool) {
        let mut limiter = at_20_hz();
        assert!(limiter.admit(0));
        assert_eq!(limiter.admit(next), admitted);
    }

    #[test]
    fn restarted_source_is_accepted() {
        let mut limiter = at_20_hz();
        assert!(limiter.admit(10_000));
        assert!(limiter.admit(3));
        assert!(!limiter.admit(20));
    }

    #[test]
    fn reset_admits_immediately() {
        let mut limiter = at_20_hz();
        assert!(limiter.admit(100));
        limiter.reset();
        assert!(limiter.admit(101));
    }

    quickcheck! {
        fn burst_within_a_window_delivers_once(offsets: Vec<u8>) -> () {
            let mut limiter = at_20_hz();
            let mut timestamps: Vec<u64> = offsets.iter().map(|o| 1_000 + u64::from(*o % 50)).collect();
            timestamps.sort_unstable();
            let delivered = timestamps.iter().filter(|t| limiter.admit(**t)).count();
            assert_eq!(delivered, usize::from(!timestamps.is_empty()));
        }
    }
}
