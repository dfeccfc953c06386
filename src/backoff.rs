//! Bounded exponential backoff used by the stream client.

use std::time::Duration;

/// A (floor, ceiling, base) triple controlling retry delay growth for one failure category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffProfile {
    /// minimal delay in seconds
    pub floor: f64,
    /// maximal delay in seconds
    pub ceiling: f64,
    /// growth base, delay grows as `base ^ attempt`
    pub base: f64,
}

/// Health check window before any hello arrived, grows with repeated timeouts.
pub const INITIAL_HEALTH: BackoffProfile = BackoffProfile {
    floor: 10.0,
    ceiling: 30.0,
    base: 2.0,
};

/// Default floor in seconds for resubscribe when vehicle looks parked.
pub const DEFAULT_RESUBSCRIBE_FLOOR: u64 = 30;

/// Resubscribe delay when vehicle is likely driving, retry fast and often.
pub const DRIVING_RESUBSCRIBE: BackoffProfile = BackoffProfile {
    floor: 0.0,
    ceiling: 8.0,
    base: 1.3,
};

impl BackoffProfile {
    /// Resubscribe delay when vehicle is likely parked or asleep.
    pub fn parked_resubscribe(floor_secs: u64) -> Self {
        Self {
            floor: floor_secs as f64,
            ceiling: 120.0,
            base: 2.0,
        }
    }

    /// Delay for the given attempt counter.
    pub fn delay(&self, attempt: u32) -> Duration {
        delay(attempt, self.floor, self.ceiling, self.base)
    }
}

/// `round(clamp(base ^ attempt, floor, ceiling) * 1000)` milliseconds.
///
/// When `floor > ceiling` the ceiling wins.
pub fn delay(attempt: u32, floor: f64, ceiling: f64, base: f64) -> Duration {
    let exp = attempt.min(i32::MAX as u32) as i32;
    let secs = base.powi(exp).max(floor).min(ceiling);
    let millis = (secs * 1000.0).round();

    if millis.is_finite() && millis > 0.0 {
        Duration::from_millis(millis as u64)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_delay_initial_health_window() {
        assert_eq!(INITIAL_HEALTH.delay(0), Duration::from_secs(10));
        assert_eq!(INITIAL_HEALTH.delay(3), Duration::from_secs(10));
        assert_eq!(INITIAL_HEALTH.delay(4), Duration::from_secs(16));
        assert_eq!(INITIAL_HEALTH.delay(5), Duration::from_secs(30));
        assert_eq!(INITIAL_HEALTH.delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_driving_profile() {
        assert_eq!(DRIVING_RESUBSCRIBE.delay(0), Duration::from_millis(1000));
        assert_eq!(DRIVING_RESUBSCRIBE.delay(1), Duration::from_millis(1300));
        assert_eq!(DRIVING_RESUBSCRIBE.delay(2), Duration::from_millis(1690));
        assert_eq!(DRIVING_RESUBSCRIBE.delay(3), Duration::from_millis(2197));
        assert_eq!(DRIVING_RESUBSCRIBE.delay(20), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_parked_profile() {
        let profile = BackoffProfile::parked_resubscribe(DEFAULT_RESUBSCRIBE_FLOOR);
        assert_eq!(profile.delay(1), Duration::from_secs(30));
        assert_eq!(profile.delay(5), Duration::from_secs(32));
        assert_eq!(profile.delay(6), Duration::from_secs(64));
        assert_eq!(profile.delay(7), Duration::from_secs(120));
    }

    #[test]
    fn test_delay_monotonic_and_bounded() {
        let profiles = [
            INITIAL_HEALTH,
            DRIVING_RESUBSCRIBE,
            BackoffProfile::parked_resubscribe(DEFAULT_RESUBSCRIBE_FLOOR),
            BackoffProfile::parked_resubscribe(0),
        ];

        for profile in profiles {
            let floor = Duration::from_millis((profile.floor * 1000.0).round() as u64);
            let ceiling = Duration::from_millis((profile.ceiling * 1000.0).round() as u64);

            let mut last = Duration::ZERO;
            for attempt in 0..200 {
                let d = profile.delay(attempt);
                assert!(d >= last, "{:?} not monotonic at {}", profile, attempt);
                assert!(d >= floor && d <= ceiling, "{:?} out of bound", profile);
                last = d;
            }
            assert_eq!(last, ceiling);
        }
    }

    #[test]
    fn test_delay_floor_above_ceiling() {
        let profile = BackoffProfile::parked_resubscribe(500);
        assert_eq!(profile.delay(0), Duration::from_secs(120));
    }
}
