//! Time source and time-limit arithmetic for quiz sessions.

use chrono::{DateTime, Duration, Utc};

/// Where sessions and scoring read "now" from.
///
/// Elapsed time is always measured against this clock, never against
/// timestamps supplied by the client.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Time still available on a limited attempt, clamped at zero.
#[must_use]
pub fn time_left(started_at: DateTime<Utc>, limit_secs: u32, now: DateTime<Utc>) -> Duration {
    let deadline = started_at + Duration::seconds(i64::from(limit_secs));
    (deadline - now).max(Duration::zero())
}

/// 2023-11-14T22:13:20Z
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::milliseconds(1500));
        assert_eq!(clock.now(), fixed_now() + Duration::milliseconds(1500));
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::default();
        let before = Utc::now();
        clock.advance(Duration::days(365));
        assert!(clock.now() < before + Duration::days(1));
    }

    #[test]
    fn time_left_counts_down_to_zero() {
        let start = fixed_now();
        assert_eq!(time_left(start, 60, start), Duration::seconds(60));
        assert_eq!(
            time_left(start, 60, start + Duration::seconds(45)),
            Duration::seconds(15)
        );
        assert_eq!(time_left(start, 60, start + Duration::hours(2)), Duration::zero());
    }
}
