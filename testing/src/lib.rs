//! # Boxoffice Testing
//!
//! Test support shared by the boxoffice crates:
//!
//! - clocks that stand still ([`FixedClock`]) or move on command ([`MockClock`])
//! - [`ReducerTest`], a Given/When/Then harness for one reducer step
//! - effect assertions and [`collect_actions`] for walking feedback chains
//!
//! ```
//! use boxoffice_core::environment::Clock;
//! use boxoffice_testing::{test_clock, MockClock};
//! use chrono::Duration;
//!
//! let clock = MockClock::new(test_clock().now());
//! clock.advance(Duration::minutes(30));
//! assert_eq!(clock.now() - test_clock().now(), Duration::minutes(30));
//! ```

use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Reducer step harness
pub mod reducer_test;

/// Clocks for tests
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Mutex, PoisonError};

    /// 2025-01-01T00:00:00Z as a Unix timestamp
    const TEST_EPOCH_SECS: i64 = 1_735_689_600;

    /// A clock pinned to one instant
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Pin the clock at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test tells it to
    ///
    /// Used to age pending bookings past their expiry without sleeping.
    #[derive(Debug)]
    pub struct MockClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl MockClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) += by;
        }

        /// Jump the clock to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Fixed clock at 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default())
    }
}

pub use mocks::{test_clock, FixedClock, MockClock};
pub use reducer_test::{assertions, collect_actions, ReducerTest};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_clock_is_new_year_2025() {
        assert_eq!(test_clock().now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(test_clock().now(), test_clock().now());
    }

    #[test]
    fn mock_clock_advances_on_demand() {
        let start = test_clock().now();
        let clock = MockClock::new(start);

        clock.advance(Duration::minutes(31));
        assert_eq!(clock.now(), start + Duration::minutes(31));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
