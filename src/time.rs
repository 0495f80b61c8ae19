//! Time keeping for the collector.
//!
//! Everything that needs "now" asks a `Clock` so that tests may drive time by
//! hand. Batch keys are encoded as ticks, 100 nanosecond units counted from
//! the Unix epoch.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::RwLock;
use std::time::{Instant, UNIX_EPOCH};

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<DateTime<Utc>>,
}

impl MockClock {
    /// Create a `MockClock` frozen at `time`.
    pub fn with_time(time: DateTime<Utc>) -> MockClock {
        MockClock {
            now: RwLock::new(time),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = *now + duration;
    }

    /// Set the clock to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = time;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// The Unix epoch, used as the "read everything" cursor.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(UNIX_EPOCH)
}

/// Encode `time` as ticks since the Unix epoch.
pub fn to_ticks(time: &DateTime<Utc>) -> i64 {
    time.timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(i64::from(time.timestamp_subsec_nanos()) / NANOS_PER_TICK)
}

/// Decode ticks since the Unix epoch. Returns `None` if `ticks` is out of the
/// representable range.
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    Utc.timestamp_opt(secs, nanos as u32).single()
}

/// Nanoseconds elapsed since `i`, saturating.
pub fn elapsed_ns(i: Instant) -> u64 {
    let elapsed = i.elapsed();
    (elapsed.as_secs().saturating_mul(1_000_000_000))
        .saturating_add(u64::from(elapsed.subsec_nanos()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_round_trip_at_tick_resolution() {
        let t = Utc.timestamp_opt(1_600_000_000, 123_456_700).unwrap();
        let ticks = to_ticks(&t);
        assert_eq!(ticks, 16_000_000_001_234_567);
        assert_eq!(from_ticks(ticks), Some(t));
    }

    #[test]
    fn ticks_truncate_sub_tick_nanos() {
        let t = Utc.timestamp_opt(10, 199).unwrap();
        assert_eq!(to_ticks(&t), 100_000_001);
    }

    #[test]
    fn ticks_order_matches_time_order() {
        let a = Utc.timestamp_opt(10, 0).unwrap();
        let b = a + Duration::microseconds(1);
        assert!(to_ticks(&a) < to_ticks(&b));
    }

    #[test]
    fn epoch_is_zero_ticks() {
        assert_eq!(to_ticks(&epoch()), 0);
        assert_eq!(from_ticks(0), Some(epoch()));
    }

    #[test]
    fn mock_clock_moves_only_when_told() {
        let start = Utc.timestamp_opt(100, 0).unwrap();
        let clock = MockClock::with_time(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now(), start + Duration::minutes(10));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
