//! Correlation clock
//!
//! Outbound messages are stamped with wall-clock seconds (millisecond
//! resolution). The display echoes the stamp back in responses, so stamps
//! double as correlation keys and must never repeat within a session.

use std::sync::Mutex;

/// Offset added when the wall clock has not advanced since the last stamp.
pub const NUDGE: f64 = 0.000_001;

/// Stamps echoed by the display are matched within this tolerance, which
/// is well below [`NUDGE`] and absorbs float round-tripping through JSON.
pub const MATCH_TOLERANCE: f64 = NUDGE / 4.0;

/// Current wall-clock time in seconds, truncated to milliseconds.
pub fn now_s() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// `true` when two stamps denote the same correlation key.
pub fn same_stamp(a: f64, b: f64) -> bool {
    (a - b).abs() < MATCH_TOLERANCE
}

/// Issues strictly increasing timestamps.
#[derive(Debug, Default)]
pub struct CorrelationClock {
    last: Mutex<Option<f64>>,
}

impl CorrelationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp, taken from the wall clock.
    pub fn next(&self) -> f64 {
        self.next_from(now_s())
    }

    /// Next stamp given a wall-clock reading.
    ///
    /// Equal (or earlier) readings are pushed just past the last issued stamp.
    pub fn next_from(&self, now: f64) -> f64 {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = match *last {
            Some(prev) if now <= prev => prev + NUDGE,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Most recently issued stamp, if any.
    pub fn last(&self) -> Option<f64> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_millisecond_resolution() {
        let now = now_s();
        let millis = now * 1000.0;
        assert!((millis - millis.round()).abs() < 1e-3);
    }

    #[test]
    fn test_equal_readings_are_nudged() {
        let clock = CorrelationClock::new();
        let a = clock.next_from(1_700_000_000.123);
        let b = clock.next_from(1_700_000_000.123);
        let c = clock.next_from(1_700_000_000.123);
        assert!(a < b && b < c);
        assert!(!same_stamp(a, b));
        assert!(!same_stamp(b, c));
    }

    #[test]
    fn test_advancing_clock_is_used_verbatim() {
        let clock = CorrelationClock::new();
        clock.next_from(10.0);
        assert_eq!(clock.next_from(10.5), 10.5);
        assert_eq!(clock.last(), Some(10.5));
    }

    #[test]
    fn test_clock_going_backwards_stays_monotonic() {
        let clock = CorrelationClock::new();
        let a = clock.next_from(20.0);
        let b = clock.next_from(19.0);
        assert!(b > a);
    }

    #[test]
    fn test_many_stamps_in_one_millisecond_are_unique() {
        let clock = CorrelationClock::new();
        let stamps: Vec<f64> = (0..200).map(|_| clock.next_from(1_700_000_000.5)).collect();
        for pair in stamps.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_same_stamp_survives_json_round_trip() {
        let clock = CorrelationClock::new();
        clock.next_from(1_700_000_000.001);
        let stamp = clock.next_from(1_700_000_000.001);
        let json = serde_json::to_string(&stamp).unwrap();
        let back: f64 = serde_json::from_str(&json).unwrap();
        assert!(same_stamp(stamp, back));
    }
}
