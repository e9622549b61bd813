//! Millisecond clock
//!
//! The arbiter only ever looks at a 32-bit millisecond counter that wraps
//! roughly every 49.7 days. Elapsed time is computed with modular
//! subtraction, so a timer started just before the wrap still measures
//! correctly just after it.

use std::time::{Duration, Instant};

/// Monotonic millisecond counter
pub trait Clock: Send {
    /// Current counter value; wraps at `u32::MAX`
    fn millis(&self) -> u32;
}

/// Milliseconds elapsed between `since` and `now`, safe across rollover
#[inline]
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Convert a duration to clock milliseconds, saturating at the counter range
pub fn duration_to_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Clock backed by [`Instant`], truncated to the 32-bit counter
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn millis(&self) -> u32 {
        // truncation is the wrap
        self.origin.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_rollover() {
        let since = u32::MAX - 999;
        let now = 500;
        assert_eq!(elapsed_ms(now, since), 1_500);
    }

    #[test]
    fn test_elapsed_plain() {
        assert_eq!(elapsed_ms(30_000, 0), 30_000);
        assert_eq!(elapsed_ms(42, 42), 0);
    }

    #[test]
    fn test_duration_to_ms_saturates() {
        assert_eq!(duration_to_ms(Duration::from_secs(30)), 30_000);
        assert_eq!(duration_to_ms(Duration::from_secs(60 * 24 * 3600)), u32::MAX);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.millis();
        std::thread::sleep(Duration::from_millis(5));
        assert!(elapsed_ms(clock.millis(), a) >= 5);
    }
}
