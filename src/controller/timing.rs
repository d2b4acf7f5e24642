//! Countdown and session-duration arithmetic

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Visual countdown to the next QR refresh.
///
/// Counts `total, total-1, ..., 1` and wraps back to `total`, so the value is
/// always within `[1, total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    total: u32,
    remaining: u32,
}

impl Countdown {
    pub fn new(total: u32) -> Self {
        let total = total.max(1);
        Countdown {
            total,
            remaining: total,
        }
    }

    /// Advance one second and return the new value
    pub fn tick(&mut self) -> u32 {
        self.remaining = if self.remaining <= 1 {
            self.total
        } else {
            self.remaining - 1
        };
        self.remaining
    }

    /// Back to full, called when a fresh token arrives
    pub fn reset(&mut self) {
        self.remaining = self.total;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Fraction of the interval still left, in `(0, 1]`
    pub fn fraction(&self) -> f64 {
        self.remaining as f64 / self.total as f64
    }
}

/// Elapsed time of the session, measured from its start timestamp.
///
/// The offset between the server's start timestamp and the moment the
/// display came up is fixed once; after that only the monotonic clock is
/// used, so wall-clock jumps do not move the duration.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    offset: Duration,
    started: Instant,
    max: Duration,
}

impl SessionClock {
    pub fn new(start_time: Option<DateTime<Utc>>, now: DateTime<Utc>, max: Duration) -> Self {
        let offset = start_time
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or(Duration::ZERO);
        SessionClock {
            offset,
            started: Instant::now(),
            max,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.offset + self.started.elapsed()
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn is_exceeded(&self) -> bool {
        self.elapsed() >= self.max
    }
}

/// `HH:MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_stays_in_range() {
        for total in 1..=12 {
            let mut countdown = Countdown::new(total);
            let mut previous = countdown.remaining();
            for _ in 0..100 {
                let value = countdown.tick();
                assert!((1..=total).contains(&value));
                if previous == 1 {
                    assert_eq!(value, total);
                } else {
                    assert_eq!(value, previous - 1);
                }
                previous = value;
            }
        }
    }

    #[test]
    fn test_countdown_reset() {
        let mut countdown = Countdown::new(10);
        countdown.tick();
        countdown.tick();
        assert_eq!(countdown.remaining(), 8);
        countdown.reset();
        assert_eq!(countdown.remaining(), 10);
        assert_eq!(countdown.tick(), 9);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut countdown = Countdown::new(0);
        assert_eq!(countdown.total(), 1);
        assert_eq!(countdown.tick(), 1);
        assert_eq!(countdown.fraction(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_offset_from_start_time() {
        let now = Utc::now();
        let clock = SessionClock::new(
            Some(now - chrono::Duration::minutes(30)),
            now,
            Duration::from_secs(3600),
        );
        assert_eq!(clock.elapsed().as_secs(), 1800);
        assert!(!clock.is_exceeded());

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert!(clock.is_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_ignores_future_start() {
        let now = Utc::now();
        let clock = SessionClock::new(
            Some(now + chrono::Duration::minutes(5)),
            now,
            Duration::from_secs(60),
        );
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 61)), "03:01:01");
    }
}
