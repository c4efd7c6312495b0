//! Nominal presentation timestamps
//!
//! Timestamps are assigned at a fixed rate derived from the configured frame
//! rate, not from the wall clock. Acquisition jitter and pauses never show up
//! in the media timeline.
//!
//! ## Properties
//!
//! - Strictly increasing: each tick adds exactly one frame duration
//! - Jitter-free: independent of how long acquisition took
//! - Pause-transparent: the clock only advances when a frame is emitted

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Presentation time in nanoseconds on the pipeline clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MediaTimestamp(u64);

impl MediaTimestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Timestamp `duration` later than this one
    pub fn advanced_by(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_nanos() as u64))
    }
}

impl fmt::Display for MediaTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_duration().as_secs_f64())
    }
}

/// Fixed-rate clock handing out one timestamp per emitted frame
#[derive(Debug, Clone)]
pub struct NominalClock {
    next: MediaTimestamp,
    frame_duration: Duration,
}

impl NominalClock {
    /// Clock ticking at `fps` frames per second, starting at zero.
    ///
    /// The frame duration is `1s / fps` truncated to whole nanoseconds.
    pub fn new(fps: u32) -> Self {
        Self {
            next: MediaTimestamp::ZERO,
            frame_duration: frame_duration(fps),
        }
    }

    /// Nominal duration of one frame
    #[inline]
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Timestamp the next emitted frame will carry
    #[inline]
    pub fn peek(&self) -> MediaTimestamp {
        self.next
    }

    /// Advance by one frame duration.
    pub fn advance(&mut self) {
        self.next = self.next.advanced_by(self.frame_duration);
    }
}

/// Duration of one frame at `fps`, in whole nanoseconds
pub fn frame_duration(fps: u32) -> Duration {
    Duration::from_nanos(NANOS_PER_SECOND / u64::from(fps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration_truncates() {
        assert_eq!(frame_duration(30), Duration::from_nanos(33_333_333));
        assert_eq!(frame_duration(25), Duration::from_millis(40));
        assert_eq!(frame_duration(1), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_fps_does_not_divide_by_zero() {
        assert_eq!(frame_duration(0), Duration::from_secs(1));
    }

    #[test]
    fn test_clock_advances_by_exact_duration() {
        let mut clock = NominalClock::new(30);
        assert_eq!(clock.peek(), MediaTimestamp::ZERO);
        clock.advance();
        clock.advance();
        assert_eq!(clock.peek().as_nanos(), 66_666_666);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let clock = NominalClock::new(60);
        assert_eq!(clock.peek(), clock.peek());
    }

    #[test]
    fn test_display() {
        assert_eq!(MediaTimestamp::from_nanos(1_500_000_000).to_string(), "1.500000s");
    }
}
