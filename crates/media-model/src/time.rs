//! Rational media time.
//!
//! Durations coming out of containers are exact rationals (`value / timescale`)
//! and comparisons between them are done by cross-multiplication.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest number of fractional digits kept when parsing decimal seconds.
const MAX_FRACTION_DIGITS: usize = 9;

/// A point or span on a media timeline, `value / timescale` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

/// Error returned when a decimal timestamp cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid media time {input:?}: {reason}")]
pub struct TimeParseError {
    pub input: String,
    pub reason: &'static str,
}

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// Create a time value. A zero timescale is treated as 1.
    pub const fn new(value: i64, timescale: u32) -> Self {
        Self {
            value,
            timescale: if timescale == 0 { 1 } else { timescale },
        }
    }

    /// Whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self::new(secs, 1)
    }

    /// Milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self::new(ms, 1000)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    pub fn is_zero(self) -> bool {
        self.value == 0
    }

    pub fn is_positive(self) -> bool {
        self.value > 0
    }

    /// The earlier of two times.
    pub fn min(self, other: MediaTime) -> MediaTime {
        if other < self {
            other
        } else {
            self
        }
    }

    /// The later of two times.
    pub fn max(self, other: MediaTime) -> MediaTime {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Absolute difference in seconds.
    pub fn abs_diff_secs(self, other: MediaTime) -> f64 {
        (self.as_secs_f64() - other.as_secs_f64()).abs()
    }

    /// Number of frames needed to cover this span at `fps`, rounded up.
    pub fn frame_count(self, fps: u32) -> u64 {
        if self.value <= 0 || fps == 0 {
            return 0;
        }
        let num = self.value as i128 * fps as i128;
        let den = self.timescale as i128;
        ((num + den - 1) / den) as u64
    }

    /// Seconds with microsecond precision, as accepted by ffmpeg `-t` and
    /// filter options.
    pub fn to_ffmpeg_timestamp(self) -> String {
        let micros = (self.value as i128 * 1_000_000 + self.timescale as i128 / 2)
            .div_euclid(self.timescale as i128);
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.abs();
        format!("{sign}{}.{:06}", micros / 1_000_000, micros % 1_000_000)
    }

    fn cross(self, other: MediaTime) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = self.cross(*other);
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// Parses decimal seconds such as `"15.033333"` exactly.
impl FromStr for MediaTime {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| TimeParseError {
            input: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(fail("empty"));
        }
        if trimmed.starts_with('-') {
            return Err(fail("negative"));
        }

        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(fail("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(fail("not a decimal number"));
        }

        let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
        let timescale = 10u32.pow(fraction.len() as u32);
        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| fail("out of range"))?
        };
        let fraction_value: i64 = if fraction.is_empty() {
            0
        } else {
            fraction.parse().map_err(|_| fail("out of range"))?
        };

        let value = whole_value
            .checked_mul(timescale as i64)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(|| fail("out of range"))?;

        Ok(MediaTime::new(value, timescale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equal_across_timescales() {
        assert_eq!(MediaTime::new(1, 2), MediaTime::new(300, 600));
        assert!(MediaTime::new(1, 3) < MediaTime::new(334, 1000));
    }

    #[test]
    fn test_min_picks_shorter() {
        let top = MediaTime::from_secs(15);
        let bottom = MediaTime::from_secs(5);
        assert_eq!(top.min(bottom), bottom);
        assert_eq!(bottom.min(top), bottom);
        assert_eq!(top.max(bottom), top);
    }

    #[test]
    fn test_parse_decimal_seconds() {
        let t: MediaTime = "15.033333".parse().unwrap();
        assert_eq!(t, MediaTime::new(15_033_333, 1_000_000));

        let whole: MediaTime = "15".parse().unwrap();
        assert_eq!(whole, MediaTime::from_secs(15));

        let leading_dot: MediaTime = ".5".parse().unwrap();
        assert_eq!(leading_dot, MediaTime::from_millis(500));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("N/A".parse::<MediaTime>().is_err());
        assert!("".parse::<MediaTime>().is_err());
        assert!("-1.0".parse::<MediaTime>().is_err());
        assert!(".".parse::<MediaTime>().is_err());
    }

    #[test]
    fn test_parse_truncates_excess_precision() {
        let t: MediaTime = "1.1234567891234".parse().unwrap();
        assert_eq!(t.timescale, 1_000_000_000);
        assert_eq!(t.value, 1_123_456_789);
    }

    #[test]
    fn test_ffmpeg_timestamp_format() {
        assert_eq!(MediaTime::from_secs(15).to_ffmpeg_timestamp(), "15.000000");
        assert_eq!(MediaTime::new(1, 3).to_ffmpeg_timestamp(), "0.333333");
        assert_eq!(MediaTime::new(2, 3).to_ffmpeg_timestamp(), "0.666667");
    }

    #[test]
    fn test_frame_count_rounds_up() {
        assert_eq!(MediaTime::from_secs(15).frame_count(30), 450);
        assert_eq!(MediaTime::new(15_033_333, 1_000_000).frame_count(30), 451);
        assert_eq!(MediaTime::ZERO.frame_count(30), 0);
    }

    #[test]
    fn test_zero_timescale_is_normalized() {
        assert_eq!(MediaTime::new(4, 0).timescale, 1);
    }

    proptest! {
        #[test]
        fn prop_min_is_never_longer_than_either(
            a in 0i64..10_000_000, sa in 1u32..100_000,
            b in 0i64..10_000_000, sb in 1u32..100_000,
        ) {
            let ta = MediaTime::new(a, sa);
            let tb = MediaTime::new(b, sb);
            let m = ta.min(tb);
            prop_assert!(m <= ta);
            prop_assert!(m <= tb);
            prop_assert!(m == ta || m == tb);
        }
    }
}
