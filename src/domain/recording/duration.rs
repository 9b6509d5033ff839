//! Duration value object

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::domain::error::DurationParseError;

/// Default recording length for the CLI (10 seconds)
pub const DEFAULT_DURATION_SECS: u64 = 10;

/// Value object representing a time span, parsed from strings like
/// `250ms`, `30s`, `1m` or `2m30s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    milliseconds: u64,
}

impl Duration {
    /// Create a Duration from milliseconds
    pub const fn from_millis(ms: u64) -> Self {
        Self { milliseconds: ms }
    }

    /// Create a Duration from seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            milliseconds: secs * 1000,
        }
    }

    /// Default recording length
    pub const fn default_duration() -> Self {
        Self::from_secs(DEFAULT_DURATION_SECS)
    }

    pub const fn as_secs(&self) -> u64 {
        self.milliseconds / 1000
    }

    pub const fn as_millis(&self) -> u64 {
        self.milliseconds
    }

    /// Convert to std::time::Duration
    pub const fn as_std(&self) -> StdDuration {
        StdDuration::from_millis(self.milliseconds)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DurationParseError { input: s.to_string() };
        let input = s.trim().to_ascii_lowercase();

        let mut total_ms: u64 = 0;
        let mut rest = input.as_str();
        // Units must appear in decreasing order, each at most once
        let mut last_rank = usize::MAX;

        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(err)?;
            if digits == 0 {
                return Err(err());
            }
            let value: u64 = rest[..digits].parse().map_err(|_| err())?;
            rest = &rest[digits..];

            let (unit_ms, rank, unit_len) = if rest.starts_with("ms") {
                (1, 0, 2)
            } else if rest.starts_with('s') {
                (1_000, 1, 1)
            } else if rest.starts_with('m') {
                (60_000, 2, 1)
            } else {
                return Err(err());
            };
            if rank >= last_rank {
                return Err(err());
            }
            last_rank = rank;
            rest = &rest[unit_len..];

            total_ms = value
                .checked_mul(unit_ms)
                .and_then(|ms| total_ms.checked_add(ms))
                .ok_or_else(err)?;
        }

        if total_ms == 0 {
            return Err(err());
        }

        Ok(Self {
            milliseconds: total_ms,
        })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.milliseconds % 1000;
        let total_secs = self.as_secs();
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;

        if millis != 0 {
            return write!(f, "{}ms", self.milliseconds);
        }
        match (minutes, seconds) {
            (0, s) => write!(f, "{}s", s),
            (m, 0) => write!(f, "{}m", m),
            (m, s) => write!(f, "{}m{}s", m, s),
        }
    }
}

impl Default for Duration {
    fn default() -> Self {
        Self::default_duration()
    }
}
