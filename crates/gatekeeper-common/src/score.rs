//! Scores and priorities.
//!
//! Thresholds, validation scores and trigger priorities share one numeric
//! representation: an integer in `0..=100`. Named priorities ("high",
//! "critical", ...) are rejected at deserialization instead of being mapped
//! onto numbers, so a configured threshold can always be compared directly
//! against a score.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("{kind} {value} is outside 0..=100")]
    OutOfRange { kind: &'static str, value: i64 },
}

/// A quality score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const MIN: Score = Score(0);
    pub const MAX: Score = Score(100);

    pub fn new(value: i64) -> Result<Self, ScoreError> {
        if (0..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreError::OutOfRange {
                kind: "score",
                value,
            })
        }
    }

    /// Clamp a raw value into range. Usable in constants.
    pub const fn saturating(value: u8) -> Self {
        if value > 100 { Self(100) } else { Self(value) }
    }

    /// Round and clamp a fractional score.
    ///
    /// ```
    /// use gatekeeper_common::Score;
    ///
    /// assert_eq!(Score::from_f64(84.5).value(), 85);
    /// assert_eq!(Score::from_f64(-3.0).value(), 0);
    /// assert_eq!(Score::from_f64(f64::NAN).value(), 0);
    /// ```
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.round().clamp(0.0, 100.0) as u8)
    }

    /// Score for a `part / whole` ratio. An empty whole scores zero.
    pub fn from_ratio(part: usize, whole: usize) -> Self {
        if whole == 0 {
            return Self::MIN;
        }
        Self::from_f64(part as f64 * 100.0 / whole as f64)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// One below this score, saturating at zero.
    pub fn below(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl TryFrom<i64> for Score {
    type Error = ScoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        score.0 as i64
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trigger priority in `0..=100`. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    pub fn new(value: i64) -> Result<Self, ScoreError> {
        if (0..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreError::OutOfRange {
                kind: "priority",
                value,
            })
        }
    }

    pub const fn saturating(value: u8) -> Self {
        if value > 100 { Self(100) } else { Self(value) }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Priority {
    type Error = ScoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        priority.0 as i64
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
