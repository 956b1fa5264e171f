//! Half-open UTC time intervals and the frequency used to slice them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Errors building a [`Period`] or [`Frequency`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PeriodError {
    /// `end` lies before `start`.
    #[error("period end {end} is before start {start}")]
    Inverted {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },
    /// Frequencies must be strictly positive.
    #[error("frequency must be positive, got {0}")]
    NonPositiveFrequency(Duration),
}

/// A half-open interval `[start, end)` of UTC instants.
///
/// Ordered by `start`, then `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl Period {
    /// Builds a period, rejecting `end < start`. `start == end` is the empty period.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PeriodError> {
        if end < start {
            return Err(PeriodError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// `true` when no instant lies inside.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Length of the interval.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// `true` if `other` lies entirely inside `self`, bounds included.
    pub fn contains(&self, other: &Period) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Grows the period by `margin` on both sides, saturating at the representable range.
    pub fn widen(&self, margin: Duration) -> Period {
        Period {
            start: self
                .start
                .checked_sub_signed(margin)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: self
                .end
                .checked_add_signed(margin)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Consecutive sub-periods `[s, min(s + frequency, end))` starting at `start`.
    ///
    /// The last slice may be shorter; an empty period yields nothing.
    pub fn slice(&self, frequency: Frequency) -> Slices {
        Slices {
            cursor: self.start,
            end: self.end,
            step: frequency.0,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// Iterator returned by [`Period::slice`].
#[derive(Debug, Clone)]
pub struct Slices {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl Iterator for Slices {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        if self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let end = start
            .checked_add_signed(self.step)
            .map_or(self.end, |e| e.min(self.end));
        self.cursor = end;
        Some(Period { start, end })
    }
}

/// Strictly positive slicing length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency(Duration);

impl Frequency {
    /// Wraps a positive duration.
    pub fn new(d: Duration) -> Result<Self, PeriodError> {
        if d <= Duration::zero() {
            return Err(PeriodError::NonPositiveFrequency(d));
        }
        Ok(Self(d))
    }

    /// `n` whole days.
    pub fn days(n: u32) -> Result<Self, PeriodError> {
        Self::new(Duration::days(i64::from(n)))
    }

    /// The wrapped duration.
    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Half the frequency, the tolerance applied when matching coverage.
    pub fn half(&self) -> Duration {
        self.0 / 2
    }
}
