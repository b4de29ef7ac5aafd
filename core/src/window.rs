//! Half-open time windows.
//!
//! Every booking, availability query and conflict check is expressed as a
//! [`TimeWindow`] `[from, until)`: the start instant is included, the end instant
//! is not. Two windows that merely touch (`a.until == b.from`) do not overlap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when bounds do not form a window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidWindow {
    /// The start is not strictly before the end.
    #[error("window start {from} must be before its end {until}")]
    Inverted {
        /// Requested start
        from: DateTime<Utc>,
        /// Requested end
        until: DateTime<Utc>,
    },

    /// The end lies past the last representable instant.
    #[error("window starting at {from} ends out of range")]
    OutOfRange {
        /// Requested start
        from: DateTime<Utc>,
    },
}

#[derive(Deserialize)]
struct WindowBounds {
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TryFrom<WindowBounds> for TimeWindow {
    type Error = InvalidWindow;

    fn try_from(bounds: WindowBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.from, bounds.until)
    }
}

/// A half-open interval `[from, until)` in UTC.
///
/// The constructor guarantees `from < until`, so a window is never empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct TimeWindow {
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window from its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWindow`] when `from >= until`.
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, InvalidWindow> {
        if from < until {
            Ok(Self { from, until })
        } else {
            Err(InvalidWindow::Inverted { from, until })
        }
    }

    /// Creates a window of `length` starting at `from`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWindow`] when `length` is zero or negative, or when
    /// the end is out of range.
    pub fn starting_at(from: DateTime<Utc>, length: Duration) -> Result<Self, InvalidWindow> {
        let until = from
            .checked_add_signed(length)
            .ok_or(InvalidWindow::OutOfRange { from })?;
        Self::new(from, until)
    }

    /// Inclusive start.
    #[must_use]
    pub const fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// Exclusive end.
    #[must_use]
    pub const fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.until - self.from
    }

    /// Length of the window in whole minutes.
    #[must_use]
    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// `[s1, e1)` and `[s2, e2)` overlap iff `s1 < e2 && s2 < e1`.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.from < other.until && other.from < self.until
    }

    /// Whether `instant` lies inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.until
    }

    /// Same length, moved to start at `from`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWindow::OutOfRange`] when the moved end is out of range.
    pub fn moved_to(&self, from: DateTime<Utc>) -> Result<Self, InvalidWindow> {
        Self::starting_at(from, self.duration())
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from.to_rfc3339(), self.until.to_rfc3339())
    }
}
