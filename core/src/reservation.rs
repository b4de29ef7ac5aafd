//! Reservations and their lifecycle.
//!
//! A reservation is created `Active` and moves exactly once into a terminal
//! state (`Completed`, `Cancelled`, `NoShow`). Terminal reservations are history
//! and reject every further lifecycle call.

use crate::equipment::ParseEnumError;
use crate::ids::{PlayerId, ReservationId, SessionId, UnitId, UserId};
use crate::window::TimeWindow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reservation lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holds the unit for its window
    Active,
    /// Checked out or completed by staff
    Completed,
    /// Cancelled before completion
    Cancelled,
    /// Holder never showed up
    NoShow,
}

impl ReservationStatus {
    /// Terminal statuses never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            _ => Err(ParseEnumError {
                kind: "reservation status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a lifecycle call was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The reservation already reached a terminal status.
    #[error("reservation is {0}, not active")]
    NotActive(ReservationStatus),

    /// Check-in was already recorded.
    #[error("reservation is already checked in")]
    AlreadyCheckedIn,

    /// Checkout or similar requires a prior check-in.
    #[error("reservation has not been checked in")]
    NotCheckedIn,

    /// Check-in attempted outside `[from - buffer, until]`.
    #[error("check-in is only allowed between {opens_at} and {closes_at}")]
    OutsideCheckInWindow {
        /// Earliest allowed check-in
        opens_at: DateTime<Utc>,
        /// Latest allowed check-in
        closes_at: DateTime<Utc>,
    },

    /// No-show marked before the grace period ended.
    #[error("no-show can only be recorded from {allowed_from}")]
    NoShowTooEarly {
        /// First instant a no-show may be recorded
        allowed_from: DateTime<Utc>,
    },
}

/// A committed claim on one unit for a half-open window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// The single unit this reservation holds
    pub unit_id: UnitId,
    /// Session the booking was made for
    pub session_id: SessionId,
    /// Player the unit is assigned to, if any
    pub player_id: Option<PlayerId>,
    /// Booked interval
    pub window: TimeWindow,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Staff member who booked it
    pub reserved_by: UserId,
    /// When the booking was committed
    pub created_at: DateTime<Utc>,
    /// When the holder checked in
    pub check_in_time: Option<DateTime<Utc>>,
    /// Who recorded the check-in
    pub checked_in_by: Option<UserId>,
    /// When the holder checked out
    pub check_out_time: Option<DateTime<Utc>>,
    /// Who recorded the checkout
    pub checked_out_by: Option<UserId>,
    /// Reason given on cancellation
    pub cancellation_reason: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl Reservation {
    /// Creates a new active reservation.
    #[must_use]
    pub fn new(
        unit_id: UnitId,
        session_id: SessionId,
        window: TimeWindow,
        reserved_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            unit_id,
            session_id,
            player_id: None,
            window,
            status: ReservationStatus::Active,
            reserved_by,
            created_at,
            check_in_time: None,
            checked_in_by: None,
            check_out_time: None,
            checked_out_by: None,
            cancellation_reason: None,
            notes: None,
        }
    }

    /// Still holding its unit.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, ReservationStatus::Active)
    }

    /// A check-in was recorded.
    #[must_use]
    pub const fn is_checked_in(&self) -> bool {
        self.check_in_time.is_some()
    }

    /// Active and its window contains `instant`.
    #[must_use]
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.is_active() && self.window.contains(instant)
    }

    const fn ensure_active(&self) -> Result<(), LifecycleError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LifecycleError::NotActive(self.status))
        }
    }

    /// Records a check-in at `at` by `by`.
    ///
    /// # Errors
    ///
    /// Fails unless the reservation is active, not yet checked in, and `at` lies
    /// in `[from - buffer, until]`.
    pub fn check_in(
        &mut self,
        at: DateTime<Utc>,
        buffer: Duration,
        by: UserId,
    ) -> Result<(), LifecycleError> {
        self.ensure_active()?;
        if self.is_checked_in() {
            return Err(LifecycleError::AlreadyCheckedIn);
        }

        let opens_at = self
            .window
            .from()
            .checked_sub_signed(buffer)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let closes_at = self.window.until();
        if at < opens_at || at > closes_at {
            return Err(LifecycleError::OutsideCheckInWindow {
                opens_at,
                closes_at,
            });
        }

        self.check_in_time = Some(at);
        self.checked_in_by = Some(by);
        Ok(())
    }

    /// Records a checkout at `at` by `by` and completes the reservation.
    ///
    /// # Errors
    ///
    /// Fails unless the reservation is active and checked in.
    pub fn check_out(&mut self, at: DateTime<Utc>, by: UserId) -> Result<(), LifecycleError> {
        self.ensure_active()?;
        if !self.is_checked_in() {
            return Err(LifecycleError::NotCheckedIn);
        }

        self.check_out_time = Some(at);
        self.checked_out_by = Some(by);
        self.status = ReservationStatus::Completed;
        Ok(())
    }

    /// Completes the reservation without a checkout.
    ///
    /// # Errors
    ///
    /// Fails unless the reservation is active.
    pub fn complete(&mut self) -> Result<(), LifecycleError> {
        self.ensure_active()?;
        self.status = ReservationStatus::Completed;
        Ok(())
    }

    /// Cancels the reservation.
    ///
    /// # Errors
    ///
    /// Fails unless the reservation is active.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), LifecycleError> {
        self.ensure_active()?;
        self.status = ReservationStatus::Cancelled;
        self.cancellation_reason = reason;
        Ok(())
    }

    /// Marks the holder as a no-show.
    ///
    /// # Errors
    ///
    /// Fails unless the reservation is active, was never checked in, and the
    /// grace period after `from` has passed.
    pub fn mark_no_show(&mut self, at: DateTime<Utc>, grace: Duration) -> Result<(), LifecycleError> {
        self.ensure_active()?;
        if self.is_checked_in() {
            return Err(LifecycleError::AlreadyCheckedIn);
        }

        let allowed_from = self
            .window
            .from()
            .checked_add_signed(grace)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if at < allowed_from {
            return Err(LifecycleError::NoShowTooEarly { allowed_from });
        }

        self.status = ReservationStatus::NoShow;
        Ok(())
    }
}
