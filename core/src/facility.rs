//! Per-facility equipment configuration and booking rules.
//!
//! Each `(facility, equipment type)` pair has exactly one
//! [`FacilityEquipmentConfig`]. It caps how many units of the type exist and
//! carries the rules a booking window must satisfy: operating hours, maximum
//! session length and how far ahead bookings may be made.

use crate::equipment::EquipmentType;
use crate::ids::FacilityId;
use crate::window::TimeWindow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opening and closing time for one weekday, in facility local time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyHours {
    /// First bookable instant of the day
    pub open: NaiveTime,
    /// Bookings must end at or before this time
    pub close: NaiveTime,
}

impl DailyHours {
    /// Creates opening hours for one day.
    #[must_use]
    pub const fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// Whether `close` comes after `open`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.open < self.close
    }
}

/// Opening hours per weekday. A weekday without hours is closed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    days: [Option<DailyHours>; 7],
}

impl OperatingHours {
    /// Same hours on every day of the week.
    #[must_use]
    pub const fn every_day(hours: DailyHours) -> Self {
        Self {
            days: [Some(hours); 7],
        }
    }

    /// Replaces the hours for one weekday (`None` closes it).
    #[must_use]
    pub const fn with_day(mut self, weekday: Weekday, hours: Option<DailyHours>) -> Self {
        self.days[weekday.num_days_from_monday() as usize] = hours;
        self
    }

    /// Hours for a weekday, `None` when closed.
    #[must_use]
    pub const fn for_weekday(&self, weekday: Weekday) -> Option<DailyHours> {
        self.days[weekday.num_days_from_monday() as usize]
    }

    /// Configured days, Monday first.
    pub fn configured(&self) -> impl Iterator<Item = DailyHours> + '_ {
        self.days.iter().flatten().copied()
    }
}

/// A rule a requested window breaks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ConstraintViolation {
    /// The window is not contained in one day's opening hours.
    OutsideOperatingHours,
    /// The window is longer than a single session may last.
    ExceedsMaxDuration {
        /// Configured maximum in minutes
        max_minutes: u32,
        /// Requested length in minutes
        requested_minutes: i64,
    },
    /// The window starts sooner than the minimum notice allows.
    InsufficientNotice {
        /// Required notice in minutes
        min_notice_minutes: u32,
    },
    /// The window starts further ahead than bookings may be made.
    BeyondBookingHorizon {
        /// Maximum advance in days
        max_advance_days: u32,
    },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideOperatingHours => f.write_str("outside operating hours"),
            Self::ExceedsMaxDuration {
                max_minutes,
                requested_minutes,
            } => write!(
                f,
                "session of {requested_minutes} min exceeds the {max_minutes} min limit"
            ),
            Self::InsufficientNotice { min_notice_minutes } => {
                write!(f, "bookings need {min_notice_minutes} min notice")
            }
            Self::BeyondBookingHorizon { max_advance_days } => {
                write!(f, "bookings open at most {max_advance_days} days ahead")
            }
        }
    }
}

/// Static settings for one equipment type at one facility.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityEquipmentConfig {
    /// Facility the settings apply to
    pub facility_id: FacilityId,
    /// Equipment type the settings apply to
    pub equipment_type: EquipmentType,
    /// Number of units of this type the facility owns
    pub total_count: u32,
    /// Weekly opening hours
    pub operating_hours: OperatingHours,
    /// Longest bookable session
    pub max_session_minutes: u32,
    /// Minimum lead time between now and a booking's start
    pub min_notice_minutes: u32,
    /// How many days ahead bookings may start (`None` = unlimited)
    pub max_advance_days: Option<u32>,
    /// How early before its start a reservation may be checked in
    pub check_in_buffer_minutes: u32,
    /// Offset of facility local time from UTC
    pub utc_offset_minutes: i32,
    /// Free-form usage restrictions ("staff supervision required")
    pub restrictions: Vec<String>,
}

impl FacilityEquipmentConfig {
    /// Creates a config open 06:00–22:00 every day with permissive booking rules.
    #[must_use]
    pub fn new(facility_id: FacilityId, equipment_type: EquipmentType, total_count: u32) -> Self {
        let open = NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN);
        let close = NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN);
        Self {
            facility_id,
            equipment_type,
            total_count,
            operating_hours: OperatingHours::every_day(DailyHours::new(open, close)),
            max_session_minutes: 180,
            min_notice_minutes: 0,
            max_advance_days: None,
            check_in_buffer_minutes: 15,
            utc_offset_minutes: 0,
            restrictions: Vec::new(),
        }
    }

    /// Check-in buffer as a duration.
    #[must_use]
    pub fn check_in_buffer(&self) -> Duration {
        Duration::minutes(i64::from(self.check_in_buffer_minutes))
    }

    fn utc_offset(&self) -> Duration {
        Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    /// Converts a UTC instant to facility local time, or `None` when the
    /// shifted instant is out of range.
    #[must_use]
    pub fn to_local(&self, instant: DateTime<Utc>) -> Option<NaiveDateTime> {
        instant.naive_utc().checked_add_signed(self.utc_offset())
    }

    /// Converts a facility-local date and time to UTC, or `None` when the
    /// shifted instant is out of range.
    #[must_use]
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        date.and_time(time)
            .checked_sub_signed(self.utc_offset())
            .map(|local| local.and_utc())
    }

    /// Whether the window sits inside a single day's opening hours. A window
    /// whose local time is out of range never does.
    #[must_use]
    pub fn within_operating_hours(&self, window: &TimeWindow) -> bool {
        let (Some(start), Some(end)) = (self.to_local(window.from()), self.to_local(window.until()))
        else {
            return false;
        };

        let Some(hours) = self.operating_hours.for_weekday(start.weekday()) else {
            return false;
        };

        start.date() == end.date() && start.time() >= hours.open && end.time() <= hours.close
    }

    /// Every rule `window` breaks when booked at `now`.
    #[must_use]
    pub fn violations(&self, window: &TimeWindow, now: DateTime<Utc>) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        if !self.within_operating_hours(window) {
            violations.push(ConstraintViolation::OutsideOperatingHours);
        }

        let requested_minutes = window.duration_minutes();
        if requested_minutes > i64::from(self.max_session_minutes) {
            violations.push(ConstraintViolation::ExceedsMaxDuration {
                max_minutes: self.max_session_minutes,
                requested_minutes,
            });
        }

        // Out of range earliest start: no window gives enough notice.
        let earliest = now.checked_add_signed(Duration::minutes(i64::from(self.min_notice_minutes)));
        if earliest.is_none_or(|earliest| window.from() < earliest) {
            violations.push(ConstraintViolation::InsufficientNotice {
                min_notice_minutes: self.min_notice_minutes,
            });
        }

        if let Some(max_advance_days) = self.max_advance_days {
            let horizon = now.checked_add_signed(Duration::days(i64::from(max_advance_days)));
            if horizon.is_some_and(|horizon| window.from() > horizon) {
                violations.push(ConstraintViolation::BeyondBookingHorizon { max_advance_days });
            }
        }

        violations
    }
}
