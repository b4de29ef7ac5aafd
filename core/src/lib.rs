//! # Gearbook Core
//!
//! Domain types and the storage abstraction for the Gearbook equipment
//! scheduler.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Identifiers**: UUID newtypes for units, reservations, sessions, players,
//!   facilities and staff users
//! - **Time windows**: half-open `[from, until)` intervals and the overlap rule
//! - **Equipment**: units and the guarded status state machine
//! - **Reservations**: the reservation lifecycle
//! - **Facility rules**: per-type capacity, operating hours and booking limits
//! - **Ledger**: the [`LedgerStore`](ledger::LedgerStore) trait every storage
//!   backend implements, and the [`UnitOfWork`](ledger::UnitOfWork) it commits
//! - **Environment**: the injected [`Clock`](environment::Clock)
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use gearbook_core::{EquipmentStatus, StatusTransition, TimeWindow};
//!
//! let from = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
//! let booked = TimeWindow::starting_at(from, Duration::hours(1)).unwrap();
//! let next = TimeWindow::starting_at(from + Duration::hours(1), Duration::hours(1)).unwrap();
//! assert!(!booked.overlaps(&next));
//!
//! let status = EquipmentStatus::Available.apply(StatusTransition::Reserve).unwrap();
//! assert_eq!(status, EquipmentStatus::Reserved);
//! ```

pub mod equipment;
pub mod facility;
pub mod ids;
pub mod ledger;
pub mod reservation;
pub mod window;

pub use equipment::{
    EquipmentStatus, EquipmentType, EquipmentUnit, InvalidTransition, ParseEnumError,
    StatusTransition,
};
pub use facility::{ConstraintViolation, DailyHours, FacilityEquipmentConfig, OperatingHours};
pub use ids::{FacilityId, PlayerId, ReservationId, SessionId, UnitId, UserId};
pub use ledger::{Guard, LedgerError, LedgerFuture, LedgerStore, LedgerWrite, UnitOfWork};
pub use reservation::{LifecycleError, Reservation, ReservationStatus};
pub use window::{InvalidWindow, TimeWindow};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Environment module - dependencies injected into the scheduler
///
/// All time-dependent decisions (check-in windows, no-show grace periods,
/// minimum notice) read the clock through this trait so tests can pin or
/// advance time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gearbook_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock reading the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
