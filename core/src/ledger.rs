//! The reservation ledger abstraction.
//!
//! The ledger is the single source of truth for units, facility configs and
//! reservations. Reads are plain lookups. Every change goes through
//! [`LedgerStore::commit`] as one [`UnitOfWork`]: a list of [`Guard`]s that must
//! all hold at commit time, and a list of [`LedgerWrite`]s applied only if they
//! do. A store applies a unit of work atomically or not at all.
//!
//! Guards replace optimistic version checks. A caller reads, decides, and then
//! commits writes guarded by the facts it decided on ("unit is still free for
//! this window", "reservation is still active"). If another caller changed those
//! facts in between, the commit fails and nothing is written.
//!
//! # Implementations
//!
//! - `PostgresLedger` (in `gearbook-postgres`): serializable transactions
//! - `InMemoryLedger` (in `gearbook-testing`): single write lock, for tests and demos
//!
//! # Example
//!
//! ```no_run
//! use gearbook_core::ledger::{Guard, LedgerError, LedgerStore, LedgerWrite, UnitOfWork};
//! use gearbook_core::{EquipmentStatus, Reservation};
//!
//! async fn book(store: &dyn LedgerStore, reservation: Reservation) -> Result<(), LedgerError> {
//!     let work = UnitOfWork::new()
//!         .guard(Guard::UnitFree {
//!             unit_id: reservation.unit_id,
//!             window: reservation.window,
//!         })
//!         .write(LedgerWrite::SetUnitStatus {
//!             unit_id: reservation.unit_id,
//!             status: EquipmentStatus::Reserved,
//!         })
//!         .write(LedgerWrite::InsertReservation(reservation));
//!
//!     store.commit(work).await
//! }
//! ```

use crate::equipment::{EquipmentStatus, EquipmentType, EquipmentUnit};
use crate::facility::FacilityEquipmentConfig;
use crate::ids::{FacilityId, ReservationId, SessionId, UnitId};
use crate::reservation::{Reservation, ReservationStatus};
use crate::window::TimeWindow;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every [`LedgerStore`] method.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Errors raised by a ledger store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// One or more units were not free when the unit of work was committed.
    #[error("units not available: {}", format_units(.units))]
    Conflict {
        /// Every unit whose guard failed, sorted
        units: Vec<UnitId>,
    },

    /// A reservation changed since it was read.
    #[error("reservation {reservation_id} changed concurrently")]
    StaleReservation {
        /// Reservation whose guard failed
        reservation_id: ReservationId,
    },

    /// The facility already owns as many units of this type as configured.
    #[error("facility {facility_id} is limited to {total_count} {equipment_type} units")]
    CapacityExceeded {
        /// Facility whose capacity was hit
        facility_id: FacilityId,
        /// Equipment type whose capacity was hit
        equipment_type: EquipmentType,
        /// Configured limit
        total_count: u32,
    },

    /// A concurrent transaction on the same rows won the commit and no unit
    /// was involved. Nothing was written; the caller may retry.
    #[error("commit lost to a concurrent transaction")]
    Contended,

    /// A guard referenced a row that does not exist.
    #[error("missing row: {0}")]
    MissingRow(String),

    /// Storage backend failure.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn format_units(units: &[UnitId]) -> String {
    units
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A precondition checked at commit time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    /// The unit is `Available` and has no active reservation overlapping `window`.
    UnitFree {
        /// Unit to check
        unit_id: UnitId,
        /// Window that must be free
        window: TimeWindow,
    },

    /// The unit is in exactly this status.
    UnitStatus {
        /// Unit to check
        unit_id: UnitId,
        /// Status the caller observed
        expected: EquipmentStatus,
    },

    /// The unit's active reservations are exactly `active`.
    ///
    /// Protects the status projection: a caller that derived a unit's next
    /// status from its active reservations fails if that set changed.
    UnitOccupancy {
        /// Unit to check
        unit_id: UnitId,
        /// Active reservation ids the caller observed, sorted
        active: Vec<ReservationId>,
    },

    /// The reservation is in this status, and optionally checked in or not.
    ReservationStatus {
        /// Reservation to check
        reservation_id: ReservationId,
        /// Status the caller observed
        expected: ReservationStatus,
        /// `Some(true)` requires a check-in, `Some(false)` forbids one
        checked_in: Option<bool>,
    },

    /// Registered units of the type plus `adding` stay within `limit`.
    UnitCount {
        /// Facility to count units in
        facility_id: FacilityId,
        /// Equipment type to count
        equipment_type: EquipmentType,
        /// Units this unit of work adds
        adding: u32,
        /// Maximum allowed after the commit
        limit: u32,
    },
}

/// A change applied when every guard holds.
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerWrite {
    /// Adds a new unit to the catalog.
    InsertUnit(EquipmentUnit),
    /// Creates or replaces the config for `(facility, type)`.
    UpsertConfig(FacilityEquipmentConfig),
    /// Records a new reservation.
    InsertReservation(Reservation),
    /// Replaces a reservation's stored state.
    UpdateReservation(Reservation),
    /// Moves a unit's status projection.
    SetUnitStatus {
        /// Unit to update
        unit_id: UnitId,
        /// New status
        status: EquipmentStatus,
    },
}

/// Guards plus writes, committed atomically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitOfWork {
    guards: Vec<Guard>,
    writes: Vec<LedgerWrite>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            guards: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Adds a guard.
    #[must_use]
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Adds a write.
    #[must_use]
    pub fn write(mut self, write: LedgerWrite) -> Self {
        self.writes.push(write);
        self
    }

    /// Adds a guard in place.
    pub fn push_guard(&mut self, guard: Guard) {
        self.guards.push(guard);
    }

    /// Adds a write in place.
    pub fn push_write(&mut self, write: LedgerWrite) {
        self.writes.push(write);
    }

    /// Guards, in insertion order.
    #[must_use]
    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    /// Writes, in insertion order.
    #[must_use]
    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    /// Splits into guards and writes.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Guard>, Vec<LedgerWrite>) {
        (self.guards, self.writes)
    }

    /// Nothing to check and nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty() && self.writes.is_empty()
    }

    /// Every unit a guard or write touches, sorted.
    ///
    /// Stores lock units in this order so concurrent commits cannot deadlock.
    #[must_use]
    pub fn touched_units(&self) -> Vec<UnitId> {
        let mut units = BTreeSet::new();
        for guard in &self.guards {
            match guard {
                Guard::UnitFree { unit_id, .. }
                | Guard::UnitStatus { unit_id, .. }
                | Guard::UnitOccupancy { unit_id, .. } => {
                    units.insert(*unit_id);
                }
                Guard::ReservationStatus { .. } | Guard::UnitCount { .. } => {}
            }
        }
        for write in &self.writes {
            match write {
                LedgerWrite::InsertReservation(r) | LedgerWrite::UpdateReservation(r) => {
                    units.insert(r.unit_id);
                }
                LedgerWrite::SetUnitStatus { unit_id, .. } => {
                    units.insert(*unit_id);
                }
                LedgerWrite::InsertUnit(_) | LedgerWrite::UpsertConfig(_) => {}
            }
        }
        units.into_iter().collect()
    }
}

/// Collects guard failures so a store reports all of them at once.
///
/// Stores evaluate every guard, record each failure here, and turn the result
/// into a single error with [`GuardFailures::into_result`]. Precedence: missing
/// rows, then unit conflicts (all units listed), then stale reservations, then
/// capacity.
#[derive(Debug, Default)]
pub struct GuardFailures {
    missing: Option<String>,
    conflicts: BTreeSet<UnitId>,
    stale: Option<ReservationId>,
    capacity: Option<(FacilityId, EquipmentType, u32)>,
}

impl GuardFailures {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A guard referenced a row that does not exist.
    pub fn missing(&mut self, what: impl Into<String>) {
        if self.missing.is_none() {
            self.missing = Some(what.into());
        }
    }

    /// A unit guard failed.
    pub fn conflict(&mut self, unit_id: UnitId) {
        self.conflicts.insert(unit_id);
    }

    /// A reservation guard failed.
    pub fn stale(&mut self, reservation_id: ReservationId) {
        if self.stale.is_none() {
            self.stale = Some(reservation_id);
        }
    }

    /// A unit count guard failed.
    pub fn capacity(&mut self, facility_id: FacilityId, equipment_type: EquipmentType, limit: u32) {
        if self.capacity.is_none() {
            self.capacity = Some((facility_id, equipment_type, limit));
        }
    }

    /// No guard failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_none()
            && self.conflicts.is_empty()
            && self.stale.is_none()
            && self.capacity.is_none()
    }

    /// `Ok(())` when every guard held, otherwise the highest-precedence error.
    ///
    /// # Errors
    ///
    /// Returns the [`LedgerError`] describing the recorded failures.
    pub fn into_result(self) -> Result<(), LedgerError> {
        if let Some(what) = self.missing {
            return Err(LedgerError::MissingRow(what));
        }
        if !self.conflicts.is_empty() {
            return Err(LedgerError::Conflict {
                units: self.conflicts.into_iter().collect(),
            });
        }
        if let Some(reservation_id) = self.stale {
            return Err(LedgerError::StaleReservation { reservation_id });
        }
        if let Some((facility_id, equipment_type, total_count)) = self.capacity {
            return Err(LedgerError::CapacityExceeded {
                facility_id,
                equipment_type,
                total_count,
            });
        }
        Ok(())
    }
}

/// Storage for units, facility configs and reservations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the scheduler shares one store as
/// `Arc<dyn LedgerStore>` across all concurrent callers.
///
/// # Dyn Compatibility
///
/// Methods return [`LedgerFuture`] instead of using `async fn` so the trait can
/// be used as a trait object.
pub trait LedgerStore: Send + Sync {
    /// Looks up one unit.
    fn unit(&self, unit_id: UnitId) -> LedgerFuture<'_, Option<EquipmentUnit>>;

    /// Units at a facility, optionally restricted to one type.
    ///
    /// Ordered by name, then id.
    fn units(
        &self,
        facility_id: FacilityId,
        equipment_type: Option<EquipmentType>,
    ) -> LedgerFuture<'_, Vec<EquipmentUnit>>;

    /// Config for `(facility, type)`, if any.
    fn facility_config(
        &self,
        facility_id: FacilityId,
        equipment_type: EquipmentType,
    ) -> LedgerFuture<'_, Option<FacilityEquipmentConfig>>;

    /// Every config at a facility, ordered by equipment type.
    fn facility_configs(
        &self,
        facility_id: FacilityId,
    ) -> LedgerFuture<'_, Vec<FacilityEquipmentConfig>>;

    /// Looks up one reservation.
    fn reservation(&self, reservation_id: ReservationId) -> LedgerFuture<'_, Option<Reservation>>;

    /// Active reservations on the given units.
    ///
    /// With `Some(window)` only reservations overlapping the window are returned.
    /// Ordered by window start.
    fn active_reservations(
        &self,
        unit_ids: Vec<UnitId>,
        window: Option<TimeWindow>,
    ) -> LedgerFuture<'_, Vec<Reservation>>;

    /// Every reservation of a session, in any status, ordered by creation.
    fn reservations_for_session(&self, session_id: SessionId)
    -> LedgerFuture<'_, Vec<Reservation>>;

    /// Applies a unit of work atomically.
    ///
    /// # Errors
    ///
    /// - `Conflict`, `StaleReservation`, `CapacityExceeded`, `MissingRow`: a guard failed
    /// - `Database`: the backend failed; nothing was applied
    fn commit(&self, work: UnitOfWork) -> LedgerFuture<'_, ()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap(),
        )
        .expect("valid window")
    }

    #[test]
    fn conflict_error_lists_units() {
        let a = UnitId::new();
        let b = UnitId::new();
        let error = LedgerError::Conflict { units: vec![a, b] };
        let display = error.to_string();
        assert!(display.contains(&a.to_string()));
        assert!(display.contains(&b.to_string()));
    }

    #[test]
    fn touched_units_are_sorted_and_unique() {
        let a = UnitId::new();
        let b = UnitId::new();
        let reservation = Reservation::new(
            a,
            SessionId::new(),
            window(),
            UserId::new(),
            Utc::now(),
        );
        let work = UnitOfWork::new()
            .guard(Guard::UnitFree {
                unit_id: b,
                window: window(),
            })
            .guard(Guard::UnitFree {
                unit_id: a,
                window: window(),
            })
            .write(LedgerWrite::SetUnitStatus {
                unit_id: a,
                status: EquipmentStatus::Reserved,
            })
            .write(LedgerWrite::InsertReservation(reservation));

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(work.touched_units(), expected);
        assert!(!work.is_empty());
        assert!(UnitOfWork::new().is_empty());
    }

    #[test]
    fn guard_failures_aggregate_every_conflicting_unit() {
        let a = UnitId::new();
        let b = UnitId::new();
        let mut failures = GuardFailures::new();
        failures.conflict(b);
        failures.conflict(a);
        failures.conflict(a);
        failures.stale(ReservationId::new());

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(
            failures.into_result(),
            Err(LedgerError::Conflict { units: expected })
        );
    }

    #[test]
    fn missing_rows_take_precedence() {
        let mut failures = GuardFailures::new();
        failures.conflict(UnitId::new());
        failures.missing("unit 42");
        assert_eq!(
            failures.into_result(),
            Err(LedgerError::MissingRow("unit 42".to_string()))
        );
    }

    #[test]
    fn empty_failures_pass() {
        let failures = GuardFailures::new();
        assert!(failures.is_empty());
        assert_eq!(failures.into_result(), Ok(()));
    }
}
