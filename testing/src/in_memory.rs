//! In-memory ledger for fast, deterministic tests.
//!
//! [`InMemoryLedger`] implements [`LedgerStore`] over plain collections behind
//! one lock. Reservations live in an append-only arena; lookups by id, unit and
//! session go through index maps, so units never hold their reservations.
//!
//! Commits take the write lock, evaluate every guard against the current state,
//! then apply the writes to a copy of the tables and swap it in. A failing guard
//! or write leaves the tables untouched.

use gearbook_core::ledger::{GuardFailures, LedgerFuture, LedgerStore};
use gearbook_core::{
    EquipmentStatus, EquipmentType, EquipmentUnit, FacilityEquipmentConfig, FacilityId, Guard,
    LedgerError, LedgerWrite, Reservation, ReservationId, SessionId, TimeWindow, UnitId,
    UnitOfWork,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Everything the in-memory ledger stores.
///
/// Cloneable and comparable so tests can snapshot the ledger before an
/// operation and assert it is unchanged afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerTables {
    units: BTreeMap<UnitId, EquipmentUnit>,
    configs: BTreeMap<(FacilityId, EquipmentType), FacilityEquipmentConfig>,
    reservations: Vec<Reservation>,
    by_id: HashMap<ReservationId, usize>,
    by_unit: HashMap<UnitId, Vec<usize>>,
    by_session: HashMap<SessionId, Vec<usize>>,
}

impl LedgerTables {
    /// All units, ordered by id.
    pub fn units(&self) -> impl Iterator<Item = &EquipmentUnit> {
        self.units.values()
    }

    /// All reservations, in insertion order.
    #[must_use]
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Status of one unit.
    #[must_use]
    pub fn unit_status(&self, unit_id: UnitId) -> Option<EquipmentStatus> {
        self.units.get(&unit_id).map(|unit| unit.status)
    }

    fn reservation(&self, reservation_id: ReservationId) -> Option<&Reservation> {
        self.by_id
            .get(&reservation_id)
            .and_then(|&index| self.reservations.get(index))
    }

    fn unit_reservations(&self, unit_id: UnitId) -> impl Iterator<Item = &Reservation> {
        self.by_unit
            .get(&unit_id)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.reservations.get(index))
    }

    fn has_overlapping_active(&self, unit_id: UnitId, window: &TimeWindow) -> bool {
        self.unit_reservations(unit_id)
            .any(|r| r.is_active() && r.window.overlaps(window))
    }

    fn active_ids(&self, unit_id: UnitId) -> Vec<ReservationId> {
        let mut ids: Vec<ReservationId> = self
            .unit_reservations(unit_id)
            .filter(|r| r.is_active())
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    fn count_units(&self, facility_id: FacilityId, equipment_type: EquipmentType) -> usize {
        self.units
            .values()
            .filter(|u| u.facility_id == facility_id && u.equipment_type == equipment_type)
            .count()
    }

    fn check(&self, guards: &[Guard]) -> Result<(), LedgerError> {
        let mut failures = GuardFailures::new();

        for guard in guards {
            match guard {
                Guard::UnitFree { unit_id, window } => match self.units.get(unit_id) {
                    None => failures.missing(format!("unit {unit_id}")),
                    Some(unit) => {
                        if unit.status != EquipmentStatus::Available
                            || self.has_overlapping_active(*unit_id, window)
                        {
                            failures.conflict(*unit_id);
                        }
                    }
                },
                Guard::UnitStatus { unit_id, expected } => match self.units.get(unit_id) {
                    None => failures.missing(format!("unit {unit_id}")),
                    Some(unit) if unit.status != *expected => failures.conflict(*unit_id),
                    Some(_) => {}
                },
                Guard::UnitOccupancy { unit_id, active } => {
                    if !self.units.contains_key(unit_id) {
                        failures.missing(format!("unit {unit_id}"));
                    } else if self.active_ids(*unit_id) != *active {
                        failures.conflict(*unit_id);
                    }
                }
                Guard::ReservationStatus {
                    reservation_id,
                    expected,
                    checked_in,
                } => match self.reservation(*reservation_id) {
                    None => failures.missing(format!("reservation {reservation_id}")),
                    Some(r) => {
                        let check_in_matches =
                            checked_in.is_none_or(|wanted| wanted == r.is_checked_in());
                        if r.status != *expected || !check_in_matches {
                            failures.stale(*reservation_id);
                        }
                    }
                },
                Guard::UnitCount {
                    facility_id,
                    equipment_type,
                    adding,
                    limit,
                } => {
                    let registered = self.count_units(*facility_id, *equipment_type);
                    let after = u64::try_from(registered)
                        .unwrap_or(u64::MAX)
                        .saturating_add(u64::from(*adding));
                    if after > u64::from(*limit) {
                        failures.capacity(*facility_id, *equipment_type, *limit);
                    }
                }
            }
        }

        failures.into_result()
    }

    fn apply(&mut self, write: LedgerWrite) -> Result<(), LedgerError> {
        match write {
            LedgerWrite::InsertUnit(unit) => {
                if self.units.contains_key(&unit.id) {
                    return Err(LedgerError::Database(format!("duplicate unit {}", unit.id)));
                }
                self.units.insert(unit.id, unit);
            }
            LedgerWrite::UpsertConfig(config) => {
                self.configs
                    .insert((config.facility_id, config.equipment_type), config);
            }
            LedgerWrite::InsertReservation(reservation) => {
                if self.by_id.contains_key(&reservation.id) {
                    return Err(LedgerError::Database(format!(
                        "duplicate reservation {}",
                        reservation.id
                    )));
                }
                if !self.units.contains_key(&reservation.unit_id) {
                    return Err(LedgerError::MissingRow(format!(
                        "unit {}",
                        reservation.unit_id
                    )));
                }
                let index = self.reservations.len();
                self.by_id.insert(reservation.id, index);
                self.by_unit
                    .entry(reservation.unit_id)
                    .or_default()
                    .push(index);
                self.by_session
                    .entry(reservation.session_id)
                    .or_default()
                    .push(index);
                self.reservations.push(reservation);
            }
            LedgerWrite::UpdateReservation(reservation) => {
                let slot = self
                    .by_id
                    .get(&reservation.id)
                    .and_then(|&index| self.reservations.get_mut(index))
                    .ok_or_else(|| {
                        LedgerError::MissingRow(format!("reservation {}", reservation.id))
                    })?;
                if slot.unit_id != reservation.unit_id {
                    return Err(LedgerError::Database(format!(
                        "reservation {} cannot move to another unit",
                        reservation.id
                    )));
                }
                *slot = reservation;
            }
            LedgerWrite::SetUnitStatus { unit_id, status } => {
                let unit = self
                    .units
                    .get_mut(&unit_id)
                    .ok_or_else(|| LedgerError::MissingRow(format!("unit {unit_id}")))?;
                unit.status = status;
            }
        }
        Ok(())
    }
}

/// In-memory [`LedgerStore`].
///
/// Cheap to clone; clones share the same tables.
///
/// # Example
///
/// ```
/// use gearbook_core::ledger::{LedgerStore, LedgerWrite, UnitOfWork};
/// use gearbook_core::{EquipmentType, FacilityEquipmentConfig, FacilityId};
/// use gearbook_testing::InMemoryLedger;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = InMemoryLedger::new();
/// let facility = FacilityId::new();
/// let config = FacilityEquipmentConfig::new(facility, EquipmentType::Rower, 2);
///
/// ledger
///     .commit(UnitOfWork::new().write(LedgerWrite::UpsertConfig(config)))
///     .await?;
///
/// assert!(ledger.facility_config(facility, EquipmentType::Rower).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<LedgerTables>>,
    commits: Arc<AtomicU64>,
    injected: Arc<Mutex<Option<LedgerError>>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current tables.
    #[must_use]
    pub fn snapshot(&self) -> LedgerTables {
        self.read().clone()
    }

    /// Number of successfully applied units of work.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes the next commit fail with `error` without touching the tables.
    pub fn fail_next_commit(&self, error: LedgerError) {
        *self
            .injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_now(&self, work: UnitOfWork) -> Result<(), LedgerError> {
        if let Some(error) = self
            .injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(error);
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let (guards, writes) = work.into_parts();
        tables.check(&guards)?;

        let mut next = tables.clone();
        for write in writes {
            next.apply(write)?;
        }
        *tables = next;
        drop(tables);

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl LedgerStore for InMemoryLedger {
    fn unit(&self, unit_id: UnitId) -> LedgerFuture<'_, Option<EquipmentUnit>> {
        let unit = self.read().units.get(&unit_id).cloned();
        Box::pin(async move { Ok(unit) })
    }

    fn units(
        &self,
        facility_id: FacilityId,
        equipment_type: Option<EquipmentType>,
    ) -> LedgerFuture<'_, Vec<EquipmentUnit>> {
        let mut units: Vec<EquipmentUnit> = self
            .read()
            .units
            .values()
            .filter(|u| u.facility_id == facility_id)
            .filter(|u| equipment_type.is_none_or(|t| u.equipment_type == t))
            .cloned()
            .collect();
        units.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Box::pin(async move { Ok(units) })
    }

    fn facility_config(
        &self,
        facility_id: FacilityId,
        equipment_type: EquipmentType,
    ) -> LedgerFuture<'_, Option<FacilityEquipmentConfig>> {
        let config = self
            .read()
            .configs
            .get(&(facility_id, equipment_type))
            .cloned();
        Box::pin(async move { Ok(config) })
    }

    fn facility_configs(
        &self,
        facility_id: FacilityId,
    ) -> LedgerFuture<'_, Vec<FacilityEquipmentConfig>> {
        let configs: Vec<FacilityEquipmentConfig> = self
            .read()
            .configs
            .iter()
            .filter(|((facility, _), _)| *facility == facility_id)
            .map(|(_, config)| config.clone())
            .collect();
        Box::pin(async move { Ok(configs) })
    }

    fn reservation(&self, reservation_id: ReservationId) -> LedgerFuture<'_, Option<Reservation>> {
        let reservation = self.read().reservation(reservation_id).cloned();
        Box::pin(async move { Ok(reservation) })
    }

    fn active_reservations(
        &self,
        unit_ids: Vec<UnitId>,
        window: Option<TimeWindow>,
    ) -> LedgerFuture<'_, Vec<Reservation>> {
        let tables = self.read();
        let mut found: Vec<Reservation> = unit_ids
            .iter()
            .flat_map(|unit_id| tables.unit_reservations(*unit_id))
            .filter(|r| r.is_active())
            .filter(|r| window.is_none_or(|w| r.window.overlaps(&w)))
            .cloned()
            .collect();
        drop(tables);
        found.sort_by(|a, b| a.window.cmp(&b.window).then(a.id.cmp(&b.id)));
        found.dedup_by_key(|r| r.id);
        Box::pin(async move { Ok(found) })
    }

    fn reservations_for_session(
        &self,
        session_id: SessionId,
    ) -> LedgerFuture<'_, Vec<Reservation>> {
        let tables = self.read();
        let found: Vec<Reservation> = tables
            .by_session
            .get(&session_id)
            .into_iter()
            .flatten()
            .filter_map(|&index| tables.reservations.get(index))
            .cloned()
            .collect();
        drop(tables);
        Box::pin(async move { Ok(found) })
    }

    fn commit(&self, work: UnitOfWork) -> LedgerFuture<'_, ()> {
        let result = self.commit_now(work);
        if let Err(error) = &result {
            tracing::debug!(%error, "in-memory commit rejected");
        }
        Box::pin(async move { result })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gearbook_core::{ReservationStatus, UserId};

    fn window(from: u32, until: u32) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, from, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, until, 0, 0).unwrap(),
        )
        .expect("valid window")
    }

    async fn ledger_with_unit() -> (InMemoryLedger, EquipmentUnit) {
        let ledger = InMemoryLedger::new();
        let facility = FacilityId::new();
        let unit = EquipmentUnit::new(EquipmentType::Rower, "Rower 1", facility, "Hall A");
        ledger
            .commit(UnitOfWork::new().write(LedgerWrite::InsertUnit(unit.clone())))
            .await
            .unwrap();
        (ledger, unit)
    }

    fn reserve(unit: &EquipmentUnit, w: TimeWindow) -> (UnitOfWork, Reservation) {
        let reservation = Reservation::new(unit.id, SessionId::new(), w, UserId::new(), Utc::now());
        let work = UnitOfWork::new()
            .guard(Guard::UnitFree {
                unit_id: unit.id,
                window: w,
            })
            .write(LedgerWrite::SetUnitStatus {
                unit_id: unit.id,
                status: EquipmentStatus::Reserved,
            })
            .write(LedgerWrite::InsertReservation(reservation.clone()));
        (work, reservation)
    }

    #[tokio::test]
    async fn guarded_reservation_commits_once() {
        let (ledger, unit) = ledger_with_unit().await;

        let (first, reservation) = reserve(&unit, window(10, 11));
        ledger.commit(first).await.unwrap();

        let (second, _) = reserve(&unit, window(10, 11));
        assert_eq!(
            ledger.commit(second).await,
            Err(LedgerError::Conflict {
                units: vec![unit.id]
            })
        );

        let stored = ledger.reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Active);
        assert_eq!(
            ledger.snapshot().unit_status(unit.id),
            Some(EquipmentStatus::Reserved)
        );
    }

    #[tokio::test]
    async fn reserved_unit_refuses_a_later_window() {
        let (ledger, unit) = ledger_with_unit().await;
        let (first, _) = reserve(&unit, window(10, 11));
        ledger.commit(first).await.unwrap();

        let (later, _) = reserve(&unit, window(14, 15));
        assert_eq!(
            ledger.commit(later).await,
            Err(LedgerError::Conflict {
                units: vec![unit.id]
            })
        );
        assert_eq!(ledger.snapshot().reservations().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_rolls_back_earlier_writes() {
        let (ledger, unit) = ledger_with_unit().await;
        let before = ledger.snapshot();

        let work = UnitOfWork::new()
            .write(LedgerWrite::SetUnitStatus {
                unit_id: unit.id,
                status: EquipmentStatus::Maintenance,
            })
            .write(LedgerWrite::SetUnitStatus {
                unit_id: UnitId::new(),
                status: EquipmentStatus::Maintenance,
            });

        assert!(matches!(
            ledger.commit(work).await,
            Err(LedgerError::MissingRow(_))
        ));
        assert_eq!(ledger.snapshot(), before);
    }

    #[tokio::test]
    async fn stale_reservation_guard() {
        let (ledger, unit) = ledger_with_unit().await;
        let (work, reservation) = reserve(&unit, window(10, 11));
        ledger.commit(work).await.unwrap();

        let guard = Guard::ReservationStatus {
            reservation_id: reservation.id,
            expected: ReservationStatus::Active,
            checked_in: Some(true),
        };
        assert_eq!(
            ledger.commit(UnitOfWork::new().guard(guard)).await,
            Err(LedgerError::StaleReservation {
                reservation_id: reservation.id
            })
        );
    }

    #[tokio::test]
    async fn unit_count_guard_enforces_capacity() {
        let (ledger, unit) = ledger_with_unit().await;
        let guard = Guard::UnitCount {
            facility_id: unit.facility_id,
            equipment_type: EquipmentType::Rower,
            adding: 1,
            limit: 1,
        };
        assert!(matches!(
            ledger.commit(UnitOfWork::new().guard(guard)).await,
            Err(LedgerError::CapacityExceeded { total_count: 1, .. })
        ));
    }

    #[tokio::test]
    async fn active_reservations_filter_by_window() {
        let (ledger, unit) = ledger_with_unit().await;
        let (work, _) = reserve(&unit, window(10, 11));
        ledger.commit(work).await.unwrap();

        let touching = ledger
            .active_reservations(vec![unit.id], Some(window(11, 12)))
            .await
            .unwrap();
        assert!(touching.is_empty());

        let overlapping = ledger
            .active_reservations(vec![unit.id], Some(window(9, 12)))
            .await
            .unwrap();
        assert_eq!(overlapping.len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_leaves_tables_untouched() {
        let (ledger, unit) = ledger_with_unit().await;
        let before = ledger.snapshot();
        ledger.fail_next_commit(LedgerError::Database("connection reset".to_string()));

        let (work, _) = reserve(&unit, window(10, 11));
        assert!(matches!(
            ledger.commit(work).await,
            Err(LedgerError::Database(_))
        ));
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.commit_count(), 1);
    }
}
