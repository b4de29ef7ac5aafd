//! Bulk Reservation Coordinator.
//!
//! Owns every change to reservations and unit statuses. Each operation reads
//! what it needs, decides, and commits a single [`UnitOfWork`] whose guards pin
//! the facts it decided on. A unit of work is applied in full or not at all,
//! so a failed call never leaves a partial booking behind.
//!
//! Unit status is a projection of the unit's active reservations
//! ([`EquipmentStatus::occupancy`]). Every reservation change recomputes it and
//! writes it in the same unit of work, guarded by the active set and status
//! the computation started from.

use crate::availability::{AvailabilityEngine, AvailabilityReport, Requirement, Shortfall};
use crate::error::SchedulingError;
use crate::metrics;
use futures::future::try_join_all;
use gearbook_core::environment::Clock;
use gearbook_core::{
    EquipmentStatus, EquipmentType, EquipmentUnit, FacilityEquipmentConfig, FacilityId, Guard,
    LedgerError, LedgerStore, LedgerWrite, PlayerId, Reservation, ReservationId,
    ReservationStatus, SessionId, StatusTransition, TimeWindow, UnitId, UnitOfWork, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Result of a multi-type feasibility check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkAvailability {
    /// Every requirement can be met and no booking rule is broken
    pub can_accommodate: bool,
    /// One report per requested type, in request order
    pub per_type: Vec<AvailabilityReport>,
    /// Requirements that cannot be met
    pub shortfalls: Vec<Shortfall>,
}

impl BulkAvailability {
    /// Report for one type.
    #[must_use]
    pub fn report(&self, equipment_type: EquipmentType) -> Option<&AvailabilityReport> {
        self.per_type
            .iter()
            .find(|r| r.equipment_type == equipment_type)
    }
}

/// A booking of specific units for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Units to book
    pub unit_ids: Vec<UnitId>,
    /// Session the booking is for
    pub session_id: SessionId,
    /// Booked window
    pub window: TimeWindow,
    /// Staff member booking
    pub reserved_by: UserId,
    /// Player assigned to each unit, where known
    pub player_assignments: BTreeMap<UnitId, PlayerId>,
    /// Notes copied onto every reservation
    pub notes: Option<String>,
}

impl ReserveRequest {
    /// Books `unit_ids` with no player assignments or notes.
    #[must_use]
    pub fn new(
        unit_ids: Vec<UnitId>,
        session_id: SessionId,
        window: TimeWindow,
        reserved_by: UserId,
    ) -> Self {
        Self {
            unit_ids,
            session_id,
            window,
            reserved_by,
            player_assignments: BTreeMap::new(),
            notes: None,
        }
    }

    /// Assigns `player_id` to `unit_id`.
    #[must_use]
    pub fn assign(mut self, unit_id: UnitId, player_id: PlayerId) -> Self {
        self.player_assignments.insert(unit_id, player_id);
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn validate(&self) -> Result<(), SchedulingError> {
        if self.unit_ids.is_empty() {
            return Err(SchedulingError::InvalidRequest(
                "a reservation needs at least one unit".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = self.unit_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(SchedulingError::InvalidRequest(format!(
                "unit {duplicate} is listed twice"
            )));
        }

        if let Some(stray) = self
            .player_assignments
            .keys()
            .find(|id| !seen.contains(*id))
        {
            return Err(SchedulingError::InvalidRequest(format!(
                "player assigned to unit {stray}, which is not being reserved"
            )));
        }

        Ok(())
    }
}

/// Changes reservations and the unit statuses that mirror them.
#[derive(Clone)]
pub struct ReservationCoordinator {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    availability: AvailabilityEngine,
}

impl ReservationCoordinator {
    /// Creates a coordinator over `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        let availability = AvailabilityEngine::new(Arc::clone(&ledger), Arc::clone(&clock));
        Self {
            ledger,
            clock,
            availability,
        }
    }

    /// Checks several types at once.
    ///
    /// Requirements for the same type are merged by adding their counts. The
    /// per-type checks run concurrently.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::InvalidRequest`] for an empty request or a zero count
    /// - [`SchedulingError::ConfigurationMissing`] for an unconfigured type
    /// - [`SchedulingError::CapacityExceeded`] when a count exceeds the type's
    ///   `total_count`
    #[tracing::instrument(skip(self), name = "check_bulk")]
    pub async fn check_bulk(
        &self,
        requirements: &[Requirement],
        facility_id: FacilityId,
        window: TimeWindow,
    ) -> Result<BulkAvailability, SchedulingError> {
        let merged = merge_requirements(requirements)?;

        let per_type = try_join_all(merged.iter().map(|requirement| {
            self.availability.check(
                requirement.equipment_type,
                facility_id,
                window,
                requirement.count,
            )
        }))
        .await?;

        if let Some(report) = per_type.iter().find(|r| r.required_count > r.total_count) {
            return Err(SchedulingError::CapacityExceeded {
                facility_id,
                equipment_type: report.equipment_type,
                total_count: report.total_count,
            });
        }

        let shortfalls: Vec<Shortfall> = per_type
            .iter()
            .filter(|r| r.shortfall() > 0)
            .map(|r| Shortfall {
                equipment_type: r.equipment_type,
                requested: r.required_count,
                available: r.available_count(),
            })
            .collect();
        let can_accommodate = per_type.iter().all(AvailabilityReport::can_accommodate);

        tracing::debug!(can_accommodate, shortfalls = shortfalls.len(), "Bulk check done");
        Ok(BulkAvailability {
            can_accommodate,
            per_type,
            shortfalls,
        })
    }

    /// Books every unit in the request, or none of them.
    ///
    /// Availability is re-validated when the booking is committed, so a unit
    /// taken after an earlier [`check_bulk`](Self::check_bulk) fails the whole
    /// call. Not safe to retry blindly: re-run availability first.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::InvalidRequest`] for an empty or duplicated unit list
    /// - [`SchedulingError::NotFound`] for an unknown unit
    /// - [`SchedulingError::ConfigurationMissing`] for a unit whose type has no config
    /// - [`SchedulingError::RuleViolation`] when the window breaks a booking rule
    /// - [`SchedulingError::Conflict`] naming every unit that is not free
    #[tracing::instrument(
        skip(self, request),
        fields(session_id = %request.session_id, units = request.unit_ids.len())
    )]
    pub async fn reserve(&self, request: ReserveRequest) -> Result<Vec<Reservation>, SchedulingError> {
        request.validate()?;
        let now = self.clock.now();

        let units = try_join_all(request.unit_ids.iter().map(|id| self.load_unit(*id))).await?;

        let mut violations = Vec::new();
        for config in self.configs_for(&units).await?.values() {
            for violation in config.violations(&request.window, now) {
                if !violations.contains(&violation) {
                    violations.push(violation);
                }
            }
        }
        if !violations.is_empty() {
            tracing::warn!(?violations, "Reservation refused by booking rules");
            return Err(SchedulingError::RuleViolation(violations));
        }

        let mut active = self.active_by_unit(&request.unit_ids).await?;

        let mut work = UnitOfWork::new();
        let mut created = Vec::with_capacity(units.len());
        for unit in &units {
            let mut reservation = Reservation::new(
                unit.id,
                request.session_id,
                request.window,
                request.reserved_by,
                now,
            );
            reservation.player_id = request.player_assignments.get(&unit.id).copied();
            reservation.notes.clone_from(&request.notes);

            work.push_guard(Guard::UnitFree {
                unit_id: unit.id,
                window: request.window,
            });
            let before = active.remove(&unit.id).unwrap_or_default();
            project_unit(&mut work, unit, &before, std::slice::from_ref(&reservation));
            work.push_write(LedgerWrite::InsertReservation(reservation.clone()));
            created.push(reservation);
        }

        match self.commit("reserve", work).await {
            Ok(()) => {}
            Err(SchedulingError::Conflict { units }) => {
                metrics::record_reserve_conflict(units.len());
                tracing::warn!(?units, "Reservation lost to a concurrent booking");
                return Err(SchedulingError::Conflict { units });
            }
            Err(other) => return Err(other),
        }

        metrics::record_reservations_created(created.len());
        tracing::info!(reservations = created.len(), "Units reserved");
        Ok(created)
    }

    /// Records the holder's arrival.
    ///
    /// Allowed while the reservation is active and not yet checked in, from
    /// `check_in_buffer_minutes` before its start until its end. The unit
    /// becomes in use and `user_id` is recorded as `checked_in_by`.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown reservation
    /// - [`SchedulingError::InvalidState`] outside those conditions
    #[tracing::instrument(skip(self), name = "check_in")]
    pub async fn check_in(
        &self,
        reservation_id: ReservationId,
        user_id: UserId,
    ) -> Result<Reservation, SchedulingError> {
        let (reservation, unit) = self.load_reservation(reservation_id).await?;
        let config = self.config_for(&unit).await?;
        let now = self.clock.now();

        self.settle("check_in", reservation, &unit, Some(false), |r| {
            r.check_in(now, config.check_in_buffer(), user_id)
        })
        .await
    }

    /// Records the holder leaving and completes the reservation. `user_id` is
    /// recorded as `checked_out_by`.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown reservation
    /// - [`SchedulingError::InvalidState`] unless the reservation is active and
    ///   checked in
    #[tracing::instrument(skip(self), name = "check_out")]
    pub async fn check_out(
        &self,
        reservation_id: ReservationId,
        user_id: UserId,
    ) -> Result<Reservation, SchedulingError> {
        let (reservation, unit) = self.load_reservation(reservation_id).await?;
        let now = self.clock.now();

        self.settle("check_out", reservation, &unit, Some(true), |r| {
            r.check_out(now, user_id)
        })
        .await
    }

    /// Completes an active reservation without a checkout.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown reservation
    /// - [`SchedulingError::InvalidState`] unless the reservation is active
    #[tracing::instrument(skip(self), name = "complete")]
    pub async fn complete(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, SchedulingError> {
        let (reservation, unit) = self.load_reservation(reservation_id).await?;

        self.settle("complete", reservation, &unit, None, Reservation::complete)
            .await
    }

    /// Cancels an active reservation and frees its unit.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown reservation
    /// - [`SchedulingError::InvalidState`] unless the reservation is active;
    ///   cancelling twice is an error
    #[tracing::instrument(skip(self), name = "cancel")]
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        reason: Option<String>,
    ) -> Result<Reservation, SchedulingError> {
        let (reservation, unit) = self.load_reservation(reservation_id).await?;

        self.settle("cancel", reservation, &unit, None, |r| r.cancel(reason))
            .await
    }

    /// Marks a reservation whose holder never arrived.
    ///
    /// Allowed once the check-in buffer after its start has passed without a
    /// check-in.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown reservation
    /// - [`SchedulingError::InvalidState`] when it is not active, was checked in,
    ///   or the grace period has not passed
    #[tracing::instrument(skip(self), name = "mark_no_show")]
    pub async fn mark_no_show(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, SchedulingError> {
        let (reservation, unit) = self.load_reservation(reservation_id).await?;
        let config = self.config_for(&unit).await?;
        let now = self.clock.now();

        self.settle("no_show", reservation, &unit, Some(false), |r| {
            r.mark_no_show(now, config.check_in_buffer())
        })
        .await
    }

    /// Cancels every active reservation of a session in one unit of work.
    ///
    /// Returns the cancelled reservations; a session with nothing active
    /// returns an empty list.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::Conflict`] when a unit changed concurrently
    /// - [`SchedulingError::InvalidState`] when a reservation changed concurrently
    #[tracing::instrument(skip(self), name = "cancel_session")]
    pub async fn cancel_session(
        &self,
        session_id: SessionId,
        reason: Option<String>,
    ) -> Result<Vec<Reservation>, SchedulingError> {
        let session = self.ledger.reservations_for_session(session_id).await?;
        let mut by_unit: BTreeMap<UnitId, Vec<Reservation>> = BTreeMap::new();
        for reservation in session.into_iter().filter(Reservation::is_active) {
            by_unit.entry(reservation.unit_id).or_default().push(reservation);
        }
        if by_unit.is_empty() {
            return Ok(Vec::new());
        }

        let unit_ids: Vec<UnitId> = by_unit.keys().copied().collect();
        let units = try_join_all(unit_ids.iter().map(|id| self.load_unit(*id))).await?;
        let mut active = self.active_by_unit(&unit_ids).await?;

        let mut work = UnitOfWork::new();
        let mut cancelled = Vec::new();
        for unit in &units {
            let mut changed = by_unit.remove(&unit.id).unwrap_or_default();
            for reservation in &mut changed {
                work.push_guard(Guard::ReservationStatus {
                    reservation_id: reservation.id,
                    expected: ReservationStatus::Active,
                    checked_in: None,
                });
                reservation.cancel(reason.clone())?;
            }

            let before = active.remove(&unit.id).unwrap_or_default();
            project_unit(&mut work, unit, &before, &changed);
            for reservation in changed {
                work.push_write(LedgerWrite::UpdateReservation(reservation.clone()));
                cancelled.push(reservation);
            }
        }

        self.commit("cancel_session", work).await?;

        for _ in &cancelled {
            metrics::record_reservation_step("cancelled");
        }
        tracing::info!(cancelled = cancelled.len(), "Session cancelled");
        Ok(cancelled)
    }

    /// Takes an idle unit out for service.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown unit
    /// - [`SchedulingError::InvalidState`] while the unit is reserved or in use,
    ///   or already in maintenance
    pub async fn begin_maintenance(&self, unit_id: UnitId) -> Result<EquipmentUnit, SchedulingError> {
        self.transition_unit(unit_id, StatusTransition::BeginMaintenance)
            .await
    }

    /// Marks an idle unit as broken.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown unit
    /// - [`SchedulingError::InvalidState`] while the unit is reserved or in use,
    ///   or already out of order
    pub async fn report_fault(&self, unit_id: UnitId) -> Result<EquipmentUnit, SchedulingError> {
        self.transition_unit(unit_id, StatusTransition::ReportFault)
            .await
    }

    /// Puts a unit in maintenance or out of order back into rotation.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::NotFound`] for an unknown unit
    /// - [`SchedulingError::InvalidState`] when the unit is already in service
    pub async fn return_to_service(&self, unit_id: UnitId) -> Result<EquipmentUnit, SchedulingError> {
        self.transition_unit(unit_id, StatusTransition::ReturnToService)
            .await
    }

    #[tracing::instrument(skip(self), name = "unit_transition")]
    async fn transition_unit(
        &self,
        unit_id: UnitId,
        transition: StatusTransition,
    ) -> Result<EquipmentUnit, SchedulingError> {
        let mut unit = self.load_unit(unit_id).await?;
        if unit.status.is_occupied() {
            tracing::warn!(status = %unit.status, "Unit is held by a reservation");
            return Err(SchedulingError::InvalidState(format!(
                "unit {unit_id} is {} and cannot change status manually",
                unit.status
            )));
        }

        let next = unit.status.apply(transition)?;
        let work = UnitOfWork::new()
            .guard(Guard::UnitStatus {
                unit_id,
                expected: unit.status,
            })
            .guard(Guard::UnitOccupancy {
                unit_id,
                active: Vec::new(),
            })
            .write(LedgerWrite::SetUnitStatus {
                unit_id,
                status: next,
            });
        self.commit("unit_transition", work).await?;

        tracing::info!(from = %unit.status, to = %next, "Unit status changed");
        unit.status = next;
        Ok(unit)
    }

    /// Applies `change` to one reservation and commits it with the unit's
    /// recomputed status.
    async fn settle<F>(
        &self,
        step: &'static str,
        mut reservation: Reservation,
        unit: &EquipmentUnit,
        checked_in: Option<bool>,
        change: F,
    ) -> Result<Reservation, SchedulingError>
    where
        F: FnOnce(&mut Reservation) -> Result<(), gearbook_core::LifecycleError>,
    {
        let expected = reservation.status;
        if let Err(error) = change(&mut reservation) {
            tracing::warn!(reservation_id = %reservation.id, %error, "Reservation transition refused");
            return Err(error.into());
        }

        let before = self
            .ledger
            .active_reservations(vec![unit.id], None)
            .await?;

        let mut work = UnitOfWork::new().guard(Guard::ReservationStatus {
            reservation_id: reservation.id,
            expected,
            checked_in,
        });
        project_unit(&mut work, unit, &before, std::slice::from_ref(&reservation));
        work.push_write(LedgerWrite::UpdateReservation(reservation.clone()));

        self.commit(step, work).await?;

        metrics::record_reservation_step(match step {
            "check_in" => "checked_in",
            "check_out" | "complete" => "completed",
            "cancel" => "cancelled",
            _ => "no_show",
        });
        tracing::info!(reservation_id = %reservation.id, status = %reservation.status, "Reservation updated");
        Ok(reservation)
    }

    async fn commit(&self, operation: &'static str, work: UnitOfWork) -> Result<(), SchedulingError> {
        let started = Instant::now();
        let result = self.ledger.commit(work).await;
        metrics::record_commit_duration(operation, started.elapsed().as_secs_f64());

        result.map_err(|error| {
            if !matches!(error, LedgerError::Conflict { .. }) {
                tracing::warn!(operation, %error, "Commit failed");
            }
            SchedulingError::from(error)
        })
    }

    async fn load_unit(&self, unit_id: UnitId) -> Result<EquipmentUnit, SchedulingError> {
        self.ledger
            .unit(unit_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("unit", unit_id))
    }

    async fn load_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<(Reservation, EquipmentUnit), SchedulingError> {
        let reservation = self
            .ledger
            .reservation(reservation_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("reservation", reservation_id))?;
        let unit = self.load_unit(reservation.unit_id).await?;
        Ok((reservation, unit))
    }

    async fn config_for(&self, unit: &EquipmentUnit) -> Result<FacilityEquipmentConfig, SchedulingError> {
        self.ledger
            .facility_config(unit.facility_id, unit.equipment_type)
            .await?
            .ok_or(SchedulingError::ConfigurationMissing {
                facility_id: unit.facility_id,
                equipment_type: unit.equipment_type,
            })
    }

    async fn configs_for(
        &self,
        units: &[EquipmentUnit],
    ) -> Result<BTreeMap<(FacilityId, EquipmentType), FacilityEquipmentConfig>, SchedulingError> {
        let mut configs = BTreeMap::new();
        for unit in units {
            let key = (unit.facility_id, unit.equipment_type);
            if !configs.contains_key(&key) {
                configs.insert(key, self.config_for(unit).await?);
            }
        }
        Ok(configs)
    }

    async fn active_by_unit(
        &self,
        unit_ids: &[UnitId],
    ) -> Result<HashMap<UnitId, Vec<Reservation>>, SchedulingError> {
        let mut by_unit: HashMap<UnitId, Vec<Reservation>> = HashMap::new();
        for reservation in self
            .ledger
            .active_reservations(unit_ids.to_vec(), None)
            .await?
        {
            by_unit.entry(reservation.unit_id).or_default().push(reservation);
        }
        Ok(by_unit)
    }
}

impl std::fmt::Debug for ReservationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationCoordinator").finish_non_exhaustive()
    }
}

/// Adds the unit side of a reservation change to `work`.
///
/// `before` is the unit's active set as read; `changed` holds new or updated
/// reservations on the unit. Guards pin the status and active set, and the
/// status write follows the active set after the change.
fn project_unit(
    work: &mut UnitOfWork,
    unit: &EquipmentUnit,
    before: &[Reservation],
    changed: &[Reservation],
) {
    let mut observed: Vec<ReservationId> = before.iter().map(|r| r.id).collect();
    observed.sort();

    let mut after: BTreeMap<ReservationId, &Reservation> =
        before.iter().map(|r| (r.id, r)).collect();
    for reservation in changed {
        after.insert(reservation.id, reservation);
    }
    let remaining: Vec<&Reservation> = after.into_values().filter(|r| r.is_active()).collect();

    work.push_guard(Guard::UnitStatus {
        unit_id: unit.id,
        expected: unit.status,
    });
    work.push_guard(Guard::UnitOccupancy {
        unit_id: unit.id,
        active: observed,
    });

    if unit.status.is_in_service() {
        let next = EquipmentStatus::occupancy(
            remaining.len(),
            remaining.iter().any(|r| r.is_checked_in()),
        );
        if next != unit.status {
            work.push_write(LedgerWrite::SetUnitStatus {
                unit_id: unit.id,
                status: next,
            });
        }
    }
}

fn merge_requirements(requirements: &[Requirement]) -> Result<Vec<Requirement>, SchedulingError> {
    if requirements.is_empty() {
        return Err(SchedulingError::InvalidRequest(
            "at least one requirement is needed".into(),
        ));
    }

    let mut merged: Vec<Requirement> = Vec::new();
    for requirement in requirements {
        if requirement.count == 0 {
            return Err(SchedulingError::InvalidRequest(format!(
                "requirement for {} asks for zero units",
                requirement.equipment_type
            )));
        }
        match merged
            .iter_mut()
            .find(|m| m.equipment_type == requirement.equipment_type)
        {
            Some(existing) => existing.count = existing.count.saturating_add(requirement.count),
            None => merged.push(*requirement),
        }
    }
    Ok(merged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn unit(status: EquipmentStatus) -> EquipmentUnit {
        let mut unit = EquipmentUnit::new(EquipmentType::Rower, "rower 01", FacilityId::new(), "Main floor");
        unit.status = status;
        unit
    }

    #[test]
    fn requirements_of_one_type_are_merged() {
        let merged = merge_requirements(&[
            Requirement::new(EquipmentType::Rower, 2),
            Requirement::new(EquipmentType::Treadmill, 1),
            Requirement::new(EquipmentType::Rower, 1),
        ])
        .unwrap();
        assert_eq!(
            merged,
            vec![
                Requirement::new(EquipmentType::Rower, 3),
                Requirement::new(EquipmentType::Treadmill, 1),
            ]
        );
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(merge_requirements(&[Requirement::new(EquipmentType::Rower, 0)]).is_err());
        assert!(merge_requirements(&[]).is_err());
    }

    #[test]
    fn duplicate_units_are_rejected() {
        let unit_id = UnitId::new();
        let request = ReserveRequest::new(vec![unit_id, unit_id], SessionId::new(), window(), UserId::new());
        assert!(matches!(
            request.validate(),
            Err(SchedulingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn players_must_be_assigned_to_requested_units() {
        let request = ReserveRequest::new(vec![UnitId::new()], SessionId::new(), window(), UserId::new())
            .assign(UnitId::new(), PlayerId::new());
        assert!(request.validate().is_err());
    }

    #[test]
    fn reserving_an_idle_unit_marks_it_reserved() {
        let unit = unit(EquipmentStatus::Available);
        let reservation = Reservation::new(unit.id, SessionId::new(), window(), UserId::new(), window().from());

        let mut work = UnitOfWork::new();
        project_unit(&mut work, &unit, &[], std::slice::from_ref(&reservation));

        assert!(work.writes().contains(&LedgerWrite::SetUnitStatus {
            unit_id: unit.id,
            status: EquipmentStatus::Reserved,
        }));
        assert!(work.guards().contains(&Guard::UnitOccupancy {
            unit_id: unit.id,
            active: Vec::new(),
        }));
    }

    #[test]
    fn releasing_the_reservation_frees_the_unit() {
        let unit = unit(EquipmentStatus::Reserved);
        let held = Reservation::new(unit.id, SessionId::new(), window(), UserId::new(), window().from());
        let mut cancelled = held.clone();
        cancelled.cancel(None).unwrap();

        let mut work = UnitOfWork::new();
        project_unit(&mut work, &unit, std::slice::from_ref(&held), &[cancelled]);

        assert_eq!(
            work.writes(),
            &[LedgerWrite::SetUnitStatus {
                unit_id: unit.id,
                status: EquipmentStatus::Available,
            }]
        );
        assert!(work.guards().contains(&Guard::UnitOccupancy {
            unit_id: unit.id,
            active: vec![held.id],
        }));
    }

    #[test]
    fn units_out_of_service_keep_their_status() {
        let unit = unit(EquipmentStatus::Maintenance);
        let reservation = Reservation::new(unit.id, SessionId::new(), window(), UserId::new(), window().from());

        let mut work = UnitOfWork::new();
        project_unit(&mut work, &unit, &[], &[reservation]);

        assert!(work.writes().is_empty());
    }
}
