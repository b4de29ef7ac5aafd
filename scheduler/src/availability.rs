//! Availability Engine.
//!
//! Answers "which units of this type are free at this facility for this
//! window". A unit is free when its status is `Available` and none of its
//! active reservations overlaps the window. The
//! facility's booking rules are evaluated alongside and reported as
//! violations; the engine never hides units because of them.

use crate::error::SchedulingError;
use crate::metrics;
use gearbook_core::environment::Clock;
use gearbook_core::{
    ConstraintViolation, EquipmentStatus, EquipmentType, EquipmentUnit, FacilityEquipmentConfig,
    FacilityId, LedgerStore, Reservation, TimeWindow, UnitId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A number of units of one type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Equipment type needed
    pub equipment_type: EquipmentType,
    /// How many units
    pub count: u32,
}

impl Requirement {
    /// `count` units of `equipment_type`.
    #[must_use]
    pub const fn new(equipment_type: EquipmentType, count: u32) -> Self {
        Self {
            equipment_type,
            count,
        }
    }
}

/// How far a requirement falls short.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    /// Equipment type
    pub equipment_type: EquipmentType,
    /// Units requested
    pub requested: u32,
    /// Units free in the window
    pub available: u32,
}

impl Shortfall {
    /// Units missing to satisfy the request.
    #[must_use]
    pub const fn missing(&self) -> u32 {
        self.requested.saturating_sub(self.available)
    }
}

/// Result of one availability check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    /// Equipment type checked
    pub equipment_type: EquipmentType,
    /// Facility checked
    pub facility_id: FacilityId,
    /// Window checked
    pub window: TimeWindow,
    /// Units the caller asked for
    pub required_count: u32,
    /// Configured unit count for the type
    pub total_count: u32,
    /// Free units, ordered by name then id
    pub available_units: Vec<EquipmentUnit>,
    /// Every active reservation of the type overlapping the window
    pub conflicts: Vec<Reservation>,
    /// Booking rules the window breaks
    pub violations: Vec<ConstraintViolation>,
}

impl AvailabilityReport {
    /// Number of free units.
    #[must_use]
    pub fn available_count(&self) -> u32 {
        u32::try_from(self.available_units.len()).unwrap_or(u32::MAX)
    }

    /// Enough free units and no rule violations.
    #[must_use]
    pub fn can_accommodate(&self) -> bool {
        self.violations.is_empty() && self.available_count() >= self.required_count
    }

    /// Units missing to satisfy `required_count`.
    #[must_use]
    pub fn shortfall(&self) -> u32 {
        self.required_count.saturating_sub(self.available_count())
    }

    /// Ids of the free units, in report order.
    #[must_use]
    pub fn available_ids(&self) -> Vec<UnitId> {
        self.available_units.iter().map(|u| u.id).collect()
    }
}

/// Availability queries over a ledger.
#[derive(Clone)]
pub struct AvailabilityEngine {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityEngine {
    /// Creates an engine reading from `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Free units of `equipment_type` at `facility_id` for `window`.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::ConfigurationMissing`] when the facility has no
    ///   config for the type
    /// - [`SchedulingError::Ledger`] when the store fails
    #[tracing::instrument(skip(self), name = "availability_check")]
    pub async fn check(
        &self,
        equipment_type: EquipmentType,
        facility_id: FacilityId,
        window: TimeWindow,
        required_count: u32,
    ) -> Result<AvailabilityReport, SchedulingError> {
        let config = self
            .ledger
            .facility_config(facility_id, equipment_type)
            .await?
            .ok_or(SchedulingError::ConfigurationMissing {
                facility_id,
                equipment_type,
            })?;

        self.check_with(&config, window, required_count).await
    }

    pub(crate) async fn check_with(
        &self,
        config: &FacilityEquipmentConfig,
        window: TimeWindow,
        required_count: u32,
    ) -> Result<AvailabilityReport, SchedulingError> {
        metrics::record_availability_check(config.equipment_type);

        let mut units = self
            .ledger
            .units(config.facility_id, Some(config.equipment_type))
            .await?;
        units.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let conflicts = self
            .ledger
            .active_reservations(units.iter().map(|u| u.id).collect(), Some(window))
            .await?;
        let busy: HashSet<UnitId> = conflicts
            .iter()
            .filter(|r| r.window.overlaps(&window))
            .map(|r| r.unit_id)
            .collect();

        let available_units: Vec<EquipmentUnit> = units
            .into_iter()
            .filter(|u| u.status == EquipmentStatus::Available && !busy.contains(&u.id))
            .collect();
        let violations = config.violations(&window, self.clock.now());

        tracing::debug!(
            available = available_units.len(),
            conflicts = conflicts.len(),
            violations = violations.len(),
            "Availability checked"
        );

        Ok(AvailabilityReport {
            equipment_type: config.equipment_type,
            facility_id: config.facility_id,
            window,
            required_count,
            total_count: config.total_count,
            available_units,
            conflicts,
            violations,
        })
    }
}

impl std::fmt::Debug for AvailabilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_counts_missing_units() {
        let shortfall = Shortfall {
            equipment_type: EquipmentType::Rower,
            requested: 3,
            available: 1,
        };
        assert_eq!(shortfall.missing(), 2);
    }
}
