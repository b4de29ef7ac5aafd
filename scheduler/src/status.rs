//! Real-Time Status Aggregator.
//!
//! Read-only utilization snapshot of one facility. Counts come from the unit
//! status projection, so a snapshot may trail a commit that is in flight.

use crate::error::SchedulingError;
use crate::metrics;
use chrono::{DateTime, Utc};
use gearbook_core::environment::Clock;
use gearbook_core::{EquipmentStatus, EquipmentType, FacilityId, LedgerStore, Reservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Unit counts for one equipment type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeStatus {
    /// Equipment type
    pub equipment_type: EquipmentType,
    /// Registered units
    pub total: u32,
    /// Idle units
    pub available: u32,
    /// Units held by a reservation that is not checked in
    pub reserved: u32,
    /// Checked-in units
    pub in_use: u32,
    /// Units in maintenance
    pub maintenance: u32,
    /// Broken units
    pub out_of_order: u32,
    /// `(in_use + reserved) / total * 100`, 0 when there are no units
    pub utilization_rate: f64,
}

impl TypeStatus {
    const fn empty(equipment_type: EquipmentType) -> Self {
        Self {
            equipment_type,
            total: 0,
            available: 0,
            reserved: 0,
            in_use: 0,
            maintenance: 0,
            out_of_order: 0,
            utilization_rate: 0.0,
        }
    }

    const fn count(&mut self, status: EquipmentStatus) {
        self.total += 1;
        match status {
            EquipmentStatus::Available => self.available += 1,
            EquipmentStatus::Reserved => self.reserved += 1,
            EquipmentStatus::InUse => self.in_use += 1,
            EquipmentStatus::Maintenance => self.maintenance += 1,
            EquipmentStatus::OutOfOrder => self.out_of_order += 1,
        }
    }

    fn finish(&mut self) {
        self.utilization_rate = if self.total == 0 {
            0.0
        } else {
            f64::from(self.in_use + self.reserved) / f64::from(self.total) * 100.0
        };
    }
}

/// Utilization of one facility at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityStatus {
    /// Facility
    pub facility_id: FacilityId,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Per-type counts, in type order
    pub by_type: Vec<TypeStatus>,
    /// Active reservations whose window contains `timestamp`
    pub active_reservations_now: Vec<Reservation>,
}

/// Builds facility snapshots.
#[derive(Clone)]
pub struct StatusAggregator {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl StatusAggregator {
    /// Creates an aggregator reading from `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Current utilization of `facility_id`.
    ///
    /// Lists every type that has a config or at least one unit, and publishes
    /// the utilization gauge for each.
    ///
    /// # Errors
    ///
    /// [`SchedulingError::Ledger`] when the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self, facility_id: FacilityId) -> Result<FacilityStatus, SchedulingError> {
        let timestamp = self.clock.now();
        let units = self.ledger.units(facility_id, None).await?;
        let configs = self.ledger.facility_configs(facility_id).await?;

        let mut by_type: BTreeMap<EquipmentType, TypeStatus> = configs
            .iter()
            .map(|c| (c.equipment_type, TypeStatus::empty(c.equipment_type)))
            .collect();
        for unit in &units {
            by_type
                .entry(unit.equipment_type)
                .or_insert_with(|| TypeStatus::empty(unit.equipment_type))
                .count(unit.status);
        }

        let by_type: Vec<TypeStatus> = by_type
            .into_values()
            .map(|mut status| {
                status.finish();
                metrics::update_utilization(facility_id, status.equipment_type, status.utilization_rate);
                status
            })
            .collect();

        let active_reservations_now: Vec<Reservation> = self
            .ledger
            .active_reservations(units.iter().map(|u| u.id).collect(), None)
            .await?
            .into_iter()
            .filter(|r| r.covers(timestamp))
            .collect();

        Ok(FacilityStatus {
            facility_id,
            timestamp,
            by_type,
            active_reservations_now,
        })
    }
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator").finish_non_exhaustive()
    }
}
