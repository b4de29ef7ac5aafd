//! Equipment units and their status state machine.
//!
//! A unit's [`EquipmentStatus`] is a projection of reservation state plus the
//! manual service flags. Reservation changes move it with
//! [`EquipmentStatus::occupancy`]; staff actions move it through the guarded
//! transitions in [`EquipmentStatus::apply`].

use crate::ids::{FacilityId, UnitId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing stored enum values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

/// Kinds of physical training machines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    /// Motorised running belt
    Treadmill,
    /// Upright or recumbent bike
    StationaryBike,
    /// Indoor rowing ergometer
    Rower,
    /// Elliptical trainer
    Elliptical,
    /// Ski ergometer
    SkiErg,
    /// Fan bike
    AirBike,
    /// Squat rack / power cage
    SquatRack,
    /// Bench press station
    BenchPress,
    /// Cable crossover machine
    CableMachine,
    /// Leg press
    LegPress,
}

impl EquipmentType {
    /// Every equipment type, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Treadmill,
        Self::StationaryBike,
        Self::Rower,
        Self::Elliptical,
        Self::SkiErg,
        Self::AirBike,
        Self::SquatRack,
        Self::BenchPress,
        Self::CableMachine,
        Self::LegPress,
    ];

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Treadmill => "treadmill",
            Self::StationaryBike => "stationary_bike",
            Self::Rower => "rower",
            Self::Elliptical => "elliptical",
            Self::SkiErg => "ski_erg",
            Self::AirBike => "air_bike",
            Self::SquatRack => "squat_rack",
            Self::BenchPress => "bench_press",
            Self::CableMachine => "cable_machine",
            Self::LegPress => "leg_press",
        }
    }
}

impl FromStr for EquipmentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "equipment type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    /// Free to be reserved
    Available,
    /// Held by an active reservation that has not been checked in
    Reserved,
    /// Checked in and being used
    InUse,
    /// Taken out of rotation for scheduled service
    Maintenance,
    /// Broken, waiting for repair
    OutOfOrder,
}

/// Events that move a unit between statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusTransition {
    /// A reservation claimed the unit
    Reserve,
    /// The reservation holder checked in
    CheckIn,
    /// The reservation holder checked out
    CheckOut,
    /// The reservation ended without checkout (cancel, complete, no-show)
    Release,
    /// Staff took the unit out for service
    BeginMaintenance,
    /// Staff reported the unit broken
    ReportFault,
    /// Staff put the unit back into rotation
    ReturnToService,
}

/// A transition that is not allowed from the unit's current status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot apply {transition:?} to a unit that is {from}")]
pub struct InvalidTransition {
    /// Status the unit was in
    pub from: EquipmentStatus,
    /// Rejected transition
    pub transition: StatusTransition,
}

impl EquipmentStatus {
    /// Applies a transition, returning the next status.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the transition is not defined for the
    /// current status.
    pub const fn apply(self, transition: StatusTransition) -> Result<Self, InvalidTransition> {
        use EquipmentStatus::{Available, InUse, Maintenance, OutOfOrder, Reserved};
        use StatusTransition::{
            BeginMaintenance, CheckIn, CheckOut, Release, ReportFault, Reserve, ReturnToService,
        };

        match (self, transition) {
            (Available, Reserve) => Ok(Reserved),
            (Reserved, CheckIn) => Ok(InUse),
            (InUse, CheckOut) | (Reserved | InUse, Release) => Ok(Available),
            (Available | OutOfOrder, BeginMaintenance) => Ok(Maintenance),
            (Available | Maintenance, ReportFault) => Ok(OutOfOrder),
            (Maintenance | OutOfOrder, ReturnToService) => Ok(Available),
            (from, transition) => Err(InvalidTransition { from, transition }),
        }
    }

    /// Not blocked by maintenance or a fault. Only in-service units take new
    /// reservations.
    #[must_use]
    pub const fn is_in_service(self) -> bool {
        !matches!(self, Self::Maintenance | Self::OutOfOrder)
    }

    /// Status an in-service unit shows for its active reservations.
    ///
    /// `InUse` while any of them is checked in, `Reserved` while any exist,
    /// `Available` otherwise.
    #[must_use]
    pub const fn occupancy(active: usize, any_checked_in: bool) -> Self {
        if any_checked_in {
            Self::InUse
        } else if active > 0 {
            Self::Reserved
        } else {
            Self::Available
        }
    }

    /// Held by a reservation (reserved or in use).
    #[must_use]
    pub const fn is_occupied(self) -> bool {
        matches!(self, Self::Reserved | Self::InUse)
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::InUse => "in_use",
            Self::Maintenance => "maintenance",
            Self::OutOfOrder => "out_of_order",
        }
    }
}

impl FromStr for EquipmentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "reserved" => Ok(Self::Reserved),
            "in_use" => Ok(Self::InUse),
            "maintenance" => Ok(Self::Maintenance),
            "out_of_order" => Ok(Self::OutOfOrder),
            _ => Err(ParseEnumError {
                kind: "equipment status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical machine.
///
/// Reservations are not stored on the unit; look them up in the ledger by
/// unit id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquipmentUnit {
    /// Unique unit identifier
    pub id: UnitId,
    /// Kind of machine
    pub equipment_type: EquipmentType,
    /// Display name ("Rower 3")
    pub name: String,
    /// Facility housing the unit
    pub facility_id: FacilityId,
    /// Where in the facility the unit stands
    pub location: String,
    /// Current status projection
    pub status: EquipmentStatus,
    /// Date of the last service
    pub last_maintenance: Option<NaiveDate>,
    /// Date of the next scheduled service
    pub next_maintenance: Option<NaiveDate>,
    /// Free-form manufacturer specs
    pub specs: serde_json::Value,
}

impl EquipmentUnit {
    /// Creates a new available unit.
    #[must_use]
    pub fn new(
        equipment_type: EquipmentType,
        name: impl Into<String>,
        facility_id: FacilityId,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: UnitId::new(),
            equipment_type,
            name: name.into(),
            facility_id,
            location: location.into(),
            status: EquipmentStatus::Available,
            last_maintenance: None,
            next_maintenance: None,
            specs: serde_json::Value::Null,
        }
    }
}
