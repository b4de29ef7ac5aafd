//! Errors returned by scheduling operations.

use gearbook_core::{
    ConstraintViolation, EquipmentType, FacilityId, InvalidTransition, InvalidWindow, LedgerError,
    LifecycleError, UnitId,
};
use thiserror::Error;

/// Everything a scheduling operation can fail with.
///
/// Every failure is returned to the caller; nothing is retried internally.
/// A `Conflict` from [`reserve`](crate::ReservationCoordinator::reserve) means
/// nothing was written, and the caller should re-run availability before trying
/// again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    /// A unit, reservation or other record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record ("unit", "reservation")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The record is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Units were taken (or changed) between the read and the commit.
    #[error("conflict on units: {}", format_units(.units))]
    Conflict {
        /// Every offending unit, sorted
        units: Vec<UnitId>,
    },

    /// The facility cannot supply the requested count at any time.
    #[error("{equipment_type} at facility {facility_id} is limited to {total_count} units")]
    CapacityExceeded {
        /// Facility
        facility_id: FacilityId,
        /// Equipment type
        equipment_type: EquipmentType,
        /// Configured unit count
        total_count: u32,
    },

    /// No facility config exists for the type.
    #[error("no configuration for {equipment_type} at facility {facility_id}")]
    ConfigurationMissing {
        /// Facility
        facility_id: FacilityId,
        /// Equipment type
        equipment_type: EquipmentType,
    },

    /// The window breaks the facility's booking rules.
    #[error("booking rules violated: {}", format_violations(.0))]
    RuleViolation(Vec<ConstraintViolation>),

    /// Window bounds are inverted or empty.
    #[error(transparent)]
    InvalidWindow(#[from] InvalidWindow),

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The ledger store failed.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl SchedulingError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the failure came from a concurrent change the caller may
    /// re-check and try again.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<LedgerError> for SchedulingError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Conflict { units } => Self::Conflict { units },
            LedgerError::StaleReservation { reservation_id } => Self::InvalidState(format!(
                "reservation {reservation_id} changed before the update was committed"
            )),
            LedgerError::CapacityExceeded {
                facility_id,
                equipment_type,
                total_count,
            } => Self::CapacityExceeded {
                facility_id,
                equipment_type,
                total_count,
            },
            other => Self::Ledger(other),
        }
    }
}

impl From<LifecycleError> for SchedulingError {
    fn from(error: LifecycleError) -> Self {
        Self::InvalidState(error.to_string())
    }
}

impl From<InvalidTransition> for SchedulingError {
    fn from(error: InvalidTransition) -> Self {
        Self::InvalidState(error.to_string())
    }
}

fn format_units(units: &[UnitId]) -> String {
    units
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_violations(violations: &[ConstraintViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
