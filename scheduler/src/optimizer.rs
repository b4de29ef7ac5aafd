//! Assignment Optimizer.
//!
//! Greedy, first-come assignment of free units to players. Requirements are
//! served in the order given, units in availability order (name, then id), and
//! players in list order.

use crate::availability::{AvailabilityEngine, Requirement, Shortfall};
use crate::coordinator::ReserveRequest;
use crate::error::SchedulingError;
use gearbook_core::{
    ConstraintViolation, EquipmentType, FacilityId, PlayerId, SessionId, TimeWindow, UnitId, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// One unit picked for a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Picked unit
    pub unit_id: UnitId,
    /// Its type
    pub equipment_type: EquipmentType,
    /// Its display name
    pub unit_name: String,
    /// Player it goes to; `None` once the player list ran out
    pub player_id: Option<PlayerId>,
}

/// Outcome of [`AssignmentOptimizer::assign`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPlan {
    /// Every requirement was met in full and the window breaks no rule
    pub is_optimal: bool,
    /// Window the plan is for
    pub window: TimeWindow,
    /// Picked units, requirement by requirement
    pub assignments: Vec<Assignment>,
    /// Players left without a unit, in their original order
    pub unassigned_players: Vec<PlayerId>,
    /// Requirements that could not be met in full
    pub shortfalls: Vec<Shortfall>,
    /// Booking rules the window breaks, once each
    pub violations: Vec<ConstraintViolation>,
}

impl AssignmentPlan {
    /// A reserve request booking every picked unit with its player.
    #[must_use]
    pub fn into_reserve_request(self, session_id: SessionId, reserved_by: UserId) -> ReserveRequest {
        let unit_ids = self.assignments.iter().map(|a| a.unit_id).collect();
        let mut request = ReserveRequest::new(unit_ids, session_id, self.window, reserved_by);
        for assignment in self.assignments {
            if let Some(player_id) = assignment.player_id {
                request = request.assign(assignment.unit_id, player_id);
            }
        }
        request
    }
}

/// Assigns free units to players.
#[derive(Clone, Debug)]
pub struct AssignmentOptimizer {
    availability: AvailabilityEngine,
}

impl AssignmentOptimizer {
    /// Creates an optimizer reading availability from `availability`.
    #[must_use]
    pub const fn new(availability: AvailabilityEngine) -> Self {
        Self { availability }
    }

    /// Picks up to `count` free units per requirement and hands them to players
    /// front to back.
    ///
    /// A unit is never picked twice, even when two requirements name the same
    /// type. Nothing is reserved; turn the plan into a
    /// [`ReserveRequest`] to book it. Broken booking rules do not stop the
    /// plan: they are listed in [`AssignmentPlan::violations`] and the plan is
    /// not optimal. Booking such a plan fails with
    /// [`SchedulingError::RuleViolation`].
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::ConfigurationMissing`] for an unconfigured type
    /// - [`SchedulingError::Ledger`] when the store fails
    #[tracing::instrument(skip(self, players), fields(players = players.len()))]
    pub async fn assign(
        &self,
        requirements: &[Requirement],
        facility_id: FacilityId,
        window: TimeWindow,
        players: &[PlayerId],
    ) -> Result<AssignmentPlan, SchedulingError> {
        let mut queue: VecDeque<PlayerId> = players.iter().copied().collect();
        let mut taken: HashSet<UnitId> = HashSet::new();
        let mut assignments = Vec::new();
        let mut shortfalls = Vec::new();
        let mut violations: Vec<ConstraintViolation> = Vec::new();

        for requirement in requirements {
            let report = self
                .availability
                .check(requirement.equipment_type, facility_id, window, requirement.count)
                .await?;
            for violation in report.violations {
                if !violations.contains(&violation) {
                    violations.push(violation);
                }
            }

            let free: Vec<_> = report
                .available_units
                .into_iter()
                .filter(|unit| !taken.contains(&unit.id))
                .collect();
            let picked = free
                .len()
                .min(usize::try_from(requirement.count).unwrap_or(usize::MAX));

            for unit in free.into_iter().take(picked) {
                taken.insert(unit.id);
                assignments.push(Assignment {
                    unit_id: unit.id,
                    equipment_type: unit.equipment_type,
                    unit_name: unit.name,
                    player_id: queue.pop_front(),
                });
            }

            let available = u32::try_from(picked).unwrap_or(u32::MAX);
            if available < requirement.count {
                shortfalls.push(Shortfall {
                    equipment_type: requirement.equipment_type,
                    requested: requirement.count,
                    available,
                });
            }
        }

        if !shortfalls.is_empty() {
            tracing::warn!(?shortfalls, "Not every requirement could be met");
        }
        if !violations.is_empty() {
            tracing::warn!(?violations, "Planned window breaks booking rules");
        }
        let is_optimal = shortfalls.is_empty() && violations.is_empty();

        Ok(AssignmentPlan {
            is_optimal,
            window,
            assignments,
            unassigned_players: queue.into_iter().collect(),
            shortfalls,
            violations,
        })
    }
}
