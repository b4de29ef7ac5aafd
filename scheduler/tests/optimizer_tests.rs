//! Assignment optimizer tests.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic on unexpected variants

mod common;

use gearbook::{Requirement, ReserveRequest, SchedulingError, Shortfall};
use gearbook_core::{
    ConstraintViolation, EquipmentType, PlayerId, ReservationStatus, SessionId, UserId,
};
use gearbook_testing::helpers::{FacilityFixture, window};
use std::collections::HashSet;

fn players(n: usize) -> Vec<PlayerId> {
    (0..n).map(|_| PlayerId::new()).collect()
}

#[tokio::test]
async fn players_are_served_in_list_order() {
    let fixture = FacilityFixture::new();
    let rowers = fixture.add_units(EquipmentType::Rower, 2).await;
    let racks = fixture.add_units(EquipmentType::SquatRack, 1).await;
    let scheduler = common::scheduler(&fixture);
    let squad = players(3);

    let plan = scheduler
        .optimizer
        .assign(
            &[
                Requirement::new(EquipmentType::Rower, 2),
                Requirement::new(EquipmentType::SquatRack, 1),
            ],
            fixture.facility_id,
            window((9, 0), (10, 0)),
            &squad,
        )
        .await
        .unwrap();

    assert!(plan.is_optimal);
    assert!(plan.shortfalls.is_empty());
    assert!(plan.unassigned_players.is_empty());

    let picked: Vec<_> = plan.assignments.iter().map(|a| (a.unit_id, a.player_id)).collect();
    assert_eq!(
        picked,
        vec![
            (rowers[0].id, Some(squad[0])),
            (rowers[1].id, Some(squad[1])),
            (racks[0].id, Some(squad[2])),
        ]
    );
    assert_eq!(plan.assignments[0].unit_name, "rower 01");
    assert_eq!(plan.assignments[2].equipment_type, EquipmentType::SquatRack);
}

#[tokio::test]
async fn shortage_leaves_later_players_unassigned() {
    let fixture = FacilityFixture::new();
    let rowers = fixture.add_units(EquipmentType::Rower, 3).await;
    let scheduler = common::scheduler(&fixture);

    scheduler
        .coordinator
        .reserve(ReserveRequest::new(
            vec![rowers[0].id],
            SessionId::new(),
            window((9, 0), (10, 0)),
            UserId::new(),
        ))
        .await
        .unwrap();

    let squad = players(4);
    let plan = scheduler
        .optimizer
        .assign(
            &[Requirement::new(EquipmentType::Rower, 3)],
            fixture.facility_id,
            window((9, 30), (10, 30)),
            &squad,
        )
        .await
        .unwrap();

    assert!(!plan.is_optimal);
    assert_eq!(
        plan.shortfalls,
        vec![Shortfall {
            equipment_type: EquipmentType::Rower,
            requested: 3,
            available: 2,
        }]
    );
    let units: Vec<_> = plan.assignments.iter().map(|a| a.unit_id).collect();
    assert_eq!(units, vec![rowers[1].id, rowers[2].id]);
    assert_eq!(plan.unassigned_players, vec![squad[2], squad[3]]);
}

#[tokio::test]
async fn units_outnumbering_players_stay_unowned() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::SkiErg, 3).await;
    let scheduler = common::scheduler(&fixture);
    let squad = players(1);

    let plan = scheduler
        .optimizer
        .assign(
            &[Requirement::new(EquipmentType::SkiErg, 3)],
            fixture.facility_id,
            window((9, 0), (10, 0)),
            &squad,
        )
        .await
        .unwrap();

    assert!(plan.is_optimal);
    let owners: Vec<_> = plan.assignments.iter().map(|a| a.player_id).collect();
    assert_eq!(owners, vec![Some(squad[0]), None, None]);
}

#[tokio::test]
async fn repeated_type_never_picks_a_unit_twice() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Rower, 3).await;
    let scheduler = common::scheduler(&fixture);

    let plan = scheduler
        .optimizer
        .assign(
            &[
                Requirement::new(EquipmentType::Rower, 2),
                Requirement::new(EquipmentType::Rower, 2),
            ],
            fixture.facility_id,
            window((9, 0), (10, 0)),
            &players(4),
        )
        .await
        .unwrap();

    let distinct: HashSet<_> = plan.assignments.iter().map(|a| a.unit_id).collect();
    assert_eq!(plan.assignments.len(), 3);
    assert_eq!(distinct.len(), 3);
    assert!(!plan.is_optimal);
    assert_eq!(plan.shortfalls[0].available, 1);
}

#[tokio::test]
async fn window_breaking_rules_is_planned_but_not_optimal() {
    let fixture = FacilityFixture::new();
    let rowers = fixture.add_units(EquipmentType::Rower, 2).await;
    fixture.add_units(EquipmentType::SquatRack, 1).await;
    let scheduler = common::scheduler(&fixture);
    let squad = players(2);

    // Both types open at 06:00.
    let plan = scheduler
        .optimizer
        .assign(
            &[
                Requirement::new(EquipmentType::Rower, 1),
                Requirement::new(EquipmentType::SquatRack, 1),
            ],
            fixture.facility_id,
            window((5, 0), (6, 0)),
            &squad,
        )
        .await
        .unwrap();

    assert!(!plan.is_optimal);
    assert!(plan.shortfalls.is_empty());
    assert_eq!(plan.violations, vec![ConstraintViolation::OutsideOperatingHours]);
    assert_eq!(plan.assignments.len(), 2);
    assert_eq!(plan.assignments[0].unit_id, rowers[0].id);
    assert_eq!(plan.assignments[0].player_id, Some(squad[0]));

    let error = scheduler
        .coordinator
        .reserve(plan.into_reserve_request(SessionId::new(), UserId::new()))
        .await
        .unwrap_err();
    assert_eq!(
        error,
        SchedulingError::RuleViolation(vec![ConstraintViolation::OutsideOperatingHours])
    );
}

#[tokio::test]
async fn plan_books_as_planned() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Rower, 2).await;
    let scheduler = common::scheduler(&fixture);
    let squad = players(2);

    let plan = scheduler
        .optimizer
        .assign(
            &[Requirement::new(EquipmentType::Rower, 2)],
            fixture.facility_id,
            window((9, 0), (10, 0)),
            &squad,
        )
        .await
        .unwrap();
    let expected: Vec<_> = plan.assignments.iter().map(|a| (a.unit_id, a.player_id)).collect();

    let booked = scheduler
        .coordinator
        .reserve(plan.into_reserve_request(SessionId::new(), UserId::new()))
        .await
        .unwrap();

    let actual: Vec<_> = booked.iter().map(|r| (r.unit_id, r.player_id)).collect();
    assert_eq!(actual, expected);
    assert!(booked.iter().all(|r| r.status == ReservationStatus::Active));
}
