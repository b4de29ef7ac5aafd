//! Availability engine tests against the in-memory ledger.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic on unexpected variants

mod common;

use gearbook::{ReserveRequest, SchedulingError};
use gearbook_core::{ConstraintViolation, EquipmentType, FacilityId, SessionId, UserId};
use gearbook_testing::helpers::{FacilityFixture, window};

#[tokio::test]
async fn adjacent_windows_do_not_conflict() {
    let fixture = FacilityFixture::new();
    let rowers = fixture.add_units(EquipmentType::Rower, 2).await;
    let scheduler = common::scheduler(&fixture);

    let booked = scheduler
        .coordinator
        .reserve(ReserveRequest::new(
            vec![rowers[0].id],
            SessionId::new(),
            window((10, 0), (11, 0)),
            UserId::new(),
        ))
        .await
        .unwrap();

    let after = scheduler
        .availability
        .check(EquipmentType::Rower, fixture.facility_id, window((11, 0), (12, 0)), 1)
        .await
        .unwrap();
    assert!(after.conflicts.is_empty());
    assert_eq!(after.available_ids(), vec![rowers[1].id]);

    let overlapping = scheduler
        .availability
        .check(EquipmentType::Rower, fixture.facility_id, window((10, 59), (11, 30)), 1)
        .await
        .unwrap();
    let conflicts: Vec<_> = overlapping.conflicts.iter().map(|r| r.id).collect();
    assert_eq!(conflicts, vec![booked[0].id]);
    assert_eq!(overlapping.available_ids(), vec![rowers[1].id]);
}

#[tokio::test]
async fn one_minute_overlap_is_a_conflict() {
    let fixture = FacilityFixture::new();
    let rowers = fixture.add_units(EquipmentType::Rower, 1).await;
    let scheduler = common::scheduler(&fixture);

    let booked = scheduler
        .coordinator
        .reserve(ReserveRequest::new(
            vec![rowers[0].id],
            SessionId::new(),
            window((10, 0), (11, 0)),
            UserId::new(),
        ))
        .await
        .unwrap();

    let report = scheduler
        .availability
        .check(EquipmentType::Rower, fixture.facility_id, window((10, 59), (11, 30)), 1)
        .await
        .unwrap();

    assert_eq!(report.available_count(), 0);
    assert_eq!(report.shortfall(), 1);
    assert!(!report.can_accommodate());
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].id, booked[0].id);
}

#[tokio::test]
async fn units_are_listed_by_name() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Treadmill, 3).await;
    let scheduler = common::scheduler(&fixture);

    let report = scheduler
        .availability
        .check(EquipmentType::Treadmill, fixture.facility_id, window((9, 0), (10, 0)), 2)
        .await
        .unwrap();

    let names: Vec<&str> = report.available_units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["treadmill 01", "treadmill 02", "treadmill 03"]);
    assert_eq!(report.total_count, 3);
    assert_eq!(report.required_count, 2);
}

#[tokio::test]
async fn units_out_of_service_are_never_available() {
    let fixture = FacilityFixture::new();
    let bikes = fixture.add_units(EquipmentType::AirBike, 3).await;
    let scheduler = common::scheduler(&fixture);

    scheduler.coordinator.begin_maintenance(bikes[0].id).await.unwrap();
    scheduler.coordinator.report_fault(bikes[1].id).await.unwrap();

    let report = scheduler
        .availability
        .check(EquipmentType::AirBike, fixture.facility_id, window((9, 0), (10, 0)), 1)
        .await
        .unwrap();

    assert_eq!(report.available_ids(), vec![bikes[2].id]);
    assert!(report.conflicts.is_empty());

    scheduler.coordinator.return_to_service(bikes[0].id).await.unwrap();
    let report = scheduler
        .availability
        .check(EquipmentType::AirBike, fixture.facility_id, window((9, 0), (10, 0)), 1)
        .await
        .unwrap();
    assert_eq!(report.available_count(), 2);
}

#[tokio::test]
async fn reserved_unit_is_unavailable_at_any_time() {
    let fixture = FacilityFixture::new();
    let racks = fixture.add_units(EquipmentType::SquatRack, 1).await;
    let scheduler = common::scheduler(&fixture);

    let booked = scheduler
        .coordinator
        .reserve(ReserveRequest::new(
            vec![racks[0].id],
            SessionId::new(),
            window((16, 0), (17, 0)),
            UserId::new(),
        ))
        .await
        .unwrap();

    let report = scheduler
        .availability
        .check(EquipmentType::SquatRack, fixture.facility_id, window((8, 0), (9, 0)), 1)
        .await
        .unwrap();
    assert!(report.conflicts.is_empty());
    assert_eq!(report.available_count(), 0);
    assert!(!report.can_accommodate());

    scheduler.coordinator.cancel(booked[0].id, None).await.unwrap();
    let report = scheduler
        .availability
        .check(EquipmentType::SquatRack, fixture.facility_id, window((8, 0), (9, 0)), 1)
        .await
        .unwrap();
    assert!(report.can_accommodate());
}

#[tokio::test]
async fn missing_config_is_reported() {
    let fixture = FacilityFixture::new();
    let scheduler = common::scheduler(&fixture);

    let error = scheduler
        .availability
        .check(EquipmentType::LegPress, fixture.facility_id, window((9, 0), (10, 0)), 1)
        .await
        .unwrap_err();

    assert_eq!(
        error,
        SchedulingError::ConfigurationMissing {
            facility_id: fixture.facility_id,
            equipment_type: EquipmentType::LegPress,
        }
    );
}

#[tokio::test]
async fn configs_of_other_facilities_are_ignored() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Rower, 2).await;
    let scheduler = common::scheduler(&fixture);

    let error = scheduler
        .availability
        .check(EquipmentType::Rower, FacilityId::new(), window((9, 0), (10, 0)), 1)
        .await
        .unwrap_err();
    assert!(matches!(error, SchedulingError::ConfigurationMissing { .. }));
}

#[tokio::test]
async fn rule_violations_block_accommodation() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Rower, 2).await;
    let scheduler = common::scheduler(&fixture);

    // Closes at 22:00 and sessions are capped at three hours.
    let report = scheduler
        .availability
        .check(EquipmentType::Rower, fixture.facility_id, window((18, 0), (22, 30)), 1)
        .await
        .unwrap();

    assert_eq!(report.available_count(), 2);
    assert!(!report.can_accommodate());
    assert!(report.violations.contains(&ConstraintViolation::OutsideOperatingHours));
    assert!(report.violations.contains(&ConstraintViolation::ExceedsMaxDuration {
        max_minutes: 180,
        requested_minutes: 270,
    }));
}

#[tokio::test]
async fn notice_and_horizon_follow_the_clock() {
    let fixture = FacilityFixture::new();
    let mut config = fixture.config(EquipmentType::Rower, 1);
    config.min_notice_minutes = 24 * 60;
    fixture.put_config(config).await;
    fixture.register(EquipmentType::Rower, 1).await;
    let scheduler = common::scheduler(&fixture);

    // The clock reads 2025-03-09 12:00, so 2025-03-10 09:00 is 21 hours out.
    let report = scheduler
        .availability
        .check(EquipmentType::Rower, fixture.facility_id, window((9, 0), (10, 0)), 1)
        .await
        .unwrap();
    assert_eq!(
        report.violations,
        vec![ConstraintViolation::InsufficientNotice {
            min_notice_minutes: 24 * 60
        }]
    );

    let report = scheduler
        .availability
        .check(EquipmentType::Rower, fixture.facility_id, window((13, 0), (14, 0)), 1)
        .await
        .unwrap();
    assert!(report.violations.is_empty());
}
