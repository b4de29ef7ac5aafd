//! Tests for the in-memory ledger and facility fixtures

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic on unexpected variants

use gearbook_core::{
    EquipmentStatus, EquipmentType, Guard, LedgerError, LedgerStore, LedgerWrite, Reservation,
    SessionId, UnitOfWork, UserId,
};
use gearbook_testing::helpers::{FacilityFixture, at, window};
use std::sync::Arc;

fn booking(unit: &gearbook_core::EquipmentUnit, session: SessionId) -> UnitOfWork {
    let w = window((10, 0), (11, 0));
    let reservation = Reservation::new(unit.id, session, w, UserId::new(), at(8, 0));
    UnitOfWork::new()
        .guard(Guard::UnitFree {
            unit_id: unit.id,
            window: w,
        })
        .write(LedgerWrite::SetUnitStatus {
            unit_id: unit.id,
            status: EquipmentStatus::Reserved,
        })
        .write(LedgerWrite::InsertReservation(reservation))
}

#[tokio::test]
async fn fixture_names_units_in_order() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Rower, 3).await;

    let names: Vec<String> = fixture
        .ledger
        .units(fixture.facility_id, Some(EquipmentType::Rower))
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.name)
        .collect();

    assert_eq!(names, vec!["rower 01", "rower 02", "rower 03"]);
}

#[tokio::test]
async fn configs_are_scoped_to_their_facility() {
    let fixture = FacilityFixture::new();
    fixture.add_units(EquipmentType::Treadmill, 1).await;
    fixture.add_units(EquipmentType::Rower, 1).await;

    let other = FacilityFixture::new();
    let configs = fixture
        .ledger
        .facility_configs(other.facility_id)
        .await
        .unwrap();
    assert!(configs.is_empty());

    let configs = fixture
        .ledger
        .facility_configs(fixture.facility_id)
        .await
        .unwrap();
    assert_eq!(configs.len(), 2);
}

#[tokio::test]
async fn session_lookup_returns_every_reservation() {
    let fixture = FacilityFixture::new();
    let units = fixture.add_units(EquipmentType::AirBike, 2).await;
    let session = SessionId::new();

    for unit in &units {
        fixture.ledger.commit(booking(unit, session)).await.unwrap();
    }

    let found = fixture
        .ledger
        .reservations_for_session(session)
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].unit_id, units[0].id);
    assert_eq!(found[1].unit_id, units[1].id);
}

#[tokio::test]
async fn concurrent_commits_on_one_unit_admit_exactly_one() {
    let fixture = FacilityFixture::new();
    let unit = fixture
        .add_units(EquipmentType::SquatRack, 1)
        .await
        .remove(0);
    let ledger = Arc::new(fixture.ledger.clone());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = Arc::clone(&ledger);
        let work = booking(&unit, SessionId::new());
        handles.push(tokio::spawn(async move { ledger.commit(work).await }));
    }

    let mut committed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => committed += 1,
            Err(LedgerError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(fixture.ledger.snapshot().reservations().len(), 1);
}
