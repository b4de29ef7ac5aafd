//! Shared setup for scheduler integration tests.

#![allow(dead_code)] // Not every test binary uses every helper

use gearbook::Scheduler;
use gearbook_core::environment::Clock;
use gearbook_testing::helpers::{FacilityFixture, on};
use gearbook_testing::FixedClock;
use std::sync::Arc;

/// Sunday 2025-03-09 12:00 UTC, the day before every test window.
pub fn now() -> chrono::DateTime<chrono::Utc> {
    on(9, 12, 0)
}

/// Scheduler over the fixture's ledger with a clock frozen at [`now`].
pub fn scheduler(fixture: &FacilityFixture) -> Scheduler {
    scheduler_with_clock(fixture, FixedClock::new(now()))
}

/// Scheduler over the fixture's ledger with the given clock.
pub fn scheduler_with_clock(fixture: &FacilityFixture, clock: impl Clock + 'static) -> Scheduler {
    gearbook_testing::init_tracing();
    Scheduler::new(Arc::new(fixture.ledger.clone()), Arc::new(clock))
}
