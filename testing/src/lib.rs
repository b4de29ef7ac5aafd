//! # Gearbook Testing
//!
//! Testing utilities for the Gearbook scheduler.
//!
//! This crate provides:
//! - Mock implementations of Environment traits ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryLedger`], a [`LedgerStore`](gearbook_core::LedgerStore) for tests and demos
//! - Fixture builders that seed a facility with configs and units
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use gearbook_core::EquipmentType;
//! use gearbook_testing::helpers::FacilityFixture;
//!
//! # async fn example() {
//! let fixture = FacilityFixture::new();
//! let rowers = fixture.add_units(EquipmentType::Rower, 2).await;
//! assert_eq!(rowers.len(), 2);
//! # }
//! ```

use chrono::{DateTime, Utc};
use gearbook_core::environment::Clock;

mod in_memory;

pub use in_memory::{InMemoryLedger, LedgerTables};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Arc, PoisonError, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use gearbook_testing::mocks::FixedClock;
    /// use gearbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock a test can move by hand.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the scheduler.
    ///
    /// ```
    /// use gearbook_testing::mocks::ManualClock;
    /// use gearbook_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::minutes(30));
    /// assert_eq!(clock.now() - start, Duration::minutes(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers: fixed timestamps and facility fixtures.
///
/// Every helper works on Monday 2025-03-10 (UTC) unless a date is given.
#[allow(clippy::expect_used)] // Fixtures fail loudly on bad test input
#[allow(clippy::missing_panics_doc)]
pub mod helpers {
    use super::InMemoryLedger;
    use chrono::{DateTime, TimeZone, Utc};
    use gearbook_core::{
        EquipmentType, EquipmentUnit, FacilityEquipmentConfig, FacilityId, LedgerStore,
        LedgerWrite, TimeWindow, UnitOfWork,
    };

    /// `hour:minute` on Monday 2025-03-10 UTC.
    #[must_use]
    pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        on(10, hour, minute)
    }

    /// `hour:minute` on 2025-03-`day` UTC.
    #[must_use]
    pub fn on(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0)
            .single()
            .expect("valid test timestamp")
    }

    /// Window `[from, until)` given as `(hour, minute)` pairs on 2025-03-10.
    #[must_use]
    pub fn window(from: (u32, u32), until: (u32, u32)) -> TimeWindow {
        TimeWindow::new(at(from.0, from.1), at(until.0, until.1)).expect("valid test window")
    }

    /// A facility seeded straight into an [`InMemoryLedger`].
    ///
    /// Writes bypass the scheduler so tests can set up any starting state.
    #[derive(Clone, Debug, Default)]
    pub struct FacilityFixture {
        /// Facility every unit and config is created in
        pub facility_id: FacilityId,
        /// Backing ledger
        pub ledger: InMemoryLedger,
    }

    impl FacilityFixture {
        /// Empty facility with a fresh ledger.
        #[must_use]
        pub fn new() -> Self {
            Self {
                facility_id: FacilityId::new(),
                ledger: InMemoryLedger::new(),
            }
        }

        /// Default config for `equipment_type` at this facility.
        #[must_use]
        pub fn config(&self, equipment_type: EquipmentType, total_count: u32) -> FacilityEquipmentConfig {
            FacilityEquipmentConfig::new(self.facility_id, equipment_type, total_count)
        }

        /// Stores `config` as-is.
        pub async fn put_config(&self, config: FacilityEquipmentConfig) {
            self.ledger
                .commit(UnitOfWork::new().write(LedgerWrite::UpsertConfig(config)))
                .await
                .expect("seed config");
        }

        /// Configures `count` units of a type and registers them.
        ///
        /// Units are named `"<type> 01"`, `"<type> 02"`, … so they sort by number.
        pub async fn add_units(&self, equipment_type: EquipmentType, count: u32) -> Vec<EquipmentUnit> {
            self.put_config(self.config(equipment_type, count)).await;
            self.register(equipment_type, count).await
        }

        /// Registers `count` more units of a type without touching its config.
        pub async fn register(&self, equipment_type: EquipmentType, count: u32) -> Vec<EquipmentUnit> {
            let existing = self
                .ledger
                .units(self.facility_id, Some(equipment_type))
                .await
                .expect("list units")
                .len();

            let mut work = UnitOfWork::new();
            let mut units = Vec::new();
            for n in 1..=count as usize {
                let unit = EquipmentUnit::new(
                    equipment_type,
                    format!("{equipment_type} {:02}", existing + n),
                    self.facility_id,
                    "Main floor",
                );
                work.push_write(LedgerWrite::InsertUnit(unit.clone()));
                units.push(unit);
            }
            self.ledger.commit(work).await.expect("seed units");
            units
        }
    }
}

/// Property-based testing strategies for domain types.
pub mod properties {
    use super::helpers::at;
    use chrono::Duration;
    use gearbook_core::TimeWindow;
    use proptest::prelude::*;

    /// Windows on 2025-03-10 between 06:00 and 22:00, on a 15-minute grid,
    /// 15 minutes to 3 hours long.
    pub fn window_in_day() -> impl Strategy<Value = TimeWindow> {
        (0i64..60, 1i64..=12).prop_filter_map("window must close by 22:00", |(slot, len)| {
            let from = at(6, 0) + Duration::minutes(slot * 15);
            let until = from + Duration::minutes(len * 15);
            if until > at(22, 0) {
                return None;
            }
            TimeWindow::new(from, until).ok()
        })
    }
}

/// Install a `tracing` subscriber for tests, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,gearbook=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(helpers::at(9, 0));
        let handle = clock.clone();
        handle.advance(Duration::minutes(45));
        assert_eq!(clock.now(), helpers::at(9, 45));
        clock.set(helpers::at(12, 0));
        assert_eq!(handle.now(), helpers::at(12, 0));
    }
}
