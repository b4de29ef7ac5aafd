//! # Gearbook
//!
//! Equipment scheduling for training facilities: which machines are free
//! when, all-or-nothing bookings of several machines for one session, handing
//! scarce machines to players, and finding another time when a session does not
//! fit.
//!
//! # Components
//!
//! - [`Catalog`]: units and per-facility configs, capacity checked
//! - [`AvailabilityEngine`]: free units of one type for a window
//! - [`ReservationCoordinator`]: bulk feasibility checks, atomic bookings and
//!   the reservation lifecycle (check-in, check-out, cancel, no-show)
//! - [`AssignmentOptimizer`]: greedy unit-to-player assignment under shortage
//! - [`AlternativeSearch`]: bounded first-fit scan for other windows
//! - [`StatusAggregator`]: live utilization per facility
//!
//! Every component reads and writes through a shared
//! [`LedgerStore`](gearbook_core::LedgerStore). All changes are committed as
//! guarded units of work, so concurrent bookings of one unit cannot both
//! succeed.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use gearbook::{NewUnit, Requirement, ReserveRequest, Scheduler};
//! use gearbook_core::{EquipmentType, FacilityId, SessionId, TimeWindow, UserId};
//! use gearbook_testing::{FixedClock, InMemoryLedger};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap());
//! let scheduler = Scheduler::new(Arc::new(InMemoryLedger::new()), Arc::new(clock));
//!
//! let facility = FacilityId::new();
//! let config = scheduler.catalog.config_template(facility, EquipmentType::Rower, 2);
//! scheduler.catalog.upsert_config(config).await?;
//! for name in ["Rower 1", "Rower 2"] {
//!     scheduler
//!         .catalog
//!         .register_unit(NewUnit::new(EquipmentType::Rower, name, facility, "Erg room"))
//!         .await?;
//! }
//!
//! let window = TimeWindow::new(
//!     Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
//! )?;
//! let bulk = scheduler
//!     .coordinator
//!     .check_bulk(&[Requirement::new(EquipmentType::Rower, 2)], facility, window)
//!     .await?;
//! assert!(bulk.can_accommodate);
//!
//! let units = bulk.per_type[0].available_ids();
//! let booked = scheduler
//!     .coordinator
//!     .reserve(ReserveRequest::new(units, SessionId::new(), window, UserId::new()))
//!     .await?;
//! assert_eq!(booked.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod alternatives;
pub mod app;
pub mod availability;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod status;

pub use alternatives::{AlternativeSearch, AlternativeSlot, SearchOptions};
pub use app::Scheduler;
pub use availability::{AvailabilityEngine, AvailabilityReport, Requirement, Shortfall};
pub use catalog::{Catalog, ConfigDefaults, NewUnit};
pub use config::Config;
pub use coordinator::{BulkAvailability, ReservationCoordinator, ReserveRequest};
pub use error::SchedulingError;
pub use optimizer::{Assignment, AssignmentOptimizer, AssignmentPlan};
pub use status::{FacilityStatus, StatusAggregator, TypeStatus};
