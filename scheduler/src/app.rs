//! Application wiring.
//!
//! [`Scheduler`] builds every component over one shared ledger and clock.

use crate::alternatives::AlternativeSearch;
use crate::availability::AvailabilityEngine;
use crate::catalog::{Catalog, ConfigDefaults};
use crate::config::{Config, SchedulingConfig};
use crate::coordinator::ReservationCoordinator;
use crate::error::SchedulingError;
use crate::optimizer::AssignmentOptimizer;
use crate::status::StatusAggregator;
use gearbook_core::LedgerStore;
use gearbook_core::environment::{Clock, SystemClock};
use gearbook_postgres::PostgresLedger;
use gearbook_testing::InMemoryLedger;
use std::sync::Arc;

/// The scheduling engine.
///
/// Cheap to clone; clones share the ledger.
///
/// # Example
///
/// ```
/// use gearbook::Scheduler;
/// use gearbook_testing::InMemoryLedger;
/// use gearbook_core::environment::SystemClock;
/// use std::sync::Arc;
///
/// let scheduler = Scheduler::new(Arc::new(InMemoryLedger::new()), Arc::new(SystemClock));
/// # let _ = scheduler;
/// ```
#[derive(Clone, Debug)]
pub struct Scheduler {
    /// Units and facility configs
    pub catalog: Catalog,
    /// Single-type availability
    pub availability: AvailabilityEngine,
    /// Bulk checks, bookings and the reservation lifecycle
    pub coordinator: ReservationCoordinator,
    /// Unit-to-player assignment
    pub optimizer: AssignmentOptimizer,
    /// Alternative slot search
    pub alternatives: AlternativeSearch,
    /// Facility utilization snapshots
    pub status: StatusAggregator,
}

impl Scheduler {
    /// Wires every component to `ledger` and `clock` with default settings.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(ledger, clock, &SchedulingConfig::default())
    }

    /// Wires every component, applying `settings`.
    #[must_use]
    pub fn with_settings(
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        settings: &SchedulingConfig,
    ) -> Self {
        let availability = AvailabilityEngine::new(Arc::clone(&ledger), Arc::clone(&clock));
        let coordinator = ReservationCoordinator::new(Arc::clone(&ledger), Arc::clone(&clock));

        Self {
            catalog: Catalog::new(Arc::clone(&ledger)).with_defaults(ConfigDefaults {
                check_in_buffer_minutes: settings.default_check_in_buffer_minutes,
                max_session_minutes: settings.default_max_session_minutes,
            }),
            optimizer: AssignmentOptimizer::new(availability.clone()),
            alternatives: AlternativeSearch::new(Arc::clone(&ledger), coordinator.clone())
                .with_defaults(settings.search_options()),
            status: StatusAggregator::new(ledger, clock),
            availability,
            coordinator,
        }
    }

    /// Builds the scheduler described by `config`.
    ///
    /// Connects to Postgres (running migrations if configured) when a database
    /// URL is set, otherwise keeps everything in memory.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::Ledger`] if the database connection or a
    /// migration fails.
    pub async fn from_config(config: &Config) -> Result<Self, SchedulingError> {
        let ledger: Arc<dyn LedgerStore> = match &config.postgres.url {
            Some(url) => {
                let ledger = PostgresLedger::connect(url, config.postgres.pool_settings()).await?;
                if config.postgres.run_migrations {
                    ledger.migrate().await?;
                }
                tracing::info!("Using PostgreSQL ledger");
                Arc::new(ledger)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory ledger");
                Arc::new(InMemoryLedger::new())
            }
        };

        Ok(Self::with_settings(ledger, Arc::new(SystemClock), &config.scheduling))
    }
}
