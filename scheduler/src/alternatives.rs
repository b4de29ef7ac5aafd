//! Alternative Slot Search.
//!
//! First-fit scan of one day for windows that can take a whole booking when
//! the requested window cannot. Each candidate keeps the original duration and
//! is judged by [`ReservationCoordinator::check_bulk`].

use crate::availability::Requirement;
use crate::coordinator::{BulkAvailability, ReservationCoordinator};
use crate::error::SchedulingError;
use crate::metrics;
use chrono::{Duration, NaiveTime};
use gearbook_core::{FacilityId, LedgerStore, TimeWindow};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bounds of one search.
///
/// `day_start` and `day_end` are facility local times on the original
/// window's date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Earliest candidate start
    pub day_start: NaiveTime,
    /// Every candidate ends by this time
    pub day_end: NaiveTime,
    /// Minutes between candidate starts
    pub step_minutes: u32,
    /// Stop after this many feasible slots
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            day_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            step_minutes: 30,
            max_results: 5,
        }
    }
}

/// A feasible window found by the search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlternativeSlot {
    /// Candidate window
    pub window: TimeWindow,
    /// The feasibility check that accepted it
    pub availability: BulkAvailability,
}

/// Finds alternative windows for a booking.
#[derive(Clone)]
pub struct AlternativeSearch {
    ledger: Arc<dyn LedgerStore>,
    coordinator: ReservationCoordinator,
    defaults: SearchOptions,
}

impl AlternativeSearch {
    /// Creates a search using `coordinator` as its feasibility check.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, coordinator: ReservationCoordinator) -> Self {
        Self {
            ledger,
            coordinator,
            defaults: SearchOptions::default(),
        }
    }

    /// Replaces the options returned by [`AlternativeSearch::default_options`].
    #[must_use]
    pub const fn with_defaults(mut self, defaults: SearchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Options configured for this deployment.
    #[must_use]
    pub const fn default_options(&self) -> SearchOptions {
        self.defaults
    }

    /// Up to `max_results` feasible windows on the original window's day, in
    /// chronological order.
    ///
    /// Candidates start every `step_minutes` from `day_start` through
    /// `day_end` minus the duration. The original start is skipped. The day
    /// and times are read in the facility's local time, taken from the first
    /// requirement's config.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::InvalidRequest`] for a zero step, `day_start` not
    ///   before `day_end`, no requirements, or a day whose bounds are out of
    ///   range
    /// - Any error [`ReservationCoordinator::check_bulk`] returns, such as
    ///   [`SchedulingError::CapacityExceeded`]
    #[tracing::instrument(skip(self, requirements), name = "find_alternatives")]
    pub async fn find(
        &self,
        requirements: &[Requirement],
        facility_id: FacilityId,
        original: TimeWindow,
        options: SearchOptions,
    ) -> Result<Vec<AlternativeSlot>, SchedulingError> {
        if options.step_minutes == 0 {
            return Err(SchedulingError::InvalidRequest(
                "search step must be at least one minute".into(),
            ));
        }
        if options.day_start >= options.day_end {
            return Err(SchedulingError::InvalidRequest(
                "search day must start before it ends".into(),
            ));
        }
        let Some(first) = requirements.first() else {
            return Err(SchedulingError::InvalidRequest(
                "at least one requirement is needed".into(),
            ));
        };

        let config = self
            .ledger
            .facility_config(facility_id, first.equipment_type)
            .await?
            .ok_or(SchedulingError::ConfigurationMissing {
                facility_id,
                equipment_type: first.equipment_type,
            })?;

        let out_of_range = || {
            SchedulingError::InvalidRequest("search day lies outside the supported time range".into())
        };
        let date = config
            .to_local(original.from())
            .ok_or_else(out_of_range)?
            .date();
        let duration = original.duration();
        let step = Duration::minutes(i64::from(options.step_minutes));
        let last_start = config
            .to_utc(date, options.day_end)
            .and_then(|end| end.checked_sub_signed(duration))
            .ok_or_else(out_of_range)?;

        let mut slots = Vec::new();
        let mut scanned = 0u32;
        let mut start = config
            .to_utc(date, options.day_start)
            .ok_or_else(out_of_range)?;

        while start <= last_start && slots.len() < options.max_results {
            if start != original.from() {
                scanned += 1;
                let window = TimeWindow::starting_at(start, duration)?;
                let availability = self
                    .coordinator
                    .check_bulk(requirements, facility_id, window)
                    .await?;

                tracing::debug!(
                    from = %window.from(),
                    feasible = availability.can_accommodate,
                    "Candidate evaluated"
                );
                if availability.can_accommodate {
                    slots.push(AlternativeSlot {
                        window,
                        availability,
                    });
                }
            }
            let Some(next) = start.checked_add_signed(step) else {
                break;
            };
            start = next;
        }

        metrics::record_alternative_scan(scanned);
        tracing::info!(found = slots.len(), scanned, "Alternative search finished");
        Ok(slots)
    }
}

impl std::fmt::Debug for AlternativeSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlternativeSearch")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
