//! Scheduling metrics.
//!
//! Prometheus metrics for the scheduling engine, recorded through the
//! `metrics` facade. Without an installed recorder every call is a no-op.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `gearbook_reservations_total{status}` - Reservations by lifecycle step
//!   (created, checked_in, completed, cancelled, no_show)
//! - `gearbook_reserve_conflicts_total` - Reserve calls rejected at commit
//! - `gearbook_availability_checks_total{equipment_type}` - Availability queries
//!
//! ## Gauges
//! - `gearbook_utilization_percent{facility_id,equipment_type}` - Latest snapshot utilization
//!
//! ## Histograms
//! - `gearbook_commit_duration_seconds{operation}` - Ledger commit latency
//! - `gearbook_alternative_slots_scanned` - Candidates evaluated per slot search

use gearbook_core::{EquipmentType, FacilityId};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Initialize and register all scheduling metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_metrics() {
    describe_counter!(
        "gearbook_reservations_total",
        "Reservations by lifecycle step (created, checked_in, completed, cancelled, no_show)"
    );
    describe_counter!(
        "gearbook_reserve_conflicts_total",
        "Reserve calls rejected because a unit was taken before commit"
    );
    describe_counter!(
        "gearbook_availability_checks_total",
        "Availability queries by equipment type"
    );
    describe_gauge!(
        "gearbook_utilization_percent",
        "Share of units reserved or in use at the last snapshot"
    );
    describe_histogram!(
        "gearbook_commit_duration_seconds",
        "Time taken to commit a unit of work to the ledger"
    );
    describe_histogram!(
        "gearbook_alternative_slots_scanned",
        "Candidate start times evaluated by one alternative slot search"
    );

    tracing::info!("Scheduling metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record reservations created by one reserve call.
pub fn record_reservations_created(count: usize) {
    metrics::counter!("gearbook_reservations_total", "status" => "created")
        .increment(count as u64);
    tracing::debug!(count, "Recorded reservations_created metric");
}

/// Record one reservation moving through its lifecycle.
///
/// # Arguments
///
/// * `step` - `checked_in`, `completed`, `cancelled` or `no_show`
pub fn record_reservation_step(step: &'static str) {
    metrics::counter!("gearbook_reservations_total", "status" => step).increment(1);
    tracing::debug!(step, "Recorded reservation step metric");
}

/// Record a reserve call that lost a race.
pub fn record_reserve_conflict(units: usize) {
    metrics::counter!("gearbook_reserve_conflicts_total").increment(1);
    tracing::debug!(units, "Recorded reserve_conflict metric");
}

/// Record an availability query.
pub fn record_availability_check(equipment_type: EquipmentType) {
    metrics::counter!(
        "gearbook_availability_checks_total",
        "equipment_type" => equipment_type.as_str()
    )
    .increment(1);
}

/// Record how long a ledger commit took.
pub fn record_commit_duration(operation: &'static str, duration_secs: f64) {
    metrics::histogram!("gearbook_commit_duration_seconds", "operation" => operation)
        .record(duration_secs);
    tracing::debug!(operation, duration_secs, "Recorded commit_duration metric");
}

/// Record how many candidates one slot search evaluated.
pub fn record_alternative_scan(candidates: u32) {
    metrics::histogram!("gearbook_alternative_slots_scanned").record(f64::from(candidates));
}

/// Update the utilization gauge for one equipment type at a facility.
pub fn update_utilization(facility_id: FacilityId, equipment_type: EquipmentType, percent: f64) {
    metrics::gauge!(
        "gearbook_utilization_percent",
        "facility_id" => facility_id.to_string(),
        "equipment_type" => equipment_type.as_str()
    )
    .set(percent);
    tracing::debug!(%facility_id, %equipment_type, percent, "Updated utilization metric");
}

// ============================================================================
// Prometheus recorder
// ============================================================================

/// Errors from installing the Prometheus recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build the exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder for the scheduling metrics.
///
/// Rendering is left to the embedding service, which exposes the text on
/// whatever endpoint it serves.
#[derive(Clone, Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Registers metric descriptions and installs the global Prometheus recorder.
    ///
    /// If another recorder is already installed (tests, a host service), the
    /// returned recorder renders nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .set_buckets_for_metric(
                Matcher::Full("gearbook_alternative_slots_scanned".to_string()),
                &[1.0, 2.0, 5.0, 10.0, 20.0, 32.0, 64.0, 128.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = match builder.install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    None
                } else {
                    return Err(MetricsError::Install(err_msg));
                }
            }
        };

        register_metrics();
        Ok(Self { handle })
    }

    /// Current metrics in Prometheus text format, if this recorder is installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}
