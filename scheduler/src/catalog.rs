//! Equipment Catalog.
//!
//! Registers units and stores facility configs. Both writes are capacity
//! checked at commit time, so the number of registered units of a type never
//! exceeds the config's `total_count`.

use crate::error::SchedulingError;
use chrono::NaiveDate;
use gearbook_core::{
    EquipmentType, EquipmentUnit, FacilityEquipmentConfig, FacilityId, Guard, LedgerStore,
    LedgerWrite, UnitId, UnitOfWork,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest accepted distance of facility local time from UTC.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// A unit to add to the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewUnit {
    /// Kind of machine
    pub equipment_type: EquipmentType,
    /// Display name
    pub name: String,
    /// Facility housing the unit
    pub facility_id: FacilityId,
    /// Where in the facility it stands
    pub location: String,
    /// Next scheduled service
    pub next_maintenance: Option<NaiveDate>,
    /// Manufacturer specs
    pub specs: serde_json::Value,
}

impl NewUnit {
    /// A unit with no maintenance date and no specs.
    #[must_use]
    pub fn new(
        equipment_type: EquipmentType,
        name: impl Into<String>,
        facility_id: FacilityId,
        location: impl Into<String>,
    ) -> Self {
        Self {
            equipment_type,
            name: name.into(),
            facility_id,
            location: location.into(),
            next_maintenance: None,
            specs: serde_json::Value::Null,
        }
    }

    /// Sets the manufacturer specs.
    #[must_use]
    pub fn with_specs(mut self, specs: serde_json::Value) -> Self {
        self.specs = specs;
        self
    }
}

/// Values applied to configs created with [`Catalog::config_template`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigDefaults {
    /// Check-in buffer in minutes
    pub check_in_buffer_minutes: u32,
    /// Longest session in minutes
    pub max_session_minutes: u32,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            check_in_buffer_minutes: 15,
            max_session_minutes: 180,
        }
    }
}

/// Units and facility configs.
#[derive(Clone)]
pub struct Catalog {
    ledger: Arc<dyn LedgerStore>,
    defaults: ConfigDefaults,
}

impl Catalog {
    /// Creates a catalog over `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            defaults: ConfigDefaults::default(),
        }
    }

    /// Replaces the defaults used by [`Catalog::config_template`].
    #[must_use]
    pub const fn with_defaults(mut self, defaults: ConfigDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// A config for `total_count` units open 06:00–22:00 daily, with this
    /// catalog's defaults. Not stored until passed to [`Catalog::upsert_config`].
    #[must_use]
    pub fn config_template(
        &self,
        facility_id: FacilityId,
        equipment_type: EquipmentType,
        total_count: u32,
    ) -> FacilityEquipmentConfig {
        let mut config = FacilityEquipmentConfig::new(facility_id, equipment_type, total_count);
        config.check_in_buffer_minutes = self.defaults.check_in_buffer_minutes;
        config.max_session_minutes = self.defaults.max_session_minutes;
        config
    }

    /// Creates or replaces the config for its (facility, type).
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::InvalidRequest`] for a zero count or session length,
    ///   inverted opening hours, or an out-of-range UTC offset
    /// - [`SchedulingError::CapacityExceeded`] when more units are already
    ///   registered than `total_count` allows
    #[tracing::instrument(skip(self, config), fields(facility_id = %config.facility_id, equipment_type = %config.equipment_type))]
    pub async fn upsert_config(
        &self,
        config: FacilityEquipmentConfig,
    ) -> Result<FacilityEquipmentConfig, SchedulingError> {
        validate_config(&config)?;

        let work = UnitOfWork::new()
            .guard(Guard::UnitCount {
                facility_id: config.facility_id,
                equipment_type: config.equipment_type,
                adding: 0,
                limit: config.total_count,
            })
            .write(LedgerWrite::UpsertConfig(config.clone()));
        self.ledger.commit(work).await?;

        tracing::info!(total_count = config.total_count, "Facility config stored");
        Ok(config)
    }

    /// Adds a unit. New units start out available.
    ///
    /// # Errors
    ///
    /// - [`SchedulingError::ConfigurationMissing`] when the facility has no
    ///   config for the type
    /// - [`SchedulingError::CapacityExceeded`] when the type is already at
    ///   `total_count`
    /// - [`SchedulingError::InvalidRequest`] for a blank name
    #[tracing::instrument(skip(self, new_unit), fields(facility_id = %new_unit.facility_id, equipment_type = %new_unit.equipment_type))]
    pub async fn register_unit(&self, new_unit: NewUnit) -> Result<EquipmentUnit, SchedulingError> {
        if new_unit.name.trim().is_empty() {
            return Err(SchedulingError::InvalidRequest("unit name must not be blank".into()));
        }

        let config = self.config(new_unit.facility_id, new_unit.equipment_type).await?;

        let mut unit = EquipmentUnit::new(
            new_unit.equipment_type,
            new_unit.name,
            new_unit.facility_id,
            new_unit.location,
        );
        unit.next_maintenance = new_unit.next_maintenance;
        unit.specs = new_unit.specs;

        let work = UnitOfWork::new()
            .guard(Guard::UnitCount {
                facility_id: config.facility_id,
                equipment_type: config.equipment_type,
                adding: 1,
                limit: config.total_count,
            })
            .write(LedgerWrite::InsertUnit(unit.clone()));
        self.ledger.commit(work).await?;

        tracing::info!(unit_id = %unit.id, name = %unit.name, "Unit registered");
        Ok(unit)
    }

    /// One unit.
    ///
    /// # Errors
    ///
    /// [`SchedulingError::NotFound`] when no such unit exists.
    pub async fn unit(&self, unit_id: UnitId) -> Result<EquipmentUnit, SchedulingError> {
        self.ledger
            .unit(unit_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("unit", unit_id))
    }

    /// Units at a facility, optionally of one type, ordered by name.
    ///
    /// # Errors
    ///
    /// [`SchedulingError::Ledger`] when the store fails.
    pub async fn units(
        &self,
        facility_id: FacilityId,
        equipment_type: Option<EquipmentType>,
    ) -> Result<Vec<EquipmentUnit>, SchedulingError> {
        Ok(self.ledger.units(facility_id, equipment_type).await?)
    }

    /// The config for (facility, type).
    ///
    /// # Errors
    ///
    /// [`SchedulingError::ConfigurationMissing`] when none is stored.
    pub async fn config(
        &self,
        facility_id: FacilityId,
        equipment_type: EquipmentType,
    ) -> Result<FacilityEquipmentConfig, SchedulingError> {
        self.ledger
            .facility_config(facility_id, equipment_type)
            .await?
            .ok_or(SchedulingError::ConfigurationMissing {
                facility_id,
                equipment_type,
            })
    }

    /// Every config stored for a facility.
    ///
    /// # Errors
    ///
    /// [`SchedulingError::Ledger`] when the store fails.
    pub async fn configs(
        &self,
        facility_id: FacilityId,
    ) -> Result<Vec<FacilityEquipmentConfig>, SchedulingError> {
        Ok(self.ledger.facility_configs(facility_id).await?)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

fn validate_config(config: &FacilityEquipmentConfig) -> Result<(), SchedulingError> {
    if config.total_count == 0 {
        return Err(SchedulingError::InvalidRequest(
            "total_count must be at least 1".into(),
        ));
    }
    if config.max_session_minutes == 0 {
        return Err(SchedulingError::InvalidRequest(
            "max_session_minutes must be at least 1".into(),
        ));
    }
    if config.operating_hours.configured().any(|hours| !hours.is_valid()) {
        return Err(SchedulingError::InvalidRequest(
            "opening time must be before closing time".into(),
        ));
    }
    if config.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(SchedulingError::InvalidRequest(format!(
            "utc offset {} min is out of range",
            config.utc_offset_minutes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};
    use gearbook_core::DailyHours;

    fn config() -> FacilityEquipmentConfig {
        FacilityEquipmentConfig::new(FacilityId::new(), EquipmentType::Treadmill, 4)
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn inverted_hours_are_rejected() {
        let mut config = config();
        let hours = DailyHours::new(
            NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
        );
        config.operating_hours = config.operating_hours.with_day(Weekday::Sat, Some(hours));
        assert!(matches!(
            validate_config(&config),
            Err(SchedulingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = config();
        config.total_count = 0;
        assert!(validate_config(&config).is_err());
    }
}
