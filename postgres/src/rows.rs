//! Row decoding and value conversion between Postgres columns and domain types.

use gearbook_core::{
    EquipmentUnit, FacilityEquipmentConfig, FacilityId, LedgerError, PlayerId, Reservation,
    ReservationId, SessionId, TimeWindow, UnitId, UserId,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const UNIT_COLUMNS: &str = "id, equipment_type, name, facility_id, location, status, \
     last_maintenance, next_maintenance, specs";

pub(crate) const CONFIG_COLUMNS: &str = "facility_id, equipment_type, total_count, operating_hours, \
     max_session_minutes, min_notice_minutes, max_advance_days, check_in_buffer_minutes, \
     utc_offset_minutes, restrictions";

pub(crate) const RESERVATION_COLUMNS: &str = "id, unit_id, session_id, player_id, reserved_from, \
     reserved_until, status, reserved_by, created_at, check_in_time, checked_in_by, \
     check_out_time, checked_out_by, cancellation_reason, notes";

pub(crate) fn db(error: sqlx::Error) -> LedgerError {
    LedgerError::Database(error.to_string())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, LedgerError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| LedgerError::Serialization(format!("column {name}: {e}")))
}

fn parsed<T>(row: &PgRow, name: &str) -> Result<T, LedgerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse()
        .map_err(|e: T::Err| LedgerError::Serialization(e.to_string()))
}

fn json<T: serde::de::DeserializeOwned>(row: &PgRow, name: &str) -> Result<T, LedgerError> {
    let value: serde_json::Value = column(row, name)?;
    serde_json::from_value(value)
        .map_err(|e| LedgerError::Serialization(format!("column {name}: {e}")))
}

fn unsigned(row: &PgRow, name: &str) -> Result<u32, LedgerError> {
    let value: i32 = column(row, name)?;
    u32::try_from(value)
        .map_err(|_| LedgerError::Serialization(format!("column {name}: negative value {value}")))
}

/// Converts a count or duration to its `INTEGER` column value.
pub(crate) fn to_i32(value: u32) -> Result<i32, LedgerError> {
    i32::try_from(value)
        .map_err(|_| LedgerError::Serialization(format!("{value} does not fit an INTEGER column")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

pub(crate) fn uuids(units: &[UnitId]) -> Vec<Uuid> {
    units.iter().map(|u| *u.as_uuid()).collect()
}

pub(crate) fn unit_from_row(row: &PgRow) -> Result<EquipmentUnit, LedgerError> {
    Ok(EquipmentUnit {
        id: UnitId::from_uuid(column(row, "id")?),
        equipment_type: parsed(row, "equipment_type")?,
        name: column(row, "name")?,
        facility_id: FacilityId::from_uuid(column(row, "facility_id")?),
        location: column(row, "location")?,
        status: parsed(row, "status")?,
        last_maintenance: column(row, "last_maintenance")?,
        next_maintenance: column(row, "next_maintenance")?,
        specs: column(row, "specs")?,
    })
}

pub(crate) fn config_from_row(row: &PgRow) -> Result<FacilityEquipmentConfig, LedgerError> {
    let max_advance_days: Option<i32> = column(row, "max_advance_days")?;
    Ok(FacilityEquipmentConfig {
        facility_id: FacilityId::from_uuid(column(row, "facility_id")?),
        equipment_type: parsed(row, "equipment_type")?,
        total_count: unsigned(row, "total_count")?,
        operating_hours: json(row, "operating_hours")?,
        max_session_minutes: unsigned(row, "max_session_minutes")?,
        min_notice_minutes: unsigned(row, "min_notice_minutes")?,
        max_advance_days: max_advance_days.and_then(|days| u32::try_from(days).ok()),
        check_in_buffer_minutes: unsigned(row, "check_in_buffer_minutes")?,
        utc_offset_minutes: column(row, "utc_offset_minutes")?,
        restrictions: json(row, "restrictions")?,
    })
}

pub(crate) fn reservation_from_row(row: &PgRow) -> Result<Reservation, LedgerError> {
    let window = TimeWindow::new(column(row, "reserved_from")?, column(row, "reserved_until")?)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    let player: Option<Uuid> = column(row, "player_id")?;
    let checked_in_by: Option<Uuid> = column(row, "checked_in_by")?;
    let checked_out_by: Option<Uuid> = column(row, "checked_out_by")?;

    Ok(Reservation {
        id: ReservationId::from_uuid(column(row, "id")?),
        unit_id: UnitId::from_uuid(column(row, "unit_id")?),
        session_id: SessionId::from_uuid(column(row, "session_id")?),
        player_id: player.map(PlayerId::from_uuid),
        window,
        status: parsed(row, "status")?,
        reserved_by: UserId::from_uuid(column(row, "reserved_by")?),
        created_at: column(row, "created_at")?,
        check_in_time: column(row, "check_in_time")?,
        checked_in_by: checked_in_by.map(UserId::from_uuid),
        check_out_time: column(row, "check_out_time")?,
        checked_out_by: checked_out_by.map(UserId::from_uuid),
        cancellation_reason: column(row, "cancellation_reason")?,
        notes: column(row, "notes")?,
    })
}
