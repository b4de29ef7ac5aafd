//! [`LedgerStore`] backed by `PostgreSQL`.

use crate::rows::{
    CONFIG_COLUMNS, RESERVATION_COLUMNS, UNIT_COLUMNS, config_from_row, db, reservation_from_row,
    to_i32, to_json, unit_from_row, uuids,
};
use gearbook_core::ledger::{GuardFailures, LedgerFuture};
use gearbook_core::{
    EquipmentStatus, EquipmentType, EquipmentUnit, FacilityEquipmentConfig, FacilityId, Guard,
    LedgerError, LedgerStore, LedgerWrite, Reservation, ReservationId, ReservationStatus,
    SessionId, TimeWindow, UnitId, UnitOfWork,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;

/// Serialization failure raised by `SERIALIZABLE` transactions.
const SERIALIZATION_FAILURE: &str = "40001";
/// Exclusion constraint violation (overlapping active reservations).
const EXCLUSION_VIOLATION: &str = "23P01";

/// Connection pool settings.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// `PostgreSQL` ledger.
///
/// Every [`UnitOfWork`] runs in one `SERIALIZABLE` transaction: the touched unit
/// rows are locked in id order with `SELECT … FOR UPDATE`, every guard is
/// evaluated, and the writes are applied only if all guards hold. A
/// serialization failure or a hit on the overlap exclusion constraint is
/// reported as [`LedgerError::Conflict`] naming the touched units, or as
/// [`LedgerError::Contended`] when the unit of work touched no unit.
///
/// # Example
///
/// ```ignore
/// use gearbook_postgres::PostgresLedger;
///
/// let ledger = PostgresLedger::connect("postgres://localhost/gearbook", Default::default()).await?;
/// ledger.migrate().await?;
/// ```
#[derive(Clone, Debug)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with the given pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the connection cannot be established.
    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Creates the scheduling tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_unit(&self, unit_id: UnitId) -> Result<Option<EquipmentUnit>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM equipment_units WHERE id = $1"
        ))
        .bind(unit_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(unit_from_row).transpose()
    }

    async fn fetch_units(
        &self,
        facility_id: FacilityId,
        equipment_type: Option<EquipmentType>,
    ) -> Result<Vec<EquipmentUnit>, LedgerError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {UNIT_COLUMNS} FROM equipment_units
            WHERE facility_id = $1 AND ($2::TEXT IS NULL OR equipment_type = $2)
            ORDER BY name, id
            "
        ))
        .bind(facility_id.as_uuid())
        .bind(equipment_type.map(EquipmentType::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn fetch_config(
        &self,
        facility_id: FacilityId,
        equipment_type: EquipmentType,
    ) -> Result<Option<FacilityEquipmentConfig>, LedgerError> {
        let row = sqlx::query(&format!(
            r"
            SELECT {CONFIG_COLUMNS} FROM facility_equipment_configs
            WHERE facility_id = $1 AND equipment_type = $2
            "
        ))
        .bind(facility_id.as_uuid())
        .bind(equipment_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(config_from_row).transpose()
    }

    async fn fetch_configs(
        &self,
        facility_id: FacilityId,
    ) -> Result<Vec<FacilityEquipmentConfig>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM facility_equipment_configs WHERE facility_id = $1"
        ))
        .bind(facility_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut configs = rows
            .iter()
            .map(config_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        configs.sort_by_key(|c| c.equipment_type);
        Ok(configs)
    }

    async fn fetch_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM equipment_reservations WHERE id = $1"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn fetch_active(
        &self,
        unit_ids: Vec<UnitId>,
        window: Option<TimeWindow>,
    ) -> Result<Vec<Reservation>, LedgerError> {
        if unit_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            r"
            SELECT {RESERVATION_COLUMNS} FROM equipment_reservations
            WHERE unit_id = ANY($1)
              AND status = 'active'
              AND ($2::TIMESTAMPTZ IS NULL OR (reserved_from < $3 AND $2 < reserved_until))
            ORDER BY reserved_from, reserved_until, id
            "
        ))
        .bind(uuids(&unit_ids))
        .bind(window.map(|w| w.from()))
        .bind(window.map(|w| w.until()))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn fetch_session(&self, session_id: SessionId) -> Result<Vec<Reservation>, LedgerError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {RESERVATION_COLUMNS} FROM equipment_reservations
            WHERE session_id = $1
            ORDER BY created_at, id
            "
        ))
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn commit_work(&self, work: UnitOfWork) -> Result<(), LedgerError> {
        let touched = work.touched_units();
        let result = self.run_transaction(work, &touched).await;

        result.map_err(|error| match error {
            TxError::Ledger(error) => error,
            TxError::Sql(error) => {
                if is_conflict(&error) {
                    metrics::counter!("gearbook_ledger_serialization_failures_total").increment(1);
                    tracing::warn!(units = ?touched, %error, "commit lost a serialization race");
                    serialization_failure(touched)
                } else {
                    db(error)
                }
            }
        })
    }

    async fn run_transaction(&self, work: UnitOfWork, touched: &[UnitId]) -> Result<(), TxError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        if !touched.is_empty() {
            sqlx::query("SELECT id FROM equipment_units WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(uuids(touched))
                .fetch_all(&mut *tx)
                .await?;
        }

        let (guards, writes) = work.into_parts();
        let mut failures = GuardFailures::new();
        for guard in &guards {
            check_guard(&mut tx, guard, &mut failures).await?;
        }
        // Dropping the transaction rolls it back.
        failures.into_result()?;

        for write in writes {
            apply_write(&mut tx, write).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Error for a commit that lost a serialization race.
fn serialization_failure(touched: Vec<UnitId>) -> LedgerError {
    if touched.is_empty() {
        LedgerError::Contended
    } else {
        LedgerError::Conflict { units: touched }
    }
}

/// Failure inside a commit transaction, before mapping to [`LedgerError`].
enum TxError {
    Ledger(LedgerError),
    Sql(sqlx::Error),
}

impl From<LedgerError> for TxError {
    fn from(error: LedgerError) -> Self {
        Self::Ledger(error)
    }
}

impl From<sqlx::Error> for TxError {
    fn from(error: sqlx::Error) -> Self {
        Self::Sql(error)
    }
}

fn is_conflict(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == SERIALIZATION_FAILURE || code == EXCLUSION_VIOLATION)
}

async fn unit_status(
    conn: &mut PgConnection,
    unit_id: UnitId,
) -> Result<Option<EquipmentStatus>, TxError> {
    let status: Option<(String,)> = sqlx::query_as("SELECT status FROM equipment_units WHERE id = $1")
        .bind(unit_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    status
        .map(|(raw,)| raw.parse::<EquipmentStatus>())
        .transpose()
        .map_err(|e| TxError::Ledger(LedgerError::Serialization(e.to_string())))
}

async fn check_guard(
    conn: &mut PgConnection,
    guard: &Guard,
    failures: &mut GuardFailures,
) -> Result<(), TxError> {
    match guard {
        Guard::UnitFree { unit_id, window } => {
            let Some(status) = unit_status(conn, *unit_id).await? else {
                failures.missing(format!("unit {unit_id}"));
                return Ok(());
            };

            let (overlapping,): (bool,) = sqlx::query_as(
                r"
                SELECT EXISTS (
                    SELECT 1 FROM equipment_reservations
                    WHERE unit_id = $1 AND status = 'active'
                      AND reserved_from < $3 AND $2 < reserved_until
                )
                ",
            )
            .bind(unit_id.as_uuid())
            .bind(window.from())
            .bind(window.until())
            .fetch_one(&mut *conn)
            .await?;

            if status != EquipmentStatus::Available || overlapping {
                failures.conflict(*unit_id);
            }
        }
        Guard::UnitStatus { unit_id, expected } => match unit_status(conn, *unit_id).await? {
            None => failures.missing(format!("unit {unit_id}")),
            Some(status) if status != *expected => failures.conflict(*unit_id),
            Some(_) => {}
        },
        Guard::UnitOccupancy { unit_id, active } => {
            if unit_status(conn, *unit_id).await?.is_none() {
                failures.missing(format!("unit {unit_id}"));
                return Ok(());
            }

            let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
                r"
                SELECT id FROM equipment_reservations
                WHERE unit_id = $1 AND status = 'active'
                FOR UPDATE
                ",
            )
            .bind(unit_id.as_uuid())
            .fetch_all(&mut *conn)
            .await?;

            let mut current: Vec<ReservationId> = rows
                .into_iter()
                .map(|(id,)| ReservationId::from_uuid(id))
                .collect();
            current.sort();
            if current != *active {
                failures.conflict(*unit_id);
            }
        }
        Guard::ReservationStatus {
            reservation_id,
            expected,
            checked_in,
        } => {
            let row: Option<(String, bool)> = sqlx::query_as(
                r"
                SELECT status, check_in_time IS NOT NULL
                FROM equipment_reservations WHERE id = $1
                FOR UPDATE
                ",
            )
            .bind(reservation_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

            match row {
                None => failures.missing(format!("reservation {reservation_id}")),
                Some((status, is_checked_in)) => {
                    let status = status
                        .parse::<ReservationStatus>()
                        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
                    let check_in_matches = checked_in.is_none_or(|wanted| wanted == is_checked_in);
                    if status != *expected || !check_in_matches {
                        failures.stale(*reservation_id);
                    }
                }
            }
        }
        Guard::UnitCount {
            facility_id,
            equipment_type,
            adding,
            limit,
        } => {
            let (registered,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM equipment_units WHERE facility_id = $1 AND equipment_type = $2",
            )
            .bind(facility_id.as_uuid())
            .bind(equipment_type.as_str())
            .fetch_one(&mut *conn)
            .await?;

            if registered.saturating_add(i64::from(*adding)) > i64::from(*limit) {
                failures.capacity(*facility_id, *equipment_type, *limit);
            }
        }
    }
    Ok(())
}

async fn apply_write(conn: &mut PgConnection, write: LedgerWrite) -> Result<(), TxError> {
    match write {
        LedgerWrite::InsertUnit(unit) => {
            sqlx::query(
                r"
                INSERT INTO equipment_units (
                    id, equipment_type, name, facility_id, location, status,
                    last_maintenance, next_maintenance, specs
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(unit.id.as_uuid())
            .bind(unit.equipment_type.as_str())
            .bind(&unit.name)
            .bind(unit.facility_id.as_uuid())
            .bind(&unit.location)
            .bind(unit.status.as_str())
            .bind(unit.last_maintenance)
            .bind(unit.next_maintenance)
            .bind(&unit.specs)
            .execute(&mut *conn)
            .await?;
        }
        LedgerWrite::UpsertConfig(config) => {
            sqlx::query(
                r"
                INSERT INTO facility_equipment_configs (
                    facility_id, equipment_type, total_count, operating_hours,
                    max_session_minutes, min_notice_minutes, max_advance_days,
                    check_in_buffer_minutes, utc_offset_minutes, restrictions
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (facility_id, equipment_type) DO UPDATE SET
                    total_count = EXCLUDED.total_count,
                    operating_hours = EXCLUDED.operating_hours,
                    max_session_minutes = EXCLUDED.max_session_minutes,
                    min_notice_minutes = EXCLUDED.min_notice_minutes,
                    max_advance_days = EXCLUDED.max_advance_days,
                    check_in_buffer_minutes = EXCLUDED.check_in_buffer_minutes,
                    utc_offset_minutes = EXCLUDED.utc_offset_minutes,
                    restrictions = EXCLUDED.restrictions
                ",
            )
            .bind(config.facility_id.as_uuid())
            .bind(config.equipment_type.as_str())
            .bind(to_i32(config.total_count)?)
            .bind(to_json(&config.operating_hours)?)
            .bind(to_i32(config.max_session_minutes)?)
            .bind(to_i32(config.min_notice_minutes)?)
            .bind(config.max_advance_days.map(to_i32).transpose()?)
            .bind(to_i32(config.check_in_buffer_minutes)?)
            .bind(config.utc_offset_minutes)
            .bind(to_json(&config.restrictions)?)
            .execute(&mut *conn)
            .await?;
        }
        LedgerWrite::InsertReservation(r) => {
            sqlx::query(
                r"
                INSERT INTO equipment_reservations (
                    id, unit_id, session_id, player_id, reserved_from, reserved_until,
                    status, reserved_by, created_at, check_in_time, checked_in_by,
                    check_out_time, checked_out_by, cancellation_reason, notes
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ",
            )
            .bind(r.id.as_uuid())
            .bind(r.unit_id.as_uuid())
            .bind(r.session_id.as_uuid())
            .bind(r.player_id.map(|p| *p.as_uuid()))
            .bind(r.window.from())
            .bind(r.window.until())
            .bind(r.status.as_str())
            .bind(r.reserved_by.as_uuid())
            .bind(r.created_at)
            .bind(r.check_in_time)
            .bind(r.checked_in_by.map(|u| *u.as_uuid()))
            .bind(r.check_out_time)
            .bind(r.checked_out_by.map(|u| *u.as_uuid()))
            .bind(&r.cancellation_reason)
            .bind(&r.notes)
            .execute(&mut *conn)
            .await?;
        }
        LedgerWrite::UpdateReservation(r) => {
            let result = sqlx::query(
                r"
                UPDATE equipment_reservations SET
                    player_id = $3,
                    status = $4,
                    check_in_time = $5,
                    checked_in_by = $6,
                    check_out_time = $7,
                    checked_out_by = $8,
                    cancellation_reason = $9,
                    notes = $10
                WHERE id = $1 AND unit_id = $2
                ",
            )
            .bind(r.id.as_uuid())
            .bind(r.unit_id.as_uuid())
            .bind(r.player_id.map(|p| *p.as_uuid()))
            .bind(r.status.as_str())
            .bind(r.check_in_time)
            .bind(r.checked_in_by.map(|u| *u.as_uuid()))
            .bind(r.check_out_time)
            .bind(r.checked_out_by.map(|u| *u.as_uuid()))
            .bind(&r.cancellation_reason)
            .bind(&r.notes)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::MissingRow(format!("reservation {}", r.id)).into());
            }
        }
        LedgerWrite::SetUnitStatus { unit_id, status } => {
            let result = sqlx::query("UPDATE equipment_units SET status = $2 WHERE id = $1")
                .bind(unit_id.as_uuid())
                .bind(status.as_str())
                .execute(&mut *conn)
                .await?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::MissingRow(format!("unit {unit_id}")).into());
            }
        }
    }
    Ok(())
}

impl LedgerStore for PostgresLedger {
    fn unit(&self, unit_id: UnitId) -> LedgerFuture<'_, Option<EquipmentUnit>> {
        Box::pin(self.fetch_unit(unit_id))
    }

    fn units(
        &self,
        facility_id: FacilityId,
        equipment_type: Option<EquipmentType>,
    ) -> LedgerFuture<'_, Vec<EquipmentUnit>> {
        Box::pin(self.fetch_units(facility_id, equipment_type))
    }

    fn facility_config(
        &self,
        facility_id: FacilityId,
        equipment_type: EquipmentType,
    ) -> LedgerFuture<'_, Option<FacilityEquipmentConfig>> {
        Box::pin(self.fetch_config(facility_id, equipment_type))
    }

    fn facility_configs(
        &self,
        facility_id: FacilityId,
    ) -> LedgerFuture<'_, Vec<FacilityEquipmentConfig>> {
        Box::pin(self.fetch_configs(facility_id))
    }

    fn reservation(&self, reservation_id: ReservationId) -> LedgerFuture<'_, Option<Reservation>> {
        Box::pin(self.fetch_reservation(reservation_id))
    }

    fn active_reservations(
        &self,
        unit_ids: Vec<UnitId>,
        window: Option<TimeWindow>,
    ) -> LedgerFuture<'_, Vec<Reservation>> {
        Box::pin(self.fetch_active(unit_ids, window))
    }

    fn reservations_for_session(
        &self,
        session_id: SessionId,
    ) -> LedgerFuture<'_, Vec<Reservation>> {
        Box::pin(self.fetch_session(session_id))
    }

    fn commit(&self, work: UnitOfWork) -> LedgerFuture<'_, ()> {
        Box::pin(self.commit_work(work))
    }
}
