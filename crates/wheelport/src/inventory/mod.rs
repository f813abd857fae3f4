//! Inventory store for wheelport.
//!
//! The [`Inventory`] trait is the seam between booking sessions and the
//! backing store. Every status change goes through
//! [`Inventory::compare_and_set`], a single conditional write, so two
//! clients racing for the same unit can never both win.
//!
//! [`SqliteInventory`] is the `SQLite` implementation used by the binary.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::unit::{Reservation, Trip, Unit, UnitStatus};

/// A conditional update of one unit's booking fields.
///
/// Applied only when the unit's current status and reservation equal the
/// expected values; otherwise nothing is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// The unit to update.
    pub unit_id: String,
    /// Status the unit must currently have.
    pub expected_status: UnitStatus,
    /// Reservation the unit must currently hold.
    pub expected_reservation: Option<Uuid>,
    /// New status.
    pub status: UnitStatus,
    /// New reservation, `None` to clear.
    pub reservation: Option<Reservation>,
    /// New token digest, `None` to clear.
    pub token_digest: Option<String>,
}

impl StatusUpdate {
    /// Take a provisional hold on an available unit.
    #[must_use]
    pub fn hold(unit_id: impl Into<String>, reservation: Reservation) -> Self {
        Self {
            unit_id: unit_id.into(),
            expected_status: UnitStatus::Available,
            expected_reservation: None,
            status: UnitStatus::Reserved,
            reservation: Some(reservation),
            token_digest: None,
        }
    }

    /// Record the issued token digest on a held unit.
    #[must_use]
    pub fn attach_token(
        unit_id: impl Into<String>,
        reservation: Reservation,
        token_digest: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            expected_status: UnitStatus::Reserved,
            expected_reservation: Some(reservation.id),
            status: UnitStatus::Reserved,
            reservation: Some(reservation),
            token_digest: Some(token_digest.into()),
        }
    }

    /// Mark a held unit as in use after its proof was verified.
    #[must_use]
    pub fn activate(
        unit_id: impl Into<String>,
        reservation: Reservation,
        token_digest: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            expected_status: UnitStatus::Reserved,
            expected_reservation: Some(reservation.id),
            status: UnitStatus::InUse,
            reservation: Some(reservation),
            token_digest: Some(token_digest.into()),
        }
    }

    /// Return a unit to the available pool, clearing reservation and token.
    #[must_use]
    pub fn release(unit_id: impl Into<String>, from: UnitStatus, reservation_id: Uuid) -> Self {
        Self {
            unit_id: unit_id.into(),
            expected_status: from,
            expected_reservation: Some(reservation_id),
            status: UnitStatus::Available,
            reservation: None,
            token_digest: None,
        }
    }
}

/// Access to the set of reservable units.
#[async_trait]
pub trait Inventory: Send + Sync + std::fmt::Debug {
    /// List every unit. Consecutive calls are not guaranteed to observe a
    /// consistent snapshot.
    async fn list_units(&self) -> Result<Vec<Unit>>;

    /// Fetch a single unit.
    async fn get_unit(&self, unit_id: &str) -> Result<Option<Unit>>;

    /// Apply `update` if the unit still matches its expectations.
    ///
    /// Returns `false` when the unit changed underneath the caller.
    async fn compare_and_set(&self, update: &StatusUpdate) -> Result<bool>;

    /// Release every `reserved` unit whose reservation started before
    /// `cutoff`. Returns the number of units released.
    async fn release_expired(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Archive a completed trip, returning its identifier.
    async fn archive_trip(&self, trip: &Trip) -> Result<i64>;
}

/// `SQLite` implementation of [`Inventory`].
///
/// The connection is guarded by a mutex so one inventory can be shared by
/// several sessions; every conditional write is a single `UPDATE`, which
/// `SQLite` applies atomically across connections and processes as well.
///
/// The inherent methods block. The [`Inventory`] impl runs them on tokio's
/// blocking pool, so a busy database never stalls the runtime. Clones share
/// the same connection.
#[derive(Debug, Clone)]
pub struct SqliteInventory {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Arc<Mutex<Connection>>,
}

const UNIT_COLUMNS: &str =
    "id, location, distance, estimated_time, battery, status, reservation_id, token_digest, reserved_at";

const TRIP_COLUMNS: &str =
    "id, unit_id, reservation_id, reserved_at, started_at, ended_at, elapsed_secs";

impl SqliteInventory {
    /// Open or create an inventory database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening inventory at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the map keep reading while another client books
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::initialize_schema(&mut conn)?;

        info!("Inventory opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory inventory, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&mut conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("inventory connection lock poisoned"))
    }

    /// Add a unit, or refresh the descriptive fields of an existing one.
    ///
    /// Status and reservation of an existing unit are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn provision(&self, unit: &Unit) -> Result<()> {
        self.conn()?.execute(
            r"
            INSERT INTO units (id, location, distance, estimated_time, battery, status)
            VALUES (?1, ?2, ?3, ?4, ?5, 'available')
            ON CONFLICT(id) DO UPDATE SET
                location = excluded.location,
                distance = excluded.distance,
                estimated_time = excluded.estimated_time,
                battery = excluded.battery,
                updated_at = datetime('now')
            ",
            params![
                unit.id,
                unit.location,
                unit.distance,
                unit.estimated_time,
                unit.battery,
            ],
        )?;
        debug!("Provisioned unit {}", unit.id);
        Ok(())
    }

    /// All units, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn units(&self) -> Result<Vec<Unit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {UNIT_COLUMNS} FROM units ORDER BY id"))?;
        let units = stmt
            .query_map([], Self::row_to_unit)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(units)
    }

    /// A single unit by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unit(&self, unit_id: &str) -> Result<Option<Unit>> {
        let unit = self
            .conn()?
            .query_row(
                &format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = ?1"),
                [unit_id],
                Self::row_to_unit,
            )
            .optional()?;
        Ok(unit)
    }

    /// Apply a conditional update.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn apply(&self, update: &StatusUpdate) -> Result<bool> {
        let reservation_id = update.reservation.map(|r| r.id.to_string());
        let reserved_at = update.reservation.map(|r| timestamp(r.created_at));
        let expected_reservation = update.expected_reservation.map(|id| id.to_string());

        let affected = self.conn()?.execute(
            r"
            UPDATE units
            SET status = ?1, reservation_id = ?2, token_digest = ?3, reserved_at = ?4,
                updated_at = datetime('now')
            WHERE id = ?5 AND status = ?6 AND reservation_id IS ?7
            ",
            params![
                update.status.as_str(),
                reservation_id,
                update.token_digest,
                reserved_at,
                update.unit_id,
                update.expected_status.as_str(),
                expected_reservation,
            ],
        )?;

        debug!(
            "Unit {} {} -> {}: {}",
            update.unit_id,
            update.expected_status,
            update.status,
            if affected > 0 { "applied" } else { "stale" }
        );
        Ok(affected > 0)
    }

    /// Release holds created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn release_holds_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn()?.execute(
            r"
            UPDATE units
            SET status = 'available', reservation_id = NULL, token_digest = NULL,
                reserved_at = NULL, updated_at = datetime('now')
            WHERE status = 'reserved' AND reserved_at < ?1
            ",
            [timestamp(cutoff)],
        )?;

        if affected > 0 {
            info!("Released {} expired holds", affected);
        }
        Ok(affected)
    }

    /// Insert a trip record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_trip(&self, trip: &Trip) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO trips (unit_id, reservation_id, reserved_at, started_at, ended_at, elapsed_secs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                trip.unit_id,
                trip.reservation_id.to_string(),
                timestamp(trip.reserved_at),
                timestamp(trip.started_at),
                timestamp(trip.ended_at),
                i64::try_from(trip.elapsed_secs).unwrap_or(i64::MAX),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Archived trip {} for unit {}", id, trip.unit_id);
        Ok(id)
    }

    /// The most recently finished trips.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_trips(&self, limit: usize) -> Result<Vec<Trip>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips ORDER BY ended_at DESC, id DESC LIMIT ?1"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let trips = stmt
            .query_map([limit_i64], Self::row_to_trip)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(trips)
    }

    /// Get inventory statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<InventoryStats> {
        let conn = self.conn()?;
        let mut stats = InventoryStats::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM units GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (status, count) in counts {
            match UnitStatus::parse(&status) {
                Some(UnitStatus::Available) => stats.available = count,
                Some(UnitStatus::Reserved) => stats.reserved = count,
                Some(UnitStatus::InUse) => stats.in_use = count,
                None => {}
            }
            stats.total_units += count;
        }

        let (trips, ride_secs): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(elapsed_secs), 0) FROM trips",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_trips = trips;
        stats.total_ride_secs = u64::try_from(ride_secs).unwrap_or(0);

        stats.db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(stats)
    }

    /// Run a blocking store call on the blocking thread pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteInventory) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(&this))
            .await
            .map_err(|e| Error::internal(format!("inventory task failed: {e}")))?
    }

    /// Convert a database row to a Unit.
    fn row_to_unit(row: &rusqlite::Row) -> rusqlite::Result<Unit> {
        let status_str: String = row.get(5)?;
        let status = UnitStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unknown unit status: {status_str}").into(),
            )
        })?;

        let reservation_id: Option<String> = row.get(6)?;
        let reserved_at: Option<String> = row.get(8)?;

        Ok(Unit {
            id: row.get(0)?,
            location: row.get(1)?,
            distance: row.get(2)?,
            estimated_time: row.get(3)?,
            battery: row.get(4)?,
            status,
            reservation_id: reservation_id
                .as_deref()
                .map(|s| parse_uuid(6, s))
                .transpose()?,
            token_digest: row.get(7)?,
            reserved_at: reserved_at
                .as_deref()
                .map(|s| parse_timestamp(8, s))
                .transpose()?,
        })
    }

    /// Convert a database row to a Trip.
    fn row_to_trip(row: &rusqlite::Row) -> rusqlite::Result<Trip> {
        let reservation_id: String = row.get(2)?;
        let reserved_at: String = row.get(3)?;
        let started_at: String = row.get(4)?;
        let ended_at: String = row.get(5)?;
        let elapsed_secs: i64 = row.get(6)?;

        Ok(Trip {
            id: Some(row.get(0)?),
            unit_id: row.get(1)?,
            reservation_id: parse_uuid(2, &reservation_id)?,
            reserved_at: parse_timestamp(3, &reserved_at)?,
            started_at: parse_timestamp(4, &started_at)?,
            ended_at: parse_timestamp(5, &ended_at)?,
            elapsed_secs: u64::try_from(elapsed_secs).unwrap_or(0),
        })
    }
}

#[async_trait]
impl Inventory for SqliteInventory {
    async fn list_units(&self) -> Result<Vec<Unit>> {
        self.blocking(Self::units).await
    }

    async fn get_unit(&self, unit_id: &str) -> Result<Option<Unit>> {
        let unit_id = unit_id.to_string();
        self.blocking(move |inventory| inventory.unit(&unit_id)).await
    }

    async fn compare_and_set(&self, update: &StatusUpdate) -> Result<bool> {
        let update = update.clone();
        self.blocking(move |inventory| inventory.apply(&update)).await
    }

    async fn release_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.blocking(move |inventory| inventory.release_holds_before(cutoff))
            .await
    }

    async fn archive_trip(&self, trip: &Trip) -> Result<i64> {
        let trip = trip.clone();
        self.blocking(move |inventory| inventory.insert_trip(&trip)).await
    }
}

/// Statistics about the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct InventoryStats {
    /// Number of provisioned units.
    pub total_units: i64,
    /// Units free to book.
    pub available: i64,
    /// Units held but not yet proven.
    pub reserved: i64,
    /// Units currently ridden.
    pub in_use: i64,
    /// Archived trips.
    pub total_trips: i64,
    /// Sum of archived trip durations.
    pub total_ride_secs: u64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Fixed-width UTC timestamps so stored values compare lexically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
