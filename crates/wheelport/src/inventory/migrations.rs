//! Schema versioning for the inventory database.
//!
//! The base schema is created idempotently from [`SCHEMA_STATEMENTS`]; later
//! changes are listed in [`MIGRATIONS`] and applied in order inside one
//! transaction, so a half-migrated database is never left behind.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// One step in the schema history.
#[derive(Debug)]
pub struct Migration {
    /// Version the database is at after this step.
    pub version: i32,
    /// Short human-readable summary.
    pub description: &'static str,
    /// Statements to execute.
    pub statements: &'static [&'static str],
}

/// Every migration, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "units, trips and metadata tables",
    // Created by SCHEMA_STATEMENTS
    statements: &[],
}];

/// The version a fully migrated database reports.
#[must_use]
pub fn current_version() -> i32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Initialize the database schema and bring it to the current version.
///
/// # Errors
///
/// Returns an error if schema creation or migration fails, or if the
/// database was written by a newer version of wheelport.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    let target = current_version();
    if version > target {
        return Err(Error::DatabaseMigration {
            message: format!("database schema version {version} is newer than supported {target}"),
        });
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > version) {
        info!(
            "Applying inventory migration {}: {}",
            migration.version, migration.description
        );
        for statement in migration.statements {
            tx.execute(statement, [])?;
        }
        set_schema_version(&tx, migration.version)?;
    }
    tx.commit()?;

    Ok(())
}

/// Get the current schema version from the database, 0 on a fresh database.
pub(crate) fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        None => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}
