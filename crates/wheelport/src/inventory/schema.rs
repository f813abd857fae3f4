//! `SQLite` schema definitions for the inventory store.

/// SQL statement to create the units table.
///
/// The `CHECK` constraints keep status and reservation fields consistent:
/// an available unit holds nothing, a held unit always names its
/// reservation, and a unit in use always carries a token digest.
pub const CREATE_UNITS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS units (
    id TEXT PRIMARY KEY,
    location TEXT NOT NULL,
    distance TEXT NOT NULL,
    estimated_time TEXT,
    battery INTEGER NOT NULL CHECK (battery BETWEEN 0 AND 100),
    status TEXT NOT NULL CHECK (status IN ('available', 'reserved', 'in_use')),
    reservation_id TEXT,
    token_digest TEXT,
    reserved_at TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (status != 'available' OR (reservation_id IS NULL AND token_digest IS NULL)),
    CHECK (status = 'available' OR reservation_id IS NOT NULL),
    CHECK (status != 'in_use' OR token_digest IS NOT NULL)
)
";

/// SQL statement to create an index on status for availability queries.
pub const CREATE_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_units_status ON units(status)
";

/// SQL statement to create the trips archive table.
pub const CREATE_TRIPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_id TEXT NOT NULL,
    reservation_id TEXT NOT NULL UNIQUE,
    reserved_at TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    elapsed_secs INTEGER NOT NULL
)
";

/// SQL statement to create an index on trip end time for history queries.
pub const CREATE_TRIPS_ENDED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_trips_ended_at ON trips(ended_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_UNITS_TABLE,
    CREATE_STATUS_INDEX,
    CREATE_TRIPS_TABLE,
    CREATE_TRIPS_ENDED_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_units_table_contains_required_columns() {
        assert!(CREATE_UNITS_TABLE.contains("id TEXT PRIMARY KEY"));
        assert!(CREATE_UNITS_TABLE.contains("battery INTEGER NOT NULL"));
        assert!(CREATE_UNITS_TABLE.contains("status TEXT NOT NULL"));
        assert!(CREATE_UNITS_TABLE.contains("reservation_id TEXT"));
        assert!(CREATE_UNITS_TABLE.contains("token_digest TEXT"));
    }

    #[test]
    fn test_trips_table_structure() {
        assert!(CREATE_TRIPS_TABLE.contains("reservation_id TEXT NOT NULL UNIQUE"));
        assert!(CREATE_TRIPS_TABLE.contains("elapsed_secs INTEGER NOT NULL"));
    }
}
