//! Database schema migrations for the profile database.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: flat bias profile collection.
///
/// One row per `(organization_id, user_id, context_type, context_key)`.
/// Confidence is not stored; it is derived from sample size and variance
/// when rows are read.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS bias_profiles (
            id              TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            context_type    TEXT NOT NULL,
            context_key     TEXT NOT NULL,
            bias_factor     REAL NOT NULL,
            sample_size     INTEGER NOT NULL,
            variance_score  REAL NOT NULL,
            trend_delta     REAL NOT NULL,
            window_start    TEXT NOT NULL,
            window_end      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE (organization_id, user_id, context_type, context_key)
        );

        CREATE INDEX IF NOT EXISTS idx_bias_profiles_org_user
            ON bias_profiles(organization_id, user_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: per-organization replace generation counter.
///
/// Organizations that already have profiles start at generation 1.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS profile_generations (
            organization_id TEXT PRIMARY KEY,
            generation      INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO profile_generations (organization_id, generation)
            SELECT DISTINCT organization_id, 1 FROM bias_profiles;",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
