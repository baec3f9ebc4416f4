//! SQLite-backed profile storage.
//!
//! Profiles live in one flat table keyed by
//! `(organization_id, user_id, context_type, context_key)`; a replace
//! deletes and re-inserts an organization's rows in a single transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;
use uuid::Uuid;

use super::{data_dir, migrations, scoped, ProfileRepository};
use crate::calibration::{BiasProfile, Confidence, ContextType};
use crate::error::{CoreError, DatabaseError};

const SELECT_COLUMNS: &str = "id, organization_id, user_id, context_type, context_key,
     bias_factor, sample_size, variance_score, trend_delta,
     window_start, window_end, updated_at";

/// SQLite database for bias profiles.
pub struct ProfileDb {
    conn: Mutex<Connection>,
}

impl ProfileDb {
    /// Open the database at `<data_dir>/profiles.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("profiles.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    /// Replace an organization's profiles, returning the new generation.
    pub fn try_replace_all(
        &self,
        organization_id: &str,
        profiles: &[BiasProfile],
    ) -> Result<u64, DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let generation = replace_in(&tx, organization_id, profiles)?;
        tx.commit()?;
        Ok(generation)
    }

    /// Replace only when the stored generation equals `expected`.
    pub fn try_replace_all_if_generation(
        &self,
        organization_id: &str,
        expected: u64,
        profiles: &[BiasProfile],
    ) -> Result<bool, DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        if read_generation(&tx, organization_id)? != expected {
            return Ok(false);
        }
        replace_in(&tx, organization_id, profiles)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn try_get_for_user(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Vec<BiasProfile>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM bias_profiles
             WHERE organization_id = ?1 AND user_id = ?2
             ORDER BY context_type, context_key"
        ))?;
        let rows = stmt.query_map(params![organization_id, user_id], decode_row)?;
        collect_rows(rows)
    }

    /// Every profile of an organization.
    pub fn list_organization(&self, organization_id: &str) -> Result<Vec<BiasProfile>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM bias_profiles
             WHERE organization_id = ?1
             ORDER BY user_id, context_type, context_key"
        ))?;
        let rows = stmt.query_map(params![organization_id], decode_row)?;
        collect_rows(rows)
    }

    pub fn try_generation(&self, organization_id: &str) -> Result<u64, DatabaseError> {
        let conn = self.lock()?;
        read_generation(&conn, organization_id)
    }
}

fn replace_in(
    conn: &Connection,
    organization_id: &str,
    profiles: &[BiasProfile],
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM bias_profiles WHERE organization_id = ?1",
        params![organization_id],
    )?;

    {
        let mut insert = conn.prepare(
            "INSERT OR REPLACE INTO bias_profiles (
                id, organization_id, user_id, context_type, context_key,
                bias_factor, sample_size, variance_score, trend_delta,
                window_start, window_end, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for profile in scoped(organization_id, profiles) {
            insert.execute(params![
                profile.id.to_string(),
                profile.organization_id,
                profile.user_id,
                profile.context_type.as_str(),
                profile.context_key,
                profile.bias_factor,
                profile.sample_size,
                profile.variance_score,
                profile.trend_delta,
                profile.window_start.to_rfc3339(),
                profile.window_end.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
            ])?;
        }
    }

    let generation = read_generation(conn, organization_id)? + 1;
    conn.execute(
        "INSERT OR REPLACE INTO profile_generations (organization_id, generation) VALUES (?1, ?2)",
        params![organization_id, generation as i64],
    )?;
    Ok(generation)
}

fn read_generation(conn: &Connection, organization_id: &str) -> Result<u64, DatabaseError> {
    let generation: Option<i64> = conn
        .query_row(
            "SELECT generation FROM profile_generations WHERE organization_id = ?1",
            params![organization_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(generation.unwrap_or(0).max(0) as u64)
}

/// Raw row; decoding into a profile can fail independently of SQLite.
struct ProfileRow {
    id: String,
    organization_id: String,
    user_id: String,
    context_type: String,
    context_key: String,
    bias_factor: f64,
    sample_size: i64,
    variance_score: f64,
    trend_delta: f64,
    window_start: String,
    window_end: String,
    updated_at: String,
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        user_id: row.get(2)?,
        context_type: row.get(3)?,
        context_key: row.get(4)?,
        bias_factor: row.get(5)?,
        sample_size: row.get(6)?,
        variance_score: row.get(7)?,
        trend_delta: row.get(8)?,
        window_start: row.get(9)?,
        window_end: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl ProfileRow {
    fn into_profile(self) -> Option<BiasProfile> {
        Some(
            BiasProfile {
                id: Uuid::parse_str(&self.id).ok()?,
                context_type: ContextType::parse(&self.context_type)?,
                sample_size: u32::try_from(self.sample_size).ok()?,
                window_start: parse_timestamp(&self.window_start)?,
                window_end: parse_timestamp(&self.window_end)?,
                updated_at: parse_timestamp(&self.updated_at)?,
                organization_id: self.organization_id,
                user_id: self.user_id,
                context_key: self.context_key,
                bias_factor: self.bias_factor,
                confidence: Confidence::Low,
                variance_score: self.variance_score,
                trend_delta: self.trend_delta,
            }
            .normalized(),
        )
    }
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<ProfileRow>>,
) -> Result<Vec<BiasProfile>, DatabaseError> {
    let mut profiles = Vec::new();
    for row in rows {
        let row = row?;
        let id = row.id.clone();
        match row.into_profile() {
            Some(profile) => profiles.push(profile),
            None => warn!(profile_id = %id, "skipping undecodable profile row"),
        }
    }
    Ok(profiles)
}

impl ProfileRepository for ProfileDb {
    fn replace_all(&self, organization_id: &str, profiles: &[BiasProfile]) {
        if let Err(e) = self.try_replace_all(organization_id, profiles) {
            warn!(organization_id, error = %e, "failed to replace bias profiles");
        }
    }

    fn get_for_user(&self, organization_id: &str, user_id: &str) -> Vec<BiasProfile> {
        self.try_get_for_user(organization_id, user_id)
            .unwrap_or_else(|e| {
                warn!(organization_id, user_id, error = %e, "failed to read bias profiles");
                Vec::new()
            })
    }

    fn generation(&self, organization_id: &str) -> u64 {
        self.try_generation(organization_id).unwrap_or_else(|e| {
            warn!(organization_id, error = %e, "failed to read profile generation");
            0
        })
    }

    fn replace_all_if_generation(
        &self,
        organization_id: &str,
        expected: u64,
        profiles: &[BiasProfile],
    ) -> bool {
        self.try_replace_all_if_generation(organization_id, expected, profiles)
            .unwrap_or_else(|e| {
                warn!(organization_id, error = %e, "failed guarded profile replace");
                false
            })
    }
}
