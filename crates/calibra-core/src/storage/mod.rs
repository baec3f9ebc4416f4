mod config;
pub mod database;
mod file;
mod memory;
pub mod migrations;
pub mod records;

pub use config::{CalibrationConfig, Config, StorageBackend, StorageConfig};
pub use database::ProfileDb;
pub use file::ProfileFile;
pub use memory::MemoryProfileStore;
pub use records::{Versioned, PREVIEW_SCHEMA_VERSION, PROFILE_SCHEMA_VERSION};

use std::path::PathBuf;

use crate::calibration::BiasProfile;
use crate::error::ConfigError;

/// Persistence for bias profiles, scoped per organization.
///
/// Implementations never fail outward: an unreadable store reads as empty
/// and a failed write leaves the previous state in place.
pub trait ProfileRepository {
    /// Discard every profile of `organization_id` and store `profiles`.
    ///
    /// Profiles belonging to other organizations are ignored.
    fn replace_all(&self, organization_id: &str, profiles: &[BiasProfile]);

    fn get_for_user(&self, organization_id: &str, user_id: &str) -> Vec<BiasProfile>;

    /// Number of replaces applied to `organization_id` so far.
    fn generation(&self, organization_id: &str) -> u64;

    /// Replace only if the generation still equals `expected`.
    fn replace_all_if_generation(
        &self,
        organization_id: &str,
        expected: u64,
        profiles: &[BiasProfile],
    ) -> bool;
}

impl<T: ProfileRepository + ?Sized> ProfileRepository for Box<T> {
    fn replace_all(&self, organization_id: &str, profiles: &[BiasProfile]) {
        (**self).replace_all(organization_id, profiles)
    }

    fn get_for_user(&self, organization_id: &str, user_id: &str) -> Vec<BiasProfile> {
        (**self).get_for_user(organization_id, user_id)
    }

    fn generation(&self, organization_id: &str) -> u64 {
        (**self).generation(organization_id)
    }

    fn replace_all_if_generation(
        &self,
        organization_id: &str,
        expected: u64,
        profiles: &[BiasProfile],
    ) -> bool {
        (**self).replace_all_if_generation(organization_id, expected, profiles)
    }
}

/// Profiles of `profiles` that belong to `organization_id`, normalized.
fn scoped(organization_id: &str, profiles: &[BiasProfile]) -> Vec<BiasProfile> {
    let kept: Vec<BiasProfile> = profiles
        .iter()
        .filter(|p| p.organization_id == organization_id)
        .cloned()
        .map(BiasProfile::normalized)
        .collect();
    if kept.len() != profiles.len() {
        tracing::warn!(
            organization_id,
            dropped = profiles.len() - kept.len(),
            "ignoring profiles of other organizations"
        );
    }
    kept
}

/// Returns `~/.config/calibra[-dev]/`, or `CALIBRA_DATA_DIR` when set.
///
/// Set CALIBRA_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("CALIBRA_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("CALIBRA_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("calibra-dev")
            } else {
                base_dir.join("calibra")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
