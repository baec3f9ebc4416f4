pub mod config;
pub mod estimate;
pub mod profiles;
pub mod report;

use calibra_core::error::{CoreError, ValidationError};
use calibra_core::{
    CalibrationService, Config, ProfileDb, ProfileFile, ProfileRepository, StorageBackend,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Service over the configured profile store.
pub fn open_service(
    config: &Config,
) -> Result<CalibrationService<Box<dyn ProfileRepository>>, Box<dyn std::error::Error>> {
    tracing::debug!(backend = ?config.storage.backend, "opening profile store");
    let repository: Box<dyn ProfileRepository> = match config.storage.backend {
        StorageBackend::Sqlite => Box::new(ProfileDb::open()?),
        StorageBackend::Json => Box::new(ProfileFile::open()?),
    };
    Ok(CalibrationService::new(repository, config.calibration.settings())
        .with_window_order(config.calibration.window_order))
}

/// Reject blank identifiers before they reach the engine.
pub fn require_id<'a>(field: &str, value: &'a str) -> Result<&'a str, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        }
        .into());
    }
    Ok(trimmed)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
