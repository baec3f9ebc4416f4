//! Versioned records at the serialization boundary.
//!
//! Everything written outside the process carries a `schema_version`.
//! Readers accept every version up to the current one and upgrade in place
//! on the next write; a newer version than the reader knows reads as empty.

use serde::{Deserialize, Serialize};

use crate::calibration::{AdjustmentPreview, BiasProfile};

/// Schema version of persisted and exported bias profiles.
///
/// Version 0 is the unversioned bare-array layout.
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Schema version of exported adjustment previews.
pub const PREVIEW_SCHEMA_VERSION: u32 = 1;

/// Payload tagged with the schema version it was written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub schema_version: u32,
    pub data: T,
}

impl Versioned<Vec<BiasProfile>> {
    pub fn profiles(profiles: Vec<BiasProfile>) -> Self {
        Self {
            schema_version: PROFILE_SCHEMA_VERSION,
            data: profiles,
        }
    }
}

impl Versioned<AdjustmentPreview> {
    pub fn preview(preview: AdjustmentPreview) -> Self {
        Self {
            schema_version: PREVIEW_SCHEMA_VERSION,
            data: preview,
        }
    }
}
