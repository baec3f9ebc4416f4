//! JSON document profile storage.
//!
//! The whole collection is one document, rewritten through a temporary file
//! and a rename so readers never observe a partial write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::records::PROFILE_SCHEMA_VERSION;
use super::{data_dir, scoped, ProfileRepository};
use crate::calibration::BiasProfile;
use crate::error::CoreError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileDocument {
    schema_version: u32,
    #[serde(default)]
    generations: BTreeMap<String, u64>,
    #[serde(default)]
    profiles: Vec<BiasProfile>,
}

/// Profile store backed by a single JSON file.
pub struct ProfileFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProfileFile {
    /// Open the store at `<data_dir>/profiles.json`.
    pub fn open() -> Result<Self, CoreError> {
        Ok(Self::with_path(data_dir()?.join("profiles.json")))
    }

    /// Create a store at a custom path. The file is created on first write.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document for a rewrite.
    ///
    /// Missing or malformed content yields an empty document. An unreadable
    /// file or a newer schema is an error: its contents must survive.
    fn read_document(&self) -> Result<ProfileDocument, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProfileDocument::default()),
            Err(e) => return Err(e.to_string()),
        };
        if content.trim().is_empty() {
            return Ok(ProfileDocument::default());
        }
        match parse_document(&content) {
            Ok(document) => Ok(document),
            Err(DocumentError::Newer(version)) => Err(format!("unsupported schema_version {version}")),
            Err(DocumentError::Malformed(reason)) => {
                warn!(path = %self.path.display(), reason = %reason, "treating profile file as empty");
                Ok(ProfileDocument::default())
            }
        }
    }

    /// Read the document; anything that cannot be used reads as empty.
    fn load(&self) -> ProfileDocument {
        self.read_document().unwrap_or_else(|reason| {
            warn!(path = %self.path.display(), reason = %reason, "treating profile file as empty");
            ProfileDocument::default()
        })
    }

    fn store(&self, mut document: ProfileDocument) -> Result<(), CoreError> {
        document.schema_version = PROFILE_SCHEMA_VERSION;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&document)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn replace_with(&self, organization_id: &str, expected: Option<u64>, profiles: &[BiasProfile]) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(reason) => {
                warn!(path = %self.path.display(), reason = %reason, "refusing to overwrite profile file");
                return false;
            }
        };
        let generation = document.generations.get(organization_id).copied().unwrap_or(0);
        if expected.is_some_and(|expected| expected != generation) {
            return false;
        }

        document.profiles.retain(|p| p.organization_id != organization_id);
        document.profiles.extend(scoped(organization_id, profiles));
        document
            .generations
            .insert(organization_id.to_string(), generation + 1);

        match self.store(document) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to write profile file");
                false
            }
        }
    }
}

enum DocumentError {
    /// Not a profile collection this or any other version writes.
    Malformed(String),
    /// Written by a newer schema.
    Newer(u64),
}

fn malformed(e: impl ToString) -> DocumentError {
    DocumentError::Malformed(e.to_string())
}

/// Decode any supported layout into the current document shape.
fn parse_document(content: &str) -> Result<ProfileDocument, DocumentError> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(malformed)?;
    match value {
        // Version 0: a bare array of profiles.
        serde_json::Value::Array(_) => {
            let profiles: Vec<BiasProfile> = serde_json::from_value(value).map_err(malformed)?;
            Ok(ProfileDocument {
                schema_version: 0,
                generations: BTreeMap::new(),
                profiles,
            })
        }
        serde_json::Value::Object(ref map) => {
            let version = map
                .get("schema_version")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| malformed("missing schema_version"))?;
            if version > PROFILE_SCHEMA_VERSION as u64 {
                return Err(DocumentError::Newer(version));
            }
            serde_json::from_value(value).map_err(malformed)
        }
        _ => Err(malformed("profile collection is not an array or document")),
    }
}

impl ProfileRepository for ProfileFile {
    fn replace_all(&self, organization_id: &str, profiles: &[BiasProfile]) {
        self.replace_with(organization_id, None, profiles);
    }

    fn get_for_user(&self, organization_id: &str, user_id: &str) -> Vec<BiasProfile> {
        self.load()
            .profiles
            .into_iter()
            .filter(|p| p.organization_id == organization_id && p.user_id == user_id)
            .map(BiasProfile::normalized)
            .collect()
    }

    fn generation(&self, organization_id: &str) -> u64 {
        self.load()
            .generations
            .get(organization_id)
            .copied()
            .unwrap_or(0)
    }

    fn replace_all_if_generation(
        &self,
        organization_id: &str,
        expected: u64,
        profiles: &[BiasProfile],
    ) -> bool {
        self.replace_with(organization_id, Some(expected), profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Confidence, ContextType};
    use chrono::Utc;
    use tempfile::TempDir;

    fn profile(org: &str, user: &str) -> BiasProfile {
        let now = Utc::now();
        BiasProfile {
            id: BiasProfile::profile_id(org, user, ContextType::Global, "global"),
            organization_id: org.to_string(),
            user_id: user.to_string(),
            context_type: ContextType::Global,
            context_key: "global".to_string(),
            bias_factor: 1.4,
            confidence: Confidence::from_samples(12, 0.05),
            sample_size: 12,
            variance_score: 0.05,
            trend_delta: 0.0,
            window_start: now,
            window_end: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = ProfileFile::with_path(dir.path().join("profiles.json"));
        assert!(store.get_for_user("org", "alice").is_empty());
        assert_eq!(store.generation("org"), 0);
    }

    #[test]
    fn test_malformed_file_reads_empty_and_is_repopulated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, r#"{"profiles": "oops"}"#).unwrap();

        let store = ProfileFile::with_path(&path);
        assert!(store.get_for_user("org", "alice").is_empty());

        store.replace_all("org", &[profile("org", "alice")]);
        assert_eq!(store.get_for_user("org", "alice").len(), 1);
    }

    #[test]
    fn test_non_collection_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "42").unwrap();
        assert!(ProfileFile::with_path(&path).get_for_user("org", "alice").is_empty());
    }

    #[test]
    fn test_legacy_array_is_read_and_upgraded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        let legacy = serde_json::to_string(&vec![profile("org", "alice"), profile("other", "bob")]).unwrap();
        std::fs::write(&path, legacy).unwrap();

        let store = ProfileFile::with_path(&path);
        assert_eq!(store.get_for_user("org", "alice").len(), 1);

        store.replace_all("org", &[]);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["schema_version"], PROFILE_SCHEMA_VERSION);
        assert_eq!(store.get_for_user("other", "bob").len(), 1);
    }

    #[test]
    fn test_future_schema_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, r#"{"schema_version": 99, "profiles": []}"#).unwrap();
        assert_eq!(ProfileFile::with_path(&path).generation("org"), 0);
    }

    #[test]
    fn test_future_schema_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        let newer = serde_json::json!({
            "schema_version": PROFILE_SCHEMA_VERSION + 1,
            "profiles": [profile("other", "bob")],
        })
        .to_string();
        std::fs::write(&path, &newer).unwrap();

        let store = ProfileFile::with_path(&path);
        store.replace_all("org", &[profile("org", "alice")]);
        assert!(!store.replace_all_if_generation("org", 0, &[profile("org", "alice")]));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), newer);
        assert!(store.get_for_user("org", "alice").is_empty());
    }

    #[test]
    fn test_guarded_replace() {
        let dir = TempDir::new().unwrap();
        let store = ProfileFile::with_path(dir.path().join("profiles.json"));
        assert!(store.replace_all_if_generation("org", 0, &[profile("org", "alice")]));
        assert!(!store.replace_all_if_generation("org", 0, &[]));
        assert_eq!(store.generation("org"), 1);
    }
}
