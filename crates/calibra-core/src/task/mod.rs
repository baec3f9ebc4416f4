//! Historical task records as read from the external task store.
//!
//! Only the fields the calibration engine consumes are modelled. The engine
//! never mutates a record.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, ValidationError};

/// Statuses that count as finished work.
const DONE_LIKE_STATUSES: &[&str] = &["done", "completed", "complete", "closed", "resolved"];

/// A task as it exists in an organization's task store snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Workflow status, also used as the stage key.
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Raw estimate in minutes. Fractional and non-positive values are kept
    /// as given; only positive ones count.
    #[serde(default)]
    pub estimate_minutes: Option<f64>,
    /// User who supplied the estimate.
    #[serde(default)]
    pub estimate_provided_by: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub actual_minutes: Option<f64>,
    #[serde(default)]
    pub time_logged_ms: Option<u64>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl TaskRecord {
    /// Whether the status marks the task as finished.
    pub fn is_done_like(&self) -> bool {
        let status = self.status.trim();
        DONE_LIKE_STATUSES
            .iter()
            .any(|done| status.eq_ignore_ascii_case(done))
    }

    /// Positive estimate in minutes, if any.
    pub fn positive_estimate(&self) -> Option<f64> {
        self.estimate_minutes.filter(|m| m.is_finite() && *m > 0.0)
    }

    /// Actual duration in minutes: `actual_minutes`, else logged time.
    ///
    /// Returns `None` unless the derived value is strictly positive.
    pub fn actual_duration_minutes(&self) -> Option<f64> {
        let minutes = match self.actual_minutes {
            Some(m) => m,
            None => self.time_logged_ms? as f64 / 60_000.0,
        };
        (minutes.is_finite() && minutes > 0.0).then_some(minutes)
    }

    /// The user the estimate is attributed to.
    pub fn estimator(&self) -> Option<&str> {
        let present = |id: &&str| !id.trim().is_empty();
        self.estimate_provided_by
            .as_deref()
            .filter(present)
            .or_else(|| self.created_by.as_deref().filter(present))
    }

    /// Timestamp used for recency weighting and windowing.
    pub fn completion_timestamp(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.updated_at)
    }

    /// Whether this record can feed a bias profile.
    pub fn is_calibratable(&self) -> bool {
        self.is_done_like()
            && self.positive_estimate().is_some()
            && self.actual_duration_minutes().is_some()
            && self.estimator().is_some()
    }

    /// Work context this task's own estimate applies to.
    pub fn context(&self) -> EstimateContext {
        EstimateContext {
            project_id: self.project_id.clone(),
            status: Some(self.status.clone()),
            tags: self.tags.clone(),
        }
    }
}

/// Work context an estimate is entered for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateContext {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EstimateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A project as listed by the task store, used for portfolio reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Read a snapshot file holding either a bare array or `{ "<key>": [...] }`.
///
/// Item decode errors are returned unchanged.
fn load_snapshot<T: DeserializeOwned>(path: &Path, key: &str) -> Result<Vec<T>, CoreError> {
    let content = std::fs::read_to_string(path)?;
    let items = match serde_json::from_str::<serde_json::Value>(&content)? {
        serde_json::Value::Object(mut document) => {
            document.remove(key).ok_or_else(|| ValidationError::InvalidValue {
                field: key.to_string(),
                message: format!("{} has no \"{key}\" array", path.display()),
            })?
        }
        value @ serde_json::Value::Array(_) => value,
        _ => {
            return Err(ValidationError::InvalidValue {
                field: key.to_string(),
                message: format!("{} is not an array or object", path.display()),
            }
            .into())
        }
    };
    Ok(serde_json::from_value(items)?)
}

/// Read a JSON task store snapshot.
pub fn load_tasks(path: &Path) -> Result<Vec<TaskRecord>, CoreError> {
    load_snapshot(path, "tasks")
}

/// Read a JSON project list.
pub fn load_projects(path: &Path) -> Result<Vec<Project>, CoreError> {
    load_snapshot(path, "projects")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord {
            id: "t1".to_string(),
            organization_id: "org".to_string(),
            project_id: Some("p1".to_string()),
            status: "Done".to_string(),
            tags: vec!["backend".to_string()],
            estimate_minutes: Some(60.0),
            estimate_provided_by: Some("alice".to_string()),
            created_by: Some("bob".to_string()),
            actual_minutes: Some(90.0),
            time_logged_ms: None,
            completed_at: None,
            updated_at: Utc::now(),
            deleted: false,
        }
    }

    #[test]
    fn test_done_like_is_case_insensitive() {
        let mut task = record();
        assert!(task.is_done_like());
        task.status = "COMPLETED".to_string();
        assert!(task.is_done_like());
        task.status = "in_progress".to_string();
        assert!(!task.is_done_like());
    }

    #[test]
    fn test_actual_falls_back_to_logged_time() {
        let mut task = record();
        task.actual_minutes = None;
        task.time_logged_ms = Some(45 * 60_000);
        assert_eq!(task.actual_duration_minutes(), Some(45.0));

        task.time_logged_ms = Some(0);
        assert_eq!(task.actual_duration_minutes(), None);
    }

    #[test]
    fn test_estimator_falls_back_to_creator() {
        let mut task = record();
        assert_eq!(task.estimator(), Some("alice"));
        task.estimate_provided_by = None;
        assert_eq!(task.estimator(), Some("bob"));
        task.created_by = Some("  ".to_string());
        assert_eq!(task.estimator(), None);
    }

    #[test]
    fn test_calibratable_requires_positive_estimate() {
        let mut task = record();
        assert!(task.is_calibratable());
        task.estimate_minutes = Some(0.0);
        assert!(!task.is_calibratable());
        task.estimate_minutes = Some(-30.0);
        assert!(!task.is_calibratable());
        task.estimate_minutes = Some(22.5);
        assert_eq!(task.positive_estimate(), Some(22.5));
    }

    #[test]
    fn test_load_tasks_accepts_both_layouts() {
        let dir = tempfile::TempDir::new().unwrap();
        let bare = dir.path().join("bare.json");
        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&bare, serde_json::to_string(&vec![record()]).unwrap()).unwrap();
        std::fs::write(
            &wrapped,
            serde_json::json!({ "tasks": [record()] }).to_string(),
        )
        .unwrap();

        assert_eq!(load_tasks(&bare).unwrap().len(), 1);
        assert_eq!(load_tasks(&wrapped).unwrap()[0].id, "t1");
    }

    #[test]
    fn test_load_projects_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(&path, "{\"projects\": 3}").unwrap();
        assert!(matches!(load_projects(&path), Err(CoreError::Json(_))));
    }

    #[test]
    fn test_completion_timestamp_prefers_completed_at() {
        let mut task = record();
        let completed = task.updated_at - chrono::Duration::days(2);
        task.completed_at = Some(completed);
        assert_eq!(task.completion_timestamp(), completed);
    }

    #[test]
    fn test_load_tasks_keeps_fractional_and_negative_estimates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        let mut fractional = serde_json::to_value(record()).unwrap();
        fractional["id"] = serde_json::json!("t2");
        fractional["estimate_minutes"] = serde_json::json!(22.5);
        let mut negative = serde_json::to_value(record()).unwrap();
        negative["id"] = serde_json::json!("t3");
        negative["estimate_minutes"] = serde_json::json!(-30);
        std::fs::write(
            &path,
            serde_json::json!({ "tasks": [record(), fractional, negative] }).to_string(),
        )
        .unwrap();

        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1].positive_estimate(), Some(22.5));
        assert!(tasks[1].is_calibratable());
        assert_eq!(tasks[2].estimate_minutes, Some(-30.0));
        assert!(!tasks[2].is_calibratable());
    }

    #[test]
    fn test_load_tasks_names_the_bad_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        let mut bad = serde_json::to_value(record()).unwrap();
        bad["estimate_minutes"] = serde_json::json!("soon");
        std::fs::write(&path, serde_json::json!([bad]).to_string()).unwrap();

        let err = load_tasks(&path).unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
        assert!(err.to_string().contains("soon"), "{err}");
    }

    #[test]
    fn test_load_projects_requires_projects_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(&path, r#"{"tasks": [{"id": "p1", "name": "Website"}]}"#).unwrap();
        assert!(matches!(
            load_projects(&path),
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));

        std::fs::write(&path, r#"{"projects": [{"id": "p1", "name": "Website"}]}"#).unwrap();
        assert_eq!(load_projects(&path).unwrap()[0].name, "Website");
    }
}
