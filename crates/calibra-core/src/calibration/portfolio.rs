//! Portfolio-level estimate inflation reporting.

use serde::{Deserialize, Serialize};

use super::adjustment::AdjustmentEngine;
use crate::storage::ProfileRepository;
use crate::task::{Project, TaskRecord};

/// CSV column order.
pub const CSV_HEADER: [&str; 6] = [
    "Project",
    "Estimated",
    "Adjusted",
    "Delta",
    "Inflation factor",
    "Task count",
];

/// Raw versus calibrated totals for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRow {
    pub project_id: String,
    pub project_name: String,
    pub estimated_minutes: f64,
    pub adjusted_minutes: f64,
    pub delta_minutes: f64,
    pub inflation_factor: f64,
    pub task_count: usize,
}

/// One row per project, in the order given.
pub fn risk_rows<R: ProfileRepository + ?Sized>(
    engine: &AdjustmentEngine<'_, R>,
    organization_id: &str,
    projects: &[Project],
    tasks: &[TaskRecord],
) -> Vec<RiskRow> {
    projects
        .iter()
        .map(|project| {
            let mut estimated = 0.0;
            let mut adjusted = 0.0;
            let mut task_count = 0;

            let in_scope = tasks.iter().filter(|t| {
                !t.deleted
                    && t.organization_id == organization_id
                    && t.project_id.as_deref() == Some(project.id.as_str())
            });
            for task in in_scope {
                let Some(estimate) = task.positive_estimate() else {
                    continue;
                };
                let preview = engine.preview(
                    organization_id,
                    task.estimator().unwrap_or_default(),
                    estimate,
                    &task.context(),
                );
                estimated += estimate;
                adjusted += preview.adjusted_minutes;
                task_count += 1;
            }

            let inflation_factor = if estimated > 0.0 {
                adjusted / estimated
            } else {
                1.0
            };

            RiskRow {
                project_id: project.id.clone(),
                project_name: project.name.clone(),
                estimated_minutes: estimated,
                adjusted_minutes: adjusted,
                delta_minutes: adjusted - estimated,
                inflation_factor,
                task_count,
            }
        })
        .collect()
}

/// Render rows as CSV. Field values are written verbatim.
pub fn export_csv(rows: &[RiskRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADER.join(","));
    for row in rows {
        lines.push(
            [
                row.project_name.clone(),
                row.estimated_minutes.to_string(),
                row.adjusted_minutes.to_string(),
                row.delta_minutes.to_string(),
                format!("{:.2}", row.inflation_factor),
                row.task_count.to_string(),
            ]
            .join(","),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationSettings;
    use crate::storage::MemoryProfileStore;
    use chrono::Utc;

    fn task(id: &str, project: &str, estimate: Option<f64>, deleted: bool) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            organization_id: "org".to_string(),
            project_id: Some(project.to_string()),
            status: "todo".to_string(),
            tags: vec![],
            estimate_minutes: estimate,
            estimate_provided_by: Some("alice".to_string()),
            created_by: None,
            actual_minutes: None,
            time_logged_ms: None,
            completed_at: None,
            updated_at: Utc::now(),
            deleted,
        }
    }

    #[test]
    fn test_rows_skip_deleted_and_unestimated_tasks() {
        let store = MemoryProfileStore::new();
        let engine = AdjustmentEngine::new(&store, CalibrationSettings::default());
        let projects = vec![Project::new("p1", "Website"), Project::new("p2", "Empty")];
        let tasks = vec![
            task("a", "p1", Some(60.0), false),
            task("b", "p1", Some(30.0), true),
            task("c", "p1", None, false),
            task("e", "p1", Some(-30.0), false),
            task("d", "p3", Some(90.0), false),
        ];

        let rows = risk_rows(&engine, "org", &projects, &tasks);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].task_count, 1);
        assert_eq!(rows[0].estimated_minutes, 60.0);
        assert_eq!(rows[0].adjusted_minutes, 60.0);
        assert_eq!(rows[0].delta_minutes, 0.0);

        assert_eq!(rows[1].task_count, 0);
        assert_eq!(rows[1].inflation_factor, 1.0);
    }

    #[test]
    fn test_export_csv_layout() {
        let rows = vec![RiskRow {
            project_id: "p1".to_string(),
            project_name: "Website".to_string(),
            estimated_minutes: 300.0,
            adjusted_minutes: 315.0,
            delta_minutes: 15.0,
            inflation_factor: 1.05,
            task_count: 2,
        }];
        assert_eq!(
            export_csv(&rows),
            "Project,Estimated,Adjusted,Delta,Inflation factor,Task count\nWebsite,300,315,15,1.05,2"
        );
        assert_eq!(export_csv(&[]), CSV_HEADER.join(","));
    }

    #[test]
    fn test_fractional_estimates_keep_raw_total() {
        let store = MemoryProfileStore::new();
        let engine = AdjustmentEngine::new(&store, CalibrationSettings::default());
        let projects = vec![Project::new("p1", "Website")];
        let tasks = vec![task("a", "p1", Some(22.5), false), task("b", "p1", Some(7.5), false)];

        let rows = risk_rows(&engine, "org", &projects, &tasks);
        assert_eq!(rows[0].estimated_minutes, 30.0);
        assert_eq!(rows[0].adjusted_minutes, 45.0);
        assert_eq!(
            export_csv(&rows).lines().nth(1),
            Some("Website,30,45,15,1.50,2")
        );
    }
}
