use std::path::PathBuf;

use calibra_core::{Config, EstimateContext, TaskRecord, Versioned};
use clap::Subcommand;

use super::{open_service, print_json, require_id, CliResult};

#[derive(Subcommand)]
pub enum EstimateAction {
    /// Preview the calibrated value of an estimate
    Preview {
        #[arg(long)]
        org: String,
        /// Estimator user id
        #[arg(long)]
        user: String,
        /// Raw estimate in minutes
        #[arg(long, allow_negative_numbers = true)]
        minutes: f64,
        #[arg(long)]
        project: Option<String>,
        /// Workflow status / stage
        #[arg(long)]
        status: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Check whether completing a task needs approval
    Gate {
        /// JSON file holding a single task record
        #[arg(long)]
        task: PathBuf,
    },
}

pub fn run(action: EstimateAction) -> CliResult {
    let config = Config::load()?;
    let service = open_service(&config)?;

    match action {
        EstimateAction::Preview {
            org,
            user,
            minutes,
            project,
            status,
            tags,
        } => {
            let org = require_id("org", &org)?;
            let user = require_id("user", &user)?;
            let context = EstimateContext {
                project_id: project,
                status,
                tags,
            };
            let preview = service.get_adjustment_preview(org, user, minutes, &context);
            print_json(&Versioned::preview(preview))?;
        }
        EstimateAction::Gate { task } => {
            let content = std::fs::read_to_string(&task)?;
            let task: TaskRecord = serde_json::from_str(&content)?;
            let requires_approval = service.should_require_approval_for_done(&task);
            print_json(&serde_json::json!({
                "task_id": task.id,
                "requires_approval": requires_approval,
            }))?;
        }
    }
    Ok(())
}
