use std::path::PathBuf;

use calibra_core::task::{load_projects, load_tasks};
use calibra_core::Config;
use clap::Subcommand;

use super::{open_service, print_json, require_id, CliResult};

#[derive(Subcommand)]
pub enum ReportAction {
    /// Raw versus calibrated estimate totals per project
    Risk {
        #[arg(long)]
        org: String,
        /// JSON project list (array or {"projects": [...]})
        #[arg(long)]
        projects: PathBuf,
        /// JSON task snapshot
        #[arg(long)]
        tasks: PathBuf,
        /// Emit CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },
}

pub fn run(action: ReportAction) -> CliResult {
    let config = Config::load()?;
    let service = open_service(&config)?;

    match action {
        ReportAction::Risk {
            org,
            projects,
            tasks,
            csv,
        } => {
            let org = require_id("org", &org)?;
            let projects = load_projects(&projects)?;
            let tasks = load_tasks(&tasks)?;
            let rows = service.get_portfolio_risk_rows(org, &projects, &tasks);
            if csv {
                println!("{}", service.export_portfolio_csv(&rows));
            } else {
                print_json(&rows)?;
            }
        }
    }
    Ok(())
}
