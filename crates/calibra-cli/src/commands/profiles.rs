use std::path::PathBuf;

use calibra_core::calibration::render_profile_summary;
use calibra_core::task::load_tasks;
use calibra_core::{Config, Versioned};
use clap::Subcommand;

use super::{open_service, print_json, require_id, CliResult};

#[derive(Subcommand)]
pub enum ProfilesAction {
    /// Recompute an organization's profiles from a task snapshot
    Recompute {
        /// Organization id
        #[arg(long)]
        org: String,
        /// JSON task snapshot (array or {"tasks": [...]})
        #[arg(long)]
        tasks: PathBuf,
        /// Only replace if the stored generation still equals this value
        #[arg(long)]
        expect_generation: Option<u64>,
    },
    /// List a user's stored profiles as JSON
    List {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
    },
    /// Render a user's calibration summary
    Summary {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
    },
}

pub fn run(action: ProfilesAction) -> CliResult {
    let config = Config::load()?;
    let service = open_service(&config)?;

    match action {
        ProfilesAction::Recompute {
            org,
            tasks,
            expect_generation,
        } => {
            let org = require_id("org", &org)?;
            let snapshot = load_tasks(&tasks)?;
            let profiles = match expect_generation {
                Some(expected) => service
                    .recompute_org_profiles_guarded(org, &snapshot, expected)
                    .ok_or_else(|| {
                        format!(
                            "profiles for {org} changed since generation {expected} (now {})",
                            service.profile_generation(org)
                        )
                    })?,
                None => service.recompute_org_profiles(org, &snapshot),
            };
            eprintln!(
                "Recomputed {} profiles from {} tasks (generation {})",
                profiles.len(),
                snapshot.len(),
                service.profile_generation(org)
            );
            print_json(&Versioned::profiles(profiles))?;
        }
        ProfilesAction::List { org, user } => {
            let org = require_id("org", &org)?;
            let user = require_id("user", &user)?;
            print_json(&Versioned::profiles(service.get_profiles_for_user(org, user)))?;
        }
        ProfilesAction::Summary { org, user } => {
            let org = require_id("org", &org)?;
            let user = require_id("user", &user)?;
            print!("{}", render_profile_summary(&service.get_profiles_for_user(org, user)));
        }
    }
    Ok(())
}
