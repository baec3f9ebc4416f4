//! Calibration service: the operations the task workflow and reporting
//! surfaces call.

use chrono::{DateTime, Utc};
use tracing::info;

use super::adjustment::{AdjustmentEngine, AdjustmentPreview, CalibrationSettings};
use super::approval::ApprovalGate;
use super::computer::{ProfileComputer, WindowOrder};
use super::portfolio::{self, RiskRow};
use super::profile::BiasProfile;
use crate::storage::ProfileRepository;
use crate::task::{EstimateContext, Project, TaskRecord};

/// Source of "now" for recency weighting and `updated_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Calibration engine bound to a profile repository.
pub struct CalibrationService<R: ProfileRepository> {
    repository: R,
    settings: CalibrationSettings,
    computer: ProfileComputer,
    clock: Box<dyn Clock>,
}

impl<R: ProfileRepository> CalibrationService<R> {
    pub fn new(repository: R, settings: CalibrationSettings) -> Self {
        Self {
            repository,
            settings,
            computer: ProfileComputer::default(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_window_order(mut self, window_order: WindowOrder) -> Self {
        self.computer = ProfileComputer::new(window_order);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: CalibrationSettings) {
        self.settings = settings;
    }

    fn engine(&self) -> AdjustmentEngine<'_, R> {
        AdjustmentEngine::new(&self.repository, self.settings)
    }

    /// Recompute and wholesale-replace an organization's profiles.
    ///
    /// Last write wins against concurrent recomputes.
    pub fn recompute_org_profiles(
        &self,
        organization_id: &str,
        tasks: &[TaskRecord],
    ) -> Vec<BiasProfile> {
        let profiles = self
            .computer
            .compute_profiles(tasks, organization_id, self.clock.now());
        self.repository.replace_all(organization_id, &profiles);
        info!(
            organization_id,
            tasks = tasks.len(),
            profiles = profiles.len(),
            "recomputed bias profiles"
        );
        profiles
    }

    /// Recompute, replacing only if the organization's generation is still
    /// `expected_generation`.
    ///
    /// Returns `None` when another writer got there first.
    pub fn recompute_org_profiles_guarded(
        &self,
        organization_id: &str,
        tasks: &[TaskRecord],
        expected_generation: u64,
    ) -> Option<Vec<BiasProfile>> {
        let profiles = self
            .computer
            .compute_profiles(tasks, organization_id, self.clock.now());
        if !self
            .repository
            .replace_all_if_generation(organization_id, expected_generation, &profiles)
        {
            info!(
                organization_id,
                expected_generation, "skipped stale profile recompute"
            );
            return None;
        }
        info!(
            organization_id,
            tasks = tasks.len(),
            profiles = profiles.len(),
            "recomputed bias profiles"
        );
        Some(profiles)
    }

    /// Current replace generation for an organization.
    pub fn profile_generation(&self, organization_id: &str) -> u64 {
        self.repository.generation(organization_id)
    }

    pub fn get_profiles_for_user(&self, organization_id: &str, user_id: &str) -> Vec<BiasProfile> {
        self.repository.get_for_user(organization_id, user_id)
    }

    pub fn get_adjustment_preview(
        &self,
        organization_id: &str,
        user_id: &str,
        estimate_minutes: f64,
        context: &EstimateContext,
    ) -> AdjustmentPreview {
        self.engine()
            .preview(organization_id, user_id, estimate_minutes, context)
    }

    pub fn should_require_approval_for_done(&self, task: &TaskRecord) -> bool {
        let engine = self.engine();
        ApprovalGate::new(&engine).requires_approval_for_done(task)
    }

    pub fn get_portfolio_risk_rows(
        &self,
        organization_id: &str,
        projects: &[Project],
        tasks: &[TaskRecord],
    ) -> Vec<RiskRow> {
        portfolio::risk_rows(&self.engine(), organization_id, projects, tasks)
    }

    pub fn export_portfolio_csv(&self, rows: &[RiskRow]) -> String {
        portfolio::export_csv(rows)
    }
}
