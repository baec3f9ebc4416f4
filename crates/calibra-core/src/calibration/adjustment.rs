//! Estimate adjustment from stored bias profiles.
//!
//! A preview blends every profile that applies to the estimate's context,
//! weighting each by its sample size, and rounds the result to the quarter
//! hour.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::profile::{BiasProfile, Confidence, ContextType, GLOBAL_CONTEXT_KEY};
use crate::storage::ProfileRepository;
use crate::task::EstimateContext;

/// Blended samples below this force a neutral factor.
pub const MIN_BLENDED_SAMPLES: u32 = 8;
/// Adjusted estimates are multiples of this many minutes.
pub const ROUNDING_STEP_MINUTES: u32 = 15;

const NOT_ENOUGH_DATA: &str = "Not enough historical data yet";

/// Settings the engine reads from the settings service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    pub enable_estimate_calibration: bool,
    pub estimation_require_approval: bool,
    pub estimation_approval_threshold: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            enable_estimate_calibration: true,
            estimation_require_approval: false,
            estimation_approval_threshold: 1.3,
        }
    }
}

/// Calibrated view of a single estimate. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentPreview {
    pub estimated_minutes: f64,
    pub adjusted_minutes: f64,
    pub bias_factor_used: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub explanation: String,
    pub requires_approval: bool,
}

impl AdjustmentPreview {
    /// Preview that leaves the estimate untouched.
    pub fn passthrough(estimate_minutes: f64) -> Self {
        Self {
            estimated_minutes: estimate_minutes,
            adjusted_minutes: estimate_minutes,
            bias_factor_used: 1.0,
            confidence: Confidence::Low,
            sample_size: 0,
            explanation: NOT_ENOUGH_DATA.to_string(),
            requires_approval: false,
        }
    }
}

/// Result of blending candidate profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    pub factor: f64,
    pub samples: u32,
    pub confidence: Confidence,
}

impl Blend {
    const NEUTRAL: Blend = Blend {
        factor: 1.0,
        samples: 0,
        confidence: Confidence::Low,
    };
}

/// Profiles from `profiles` that apply to `context`.
///
/// Global first, then project, stage and one per distinct context tag.
pub fn select_candidates<'a>(
    profiles: &'a [BiasProfile],
    context: &EstimateContext,
) -> Vec<&'a BiasProfile> {
    let find = |ty: ContextType, key: &str| profiles.iter().find(|p| p.matches(ty, key));

    let mut candidates = Vec::new();
    candidates.extend(find(ContextType::Global, GLOBAL_CONTEXT_KEY));
    if let Some(project) = context.project_id.as_deref() {
        candidates.extend(find(ContextType::Project, project));
    }
    if let Some(status) = context.status.as_deref() {
        candidates.extend(find(ContextType::Stage, status));
    }
    let mut seen: Vec<&str> = Vec::new();
    for tag in &context.tags {
        if seen.contains(&tag.as_str()) {
            continue;
        }
        seen.push(tag);
        candidates.extend(find(ContextType::Tag, tag));
    }
    candidates
}

/// Sample-size weighted blend of the candidates.
pub fn blend(candidates: &[&BiasProfile]) -> Blend {
    let samples: u32 = candidates.iter().map(|p| p.sample_size).sum();
    if candidates.is_empty() || samples == 0 {
        return Blend::NEUTRAL;
    }
    let weighted: f64 = candidates
        .iter()
        .map(|p| p.bias_factor * p.sample_size as f64)
        .sum();
    let confidence = candidates
        .iter()
        .map(|p| p.confidence)
        .max()
        .unwrap_or_default();

    Blend {
        factor: weighted / samples as f64,
        samples,
        confidence,
    }
}

/// `estimate × factor` rounded to the nearest step, never below one step.
pub fn round_adjusted(estimate_minutes: f64, factor: f64) -> f64 {
    let step = ROUNDING_STEP_MINUTES as f64;
    let steps = (estimate_minutes * factor / step).round();
    let minutes = if steps.is_finite() { steps * step } else { 0.0 };
    minutes.max(step)
}

fn explanation(factor: f64, samples: u32) -> String {
    if samples < MIN_BLENDED_SAMPLES {
        return NOT_ENOUGH_DATA.to_string();
    }
    let percent = ((factor - 1.0) * 100.0).round() as i64;
    format!("Adjusted by {percent:+}% based on {samples} completed estimates")
}

/// Produces adjustment previews against a profile repository.
pub struct AdjustmentEngine<'a, R: ProfileRepository + ?Sized> {
    repository: &'a R,
    settings: CalibrationSettings,
}

impl<'a, R: ProfileRepository + ?Sized> AdjustmentEngine<'a, R> {
    pub fn new(repository: &'a R, settings: CalibrationSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Calibrate `estimate_minutes` for `user_id` in `context`.
    pub fn preview(
        &self,
        organization_id: &str,
        user_id: &str,
        estimate_minutes: f64,
        context: &EstimateContext,
    ) -> AdjustmentPreview {
        let estimable = estimate_minutes.is_finite() && estimate_minutes > 0.0;
        if !self.settings.enable_estimate_calibration || !estimable {
            return AdjustmentPreview::passthrough(estimate_minutes);
        }

        let profiles = self.repository.get_for_user(organization_id, user_id);
        let candidates = select_candidates(&profiles, context);
        let Blend {
            mut factor,
            samples,
            confidence,
        } = blend(&candidates);

        if samples < MIN_BLENDED_SAMPLES {
            factor = 1.0;
        }

        let requires_approval = self.settings.estimation_require_approval
            && confidence != Confidence::Low
            && factor >= self.settings.estimation_approval_threshold;

        debug!(
            organization_id,
            user_id,
            estimate_minutes,
            candidates = candidates.len(),
            factor,
            samples,
            "computed adjustment preview"
        );

        AdjustmentPreview {
            estimated_minutes: estimate_minutes,
            adjusted_minutes: round_adjusted(estimate_minutes, factor),
            bias_factor_used: factor,
            confidence,
            sample_size: samples,
            explanation: explanation(factor, samples),
            requires_approval,
        }
    }
}
