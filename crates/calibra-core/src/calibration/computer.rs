//! Profile computation from a snapshot of historical task records.
//!
//! For every estimator in an organization this produces one global profile
//! (from the most recent window of completed work) plus project, stage and
//! tag profiles for every partition with enough history behind it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::profile::{
    clamp_factor, round_to, BiasProfile, Confidence, ContextType, GLOBAL_CONTEXT_KEY,
    MAX_BIAS_FACTOR, MIN_BIAS_FACTOR,
};
use crate::task::TaskRecord;

/// Maximum number of records in a user's global window.
pub const GLOBAL_WINDOW_SIZE: usize = 40;
/// Minimum records a project/stage/tag partition needs to get a profile.
pub const MIN_PARTITION_SIZE: usize = 5;
/// Age at which recency weight bottoms out.
pub const RECENCY_HORIZON_DAYS: f64 = 180.0;
/// Floor for the recency weight.
pub const MIN_RECENCY_WEIGHT: f64 = 0.2;

/// How a user's records are ordered before windowing and trend splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowOrder {
    /// Stable sort by completion timestamp, oldest first.
    Chronological,
    /// Keep the snapshot order as given.
    InputOrder,
}

impl Default for WindowOrder {
    fn default() -> Self {
        WindowOrder::Chronological
    }
}

/// One clamped ratio observation.
#[derive(Debug, Clone, Copy)]
struct Observation {
    ratio: f64,
    weight: f64,
    completed_at: DateTime<Utc>,
}

/// Computes bias profiles for an organization.
#[derive(Debug, Clone, Default)]
pub struct ProfileComputer {
    pub window_order: WindowOrder,
}

impl ProfileComputer {
    pub fn new(window_order: WindowOrder) -> Self {
        Self { window_order }
    }

    /// Compute the full profile set for `organization_id` as of `now`.
    ///
    /// Output is ordered by user, then global/project/stage/tag, then key.
    pub fn compute_profiles(
        &self,
        tasks: &[TaskRecord],
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<BiasProfile> {
        let mut by_user: BTreeMap<&str, Vec<&TaskRecord>> = BTreeMap::new();
        for task in tasks {
            if task.organization_id != organization_id || !task.is_calibratable() {
                continue;
            }
            if let Some(user) = task.estimator() {
                by_user.entry(user).or_default().push(task);
            }
        }

        let mut profiles = Vec::new();
        for (user_id, mut records) in by_user {
            if self.window_order == WindowOrder::Chronological {
                records.sort_by_key(|t| t.completion_timestamp());
            }

            let window_start = records.len().saturating_sub(GLOBAL_WINDOW_SIZE);
            let global = observations(&records[window_start..], now);
            if let Some(profile) = build_profile(
                organization_id,
                user_id,
                ContextType::Global,
                GLOBAL_CONTEXT_KEY,
                &global,
                now,
            ) {
                profiles.push(profile);
            }

            for (context_type, partitions) in partition(&records) {
                for (key, members) in partitions {
                    if members.len() < MIN_PARTITION_SIZE {
                        continue;
                    }
                    let obs = observations(&members, now);
                    if let Some(profile) =
                        build_profile(organization_id, user_id, context_type, key, &obs, now)
                    {
                        profiles.push(profile);
                    }
                }
            }
        }

        profiles
    }
}

/// Split a user's records by project, stage and tag, preserving order.
fn partition<'a>(
    records: &[&'a TaskRecord],
) -> [(ContextType, BTreeMap<&'a str, Vec<&'a TaskRecord>>); 3] {
    let mut projects: BTreeMap<&str, Vec<&TaskRecord>> = BTreeMap::new();
    let mut stages: BTreeMap<&str, Vec<&TaskRecord>> = BTreeMap::new();
    let mut tags: BTreeMap<&str, Vec<&TaskRecord>> = BTreeMap::new();

    for &task in records {
        if let Some(project) = task.project_id.as_deref().filter(|p| !p.is_empty()) {
            projects.entry(project).or_default().push(task);
        }
        stages.entry(task.status.as_str()).or_default().push(task);
        let mut seen: Vec<&str> = Vec::with_capacity(task.tags.len());
        for tag in &task.tags {
            if tag.is_empty() || seen.contains(&tag.as_str()) {
                continue;
            }
            seen.push(tag);
            tags.entry(tag.as_str()).or_default().push(task);
        }
    }

    [
        (ContextType::Project, projects),
        (ContextType::Stage, stages),
        (ContextType::Tag, tags),
    ]
}

fn observations(records: &[&TaskRecord], now: DateTime<Utc>) -> Vec<Observation> {
    records
        .iter()
        .filter_map(|task| {
            let estimate = task.positive_estimate()?;
            let actual = task.actual_duration_minutes()?;
            let completed_at = task.completion_timestamp();
            Some(Observation {
                ratio: (actual / estimate).clamp(MIN_BIAS_FACTOR, MAX_BIAS_FACTOR),
                weight: recency_weight(completed_at, now),
                completed_at,
            })
        })
        .collect()
}

fn build_profile(
    organization_id: &str,
    user_id: &str,
    context_type: ContextType,
    context_key: &str,
    obs: &[Observation],
    now: DateTime<Utc>,
) -> Option<BiasProfile> {
    let first = obs.first()?;
    let last = obs.last()?;

    let ratios: Vec<f64> = obs.iter().map(|o| o.ratio).collect();
    let weighted: Vec<(f64, f64)> = obs.iter().map(|o| (o.ratio, o.weight)).collect();

    let sample_size = obs.len() as u32;
    let variance_score = round_to(population_variance(&ratios), 4);

    Some(BiasProfile {
        id: BiasProfile::profile_id(organization_id, user_id, context_type, context_key),
        organization_id: organization_id.to_string(),
        user_id: user_id.to_string(),
        context_type,
        context_key: context_key.to_string(),
        bias_factor: clamp_factor(weighted_median(&weighted)),
        confidence: Confidence::from_samples(sample_size, variance_score),
        sample_size,
        variance_score,
        trend_delta: round_to(trend_delta(&ratios), 3),
        window_start: first.completed_at,
        window_end: last.completed_at,
        updated_at: now,
    })
}

/// Linear decay over the horizon, floored at [`MIN_RECENCY_WEIGHT`].
pub fn recency_weight(completed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = ((now - completed_at).num_milliseconds() as f64 / 86_400_000.0).max(0.0);
    (1.0 - age_days / RECENCY_HORIZON_DAYS).max(MIN_RECENCY_WEIGHT)
}

/// First value (ascending) at which cumulative weight reaches half the total.
///
/// Returns 1.0 for an empty input.
pub fn weighted_median(values: &[(f64, f64)]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = sorted.iter().map(|(_, w)| w).sum();
    let half = total / 2.0;
    let mut running = 0.0;
    for (value, weight) in &sorted {
        running += weight;
        if running >= half {
            return *value;
        }
    }
    sorted.last().map(|(v, _)| *v).unwrap_or(1.0)
}

/// Unweighted population variance; 0 for an empty input.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Mean of the later half minus mean of the earlier half, split by position.
pub fn trend_delta(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let (earlier, later) = values.split_at(values.len() / 2);
    mean(later) - mean(earlier)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
