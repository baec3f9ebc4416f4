//! Bias profile records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lower bound for any observed ratio or bias factor.
pub const MIN_BIAS_FACTOR: f64 = 0.5;
/// Upper bound for any observed ratio or bias factor.
pub const MAX_BIAS_FACTOR: f64 = 2.5;

/// Context key used by every global profile.
pub const GLOBAL_CONTEXT_KEY: &str = "global";

/// Scope a bias profile applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Global,
    Project,
    Stage,
    Tag,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Global => "global",
            ContextType::Project => "project",
            ContextType::Stage => "stage",
            ContextType::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(ContextType::Global),
            "project" => Some(ContextType::Project),
            "stage" => Some(ContextType::Stage),
            "tag" => Some(ContextType::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reliability tier of a profile. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Tier for a sample of `sample_size` ratios with the given variance.
    ///
    /// This is the only way a confidence is ever produced.
    pub fn from_samples(sample_size: u32, variance_score: f64) -> Self {
        if sample_size < 8 {
            Confidence::Low
        } else if sample_size >= 30 && variance_score <= 0.18 {
            Confidence::High
        } else if sample_size >= 15 && variance_score <= 0.35 {
            Confidence::Medium
        } else if sample_size >= 20 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Low
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learned estimate bias for one user in one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasProfile {
    pub id: Uuid,
    pub organization_id: String,
    pub user_id: String,
    pub context_type: ContextType,
    pub context_key: String,
    /// Multiplier from estimate to actual, within `[0.5, 2.5]`.
    pub bias_factor: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    /// Population variance of the observed ratios.
    pub variance_score: f64,
    /// Later-half mean ratio minus earlier-half mean ratio.
    pub trend_delta: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BiasProfile {
    /// Deterministic id for a `(organization, user, context)` key.
    pub fn profile_id(
        organization_id: &str,
        user_id: &str,
        context_type: ContextType,
        context_key: &str,
    ) -> Uuid {
        let name = format!("{organization_id}\u{1f}{user_id}\u{1f}{context_type}\u{1f}{context_key}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    /// Re-derive confidence and re-clamp the bias factor.
    ///
    /// Repositories apply this to everything they load so that externally
    /// edited state cannot break the profile invariants.
    pub fn normalized(mut self) -> Self {
        self.bias_factor = clamp_factor(self.bias_factor);
        self.confidence = Confidence::from_samples(self.sample_size, self.variance_score);
        self
    }

    /// Whether this profile applies to the given context type and key.
    pub fn matches(&self, context_type: ContextType, context_key: &str) -> bool {
        self.context_type == context_type && self.context_key == context_key
    }
}

/// Clamp into `[MIN_BIAS_FACTOR, MAX_BIAS_FACTOR]`; NaN maps to neutral.
pub fn clamp_factor(value: f64) -> f64 {
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(MIN_BIAS_FACTOR, MAX_BIAS_FACTOR)
}

/// Round to a fixed number of decimals.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
