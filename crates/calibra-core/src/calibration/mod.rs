//! Estimation calibration engine.
//!
//! Learns how each estimator's historical estimates diverge from actual time
//! spent, per global/project/stage/tag context, and applies that bias to new
//! estimates, done-transition approval and portfolio risk reporting.
//!
//! - [`ProfileComputer`]: task snapshot → bias profiles
//! - [`AdjustmentEngine`]: raw estimate + context → [`AdjustmentPreview`]
//! - [`ApprovalGate`]: done-transition policy check
//! - [`risk_rows`] / [`export_csv`]: portfolio inflation report
//! - [`CalibrationService`]: all of the above over a
//!   [`ProfileRepository`](crate::storage::ProfileRepository)

mod adjustment;
mod approval;
mod computer;
mod portfolio;
mod profile;
mod service;
mod summary;

pub use adjustment::{
    blend, round_adjusted, select_candidates, AdjustmentEngine, AdjustmentPreview, Blend,
    CalibrationSettings, MIN_BLENDED_SAMPLES, ROUNDING_STEP_MINUTES,
};
pub use approval::ApprovalGate;
pub use computer::{
    population_variance, recency_weight, trend_delta, weighted_median, ProfileComputer,
    WindowOrder, GLOBAL_WINDOW_SIZE, MIN_PARTITION_SIZE,
};
pub use portfolio::{export_csv, risk_rows, RiskRow, CSV_HEADER};
pub use profile::{
    clamp_factor, BiasProfile, Confidence, ContextType, GLOBAL_CONTEXT_KEY, MAX_BIAS_FACTOR,
    MIN_BIAS_FACTOR,
};
pub use service::{CalibrationService, Clock, FixedClock, SystemClock};
pub use summary::{correction_suggestion, render_profile_summary};
