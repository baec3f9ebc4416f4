//! Plain-text calibration summary for a user's profiles.

use super::profile::{BiasProfile, Confidence};

/// Get suggested correction message for a profile.
pub fn correction_suggestion(profile: &BiasProfile) -> String {
    let label = format!("{}:{}", profile.context_type, profile.context_key);
    let delta = profile.bias_factor - 1.0;
    if delta.abs() < 0.05 {
        format!(
            "{label}: Estimates are accurate (factor: {:.2}x)",
            profile.bias_factor
        )
    } else if delta > 0.0 {
        format!(
            "{label}: Multiply estimates by {:.2}x (tasks take ~{:.0}% longer)",
            profile.bias_factor,
            delta * 100.0
        )
    } else {
        format!(
            "{label}: Multiply estimates by {:.2}x (tasks finish ~{:.0}% faster)",
            profile.bias_factor,
            -delta * 100.0
        )
    }
}

/// Render profiles as an ASCII table followed by correction suggestions.
pub fn render_profile_summary(profiles: &[BiasProfile]) -> String {
    let mut output = String::new();
    output.push_str("\nEstimate Calibration Summary\n");
    output.push_str(&"=".repeat(80));
    output.push_str("\n\n");

    if profiles.is_empty() {
        output.push_str("No calibration data available.\n");
        return output;
    }

    output.push_str(&format!(
        "{:<8} {:<20} {:>7} {:>7} {:>9} {:>7} {:>10}\n",
        "Context", "Key", "Samples", "Factor", "Variance", "Trend", "Confidence"
    ));
    output.push_str(&"-".repeat(80));
    output.push('\n');

    for profile in profiles {
        output.push_str(&format!(
            "{:<8} {:<20} {:>7} {:>6.2}x {:>9.4} {:>+7.3} {:>10}\n",
            profile.context_type.as_str(),
            truncate(&profile.context_key, 20),
            profile.sample_size,
            profile.bias_factor,
            profile.variance_score,
            profile.trend_delta,
            profile.confidence.as_str(),
        ));
    }

    output.push_str(&"-".repeat(80));
    output.push_str("\n\n");

    output.push_str("Corrective Factors:\n");
    let mut any = false;
    for profile in profiles.iter().filter(|p| p.confidence != Confidence::Low) {
        output.push_str(&format!("  {}\n", correction_suggestion(profile)));
        any = true;
    }
    if !any {
        output.push_str("  (no profile is confident enough yet)\n");
    }

    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
