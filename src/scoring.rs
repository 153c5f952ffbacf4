//! Attention Quality Score
//!
//! Pure scoring functions shared by the snapshot builder and the CLI. Weights and
//! the saturation constant are fixed contract values.

/// Active time at which the time component saturates
pub const SAT_SATURATION_SECONDS: f64 = 30.0;

const SAT_WEIGHT: f64 = 0.4;
const VISIBILITY_WEIGHT: f64 = 0.3;
const COMPLETION_WEIGHT: f64 = 0.3;

/// Compute the Attention Quality Score (0-100)
///
/// Formula:
/// ```text
/// sat   = min(sat_seconds / 30, 1)
/// score = round(clamp(0.4 * sat + 0.3 * visibility_avg + 0.3 * completion_rate, 0, 1) * 100)
/// ```
pub fn attention_score(sat_seconds: f64, visibility_avg: f64, completion_rate: f64) -> u8 {
    let normalized_sat = (sat_seconds / SAT_SATURATION_SECONDS).min(1.0);
    let weighted = normalized_sat * SAT_WEIGHT
        + visibility_avg * VISIBILITY_WEIGHT
        + completion_rate * COMPLETION_WEIGHT;

    if weighted.is_nan() {
        return 0;
    }
    (weighted.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
