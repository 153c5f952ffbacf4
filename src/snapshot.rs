//! Snapshot assembly
//!
//! Turns the current tracking state into the wire payload. Sections without any
//! accumulated active time are left out entirely.

use chrono::Utc;

use crate::scoring::{attention_score, round2};
use crate::state::TrackingState;
use crate::types::{SectionMetric, SectionSnapshot, SnapshotPayload};
use crate::SDK_VERSION;

/// Whether the attention score is computed or left at zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// Transmitted snapshots carry the full score
    Computed,
    /// The in-memory read path reports a zero placeholder
    Placeholder,
}

/// Summarize one section, or `None` if it has no active time yet
pub fn section_snapshot(metric: &SectionMetric, mode: ScoreMode) -> Option<SectionSnapshot> {
    if metric.active_time_ms == 0 {
        return None;
    }

    let sat_seconds = round2(metric.active_time_ms as f64 / 1000.0);
    let completion_rate = metric.max_scroll_depth_percent / 100.0;
    let attention_score = match mode {
        ScoreMode::Computed => {
            attention_score(sat_seconds, metric.visibility_average, completion_rate)
        }
        ScoreMode::Placeholder => 0,
    };

    Some(SectionSnapshot {
        section_id: metric.section_id.clone(),
        sat_seconds,
        completion_rate,
        attention_score,
        visibility_avg: round2(metric.visibility_average),
    })
}

/// Summaries of every eligible section
pub fn section_snapshots(state: &TrackingState, mode: ScoreMode) -> Vec<SectionSnapshot> {
    state
        .sections()
        .filter_map(|metric| section_snapshot(metric, mode))
        .collect()
}

/// Build a transmitted payload as of now
pub fn build_payload(state: &TrackingState) -> SnapshotPayload {
    build_payload_at(state, Utc::now().timestamp_millis())
}

pub fn build_payload_at(state: &TrackingState, timestamp: i64) -> SnapshotPayload {
    SnapshotPayload {
        sdk_version: SDK_VERSION.to_string(),
        site_id: state.site_id().to_string(),
        page_id: state.page_id().to_string(),
        timestamp,
        session_id: state.session_id().to_string(),
        sections: section_snapshots(state, ScoreMode::Computed),
    }
}
