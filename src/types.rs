//! Core data types
//!
//! This module defines the per-section metrics held in tracking state and the
//! wire payload delivered to the collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accumulated attention metrics for one tracked section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMetric {
    /// Stable section identifier
    pub section_id: String,
    /// Section Active Time in milliseconds
    pub active_time_ms: u64,
    /// Blended viewport-intersection ratio (0-1)
    pub visibility_average: f64,
    /// Running maximum of the visible share of the section (0-100)
    pub max_scroll_depth_percent: f64,
    /// Whether the latest intersection sample crossed the visibility threshold
    pub currently_visible: bool,
    /// Time of the most recent mutation
    pub last_seen_at: DateTime<Utc>,
    /// Number of intersection samples folded into `visibility_average`
    #[serde(default)]
    pub visibility_samples: u32,
}

impl SectionMetric {
    pub fn new(section_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            section_id: section_id.into(),
            active_time_ms: 0,
            visibility_average: 0.0,
            max_scroll_depth_percent: 0.0,
            currently_visible: false,
            last_seen_at: now,
            visibility_samples: 0,
        }
    }

    /// Shallow-merge the populated fields of `update` into this metric
    pub fn merge(&mut self, update: SectionUpdate) {
        if let Some(active_time_ms) = update.active_time_ms {
            self.active_time_ms = active_time_ms;
        }
        if let Some(visibility_average) = update.visibility_average {
            self.visibility_average = visibility_average;
        }
        if let Some(max_scroll_depth_percent) = update.max_scroll_depth_percent {
            self.max_scroll_depth_percent = max_scroll_depth_percent;
        }
        if let Some(currently_visible) = update.currently_visible {
            self.currently_visible = currently_visible;
        }
        if let Some(last_seen_at) = update.last_seen_at {
            self.last_seen_at = last_seen_at;
        }
        if let Some(visibility_samples) = update.visibility_samples {
            self.visibility_samples = visibility_samples;
        }
    }
}

/// Partial update for [`SectionMetric`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionUpdate {
    pub active_time_ms: Option<u64>,
    pub visibility_average: Option<f64>,
    pub max_scroll_depth_percent: Option<f64>,
    pub currently_visible: Option<bool>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub visibility_samples: Option<u32>,
}

/// Per-section entry of a snapshot payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSnapshot {
    pub section_id: String,
    /// Section Active Time in seconds, two decimals
    pub sat_seconds: f64,
    /// Max scroll depth ratio (0-1)
    pub completion_rate: f64,
    /// Attention Quality Score (0-100)
    pub attention_score: u8,
    /// Blended visibility ratio, two decimals
    pub visibility_avg: f64,
}

/// Body of every delivery to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub sdk_version: String,
    pub site_id: String,
    pub page_id: String,
    /// Epoch milliseconds at which the snapshot was built
    pub timestamp: i64,
    pub session_id: String,
    pub sections: Vec<SectionSnapshot>,
}

impl SnapshotPayload {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
