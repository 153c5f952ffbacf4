//! Engine configuration
//!
//! Configuration is supplied once at construction. Optional tunables fall back to
//! their defaults when absent or zero.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LizzError;

/// Default production collector
pub const DEFAULT_ENDPOINT: &str = "https://api.lizz.io/v1/attention";

/// Endpoint scheme that turns every delivery into an immediate no-op success
pub const DEMO_SCHEME: &str = "demo://";

pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_ACTIVITY_WINDOW_MS: u64 = 1_000;
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.5;

/// Data attribute carrying an explicit section identifier
pub const SECTION_ATTRIBUTE: &str = "data-lizz-section";

/// Selector used by `track_page` when none is given
pub const DEFAULT_SECTIONS_SELECTOR: &str = "[data-lizz-section]";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LizzConfig {
    /// Site identifier sent with every delivery
    pub site_id: String,
    /// Enables all logging
    #[serde(default)]
    pub debug: bool,
    /// Period of the snapshot timer in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_interval_ms: Option<u64>,
    /// Activity tick interval and credit quantum in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_window_ms: Option<u64>,
    /// Intersection ratio at which a section counts as visible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_threshold: Option<f64>,
    /// Collector URL, or a `demo://` value for test mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl LizzConfig {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            debug: false,
            snapshot_interval_ms: None,
            activity_window_ms: None,
            visibility_threshold: None,
            endpoint: None,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_snapshot_interval_ms(mut self, ms: u64) -> Self {
        self.snapshot_interval_ms = Some(ms);
        self
    }

    pub fn with_activity_window_ms(mut self, ms: u64) -> Self {
        self.activity_window_ms = Some(ms);
        self
    }

    pub fn with_visibility_threshold(mut self, threshold: f64) -> Self {
        self.visibility_threshold = Some(threshold);
        self
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, LizzError> {
        let config: LizzConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields that make an instance unusable
    pub fn validate(&self) -> Result<(), LizzError> {
        if self.site_id.trim().is_empty() {
            return Err(LizzError::MissingSiteId);
        }

        if let Some(threshold) = self.visibility_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(LizzError::InvalidConfig(format!(
                    "visibilityThreshold must be within [0, 1], got {threshold}"
                )));
            }
        }

        Ok(())
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(non_zero_or(
            self.snapshot_interval_ms,
            DEFAULT_SNAPSHOT_INTERVAL_MS,
        ))
    }

    pub fn activity_window(&self) -> Duration {
        Duration::from_millis(self.activity_window_ms_resolved())
    }

    pub(crate) fn activity_window_ms_resolved(&self) -> u64 {
        non_zero_or(self.activity_window_ms, DEFAULT_ACTIVITY_WINDOW_MS)
    }

    pub fn visibility_threshold(&self) -> f64 {
        match self.visibility_threshold {
            Some(threshold) if threshold > 0.0 => threshold,
            _ => DEFAULT_VISIBILITY_THRESHOLD,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => DEFAULT_ENDPOINT,
        }
    }

    pub fn is_demo_mode(&self) -> bool {
        self.endpoint().starts_with(DEMO_SCHEME)
    }
}

fn non_zero_or(value: Option<u64>, default: u64) -> u64 {
    match value {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

/// Options for `Lizz::track_page`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPageOptions {
    /// Page identifier; defaults to the host's location path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    /// Selector for trackable elements; defaults to [`DEFAULT_SECTIONS_SELECTOR`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections_selector: Option<String>,
}

impl TrackPageOptions {
    pub fn with_page_id(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.sections_selector = Some(selector.into());
        self
    }

    pub fn selector(&self) -> &str {
        match self.sections_selector.as_deref() {
            Some(selector) if !selector.is_empty() => selector,
            _ => DEFAULT_SECTIONS_SELECTOR,
        }
    }
}
