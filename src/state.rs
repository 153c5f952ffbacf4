//! Shared tracking state
//!
//! One [`TrackingState`] exists per engine instance. Monitors and the scheduler
//! receive the same [`SharedState`] handle at construction and touch section
//! metrics only through the accessors defined here.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::LizzConfig;
use crate::logging::DebugLog;
use crate::types::{SectionMetric, SectionUpdate};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session identity, page identity and per-section metrics
#[derive(Debug)]
pub struct TrackingState {
    config: LizzConfig,
    log: DebugLog,
    initialized: bool,
    tracking: bool,
    session_id: String,
    page_id: String,
    tab_visible: bool,
    last_activity_at: Instant,
    sections: BTreeMap<String, SectionMetric>,
}

impl TrackingState {
    pub fn new(config: LizzConfig) -> Self {
        let log = DebugLog::new(config.debug);
        Self {
            config,
            log,
            initialized: false,
            tracking: false,
            session_id: Uuid::new_v4().to_string(),
            page_id: String::new(),
            tab_visible: true,
            last_activity_at: Instant::now(),
            sections: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &LizzConfig {
        &self.config
    }

    pub fn site_id(&self) -> &str {
        &self.config.site_id
    }

    pub fn log(&self) -> DebugLog {
        self.log
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn set_page_id(&mut self, page_id: impl Into<String>) {
        self.page_id = page_id.into();
    }

    pub fn is_tab_visible(&self) -> bool {
        self.tab_visible
    }

    pub fn set_tab_visible(&mut self, visible: bool) {
        self.tab_visible = visible;
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Refresh the activity clock; never moves it backwards
    pub fn touch_activity(&mut self) {
        self.last_activity_at = self.last_activity_at.max(Instant::now());
    }

    pub fn section(&self, section_id: &str) -> Option<&SectionMetric> {
        self.sections.get(section_id)
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionMetric> {
        self.sections.values()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Create a default entry if absent, then shallow-merge `update` into it
    pub fn upsert_section(&mut self, section_id: &str, update: SectionUpdate) {
        self.sections
            .entry(section_id.to_string())
            .or_insert_with(|| SectionMetric::new(section_id, Utc::now()))
            .merge(update);
    }

    pub fn remove_section(&mut self, section_id: &str) -> Option<SectionMetric> {
        self.sections.remove(section_id)
    }

    pub fn clear_sections(&mut self) {
        self.sections.clear();
    }
}

/// Cloneable handle to the instance's single [`TrackingState`]
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<TrackingState>>);

impl SharedState {
    pub fn new(state: TrackingState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn lock(&self) -> MutexGuard<'_, TrackingState> {
        lock(&self.0)
    }
}
