//! Viewport visibility monitor
//!
//! Observes tracked elements at three intersection thresholds (0, the configured
//! visibility threshold, and 1) and folds every delivered record into the owning
//! section's metrics.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::host::{Element, ElementHandle, IntersectionEntry, IntersectionObserver, Platform};
use crate::logging::DebugLog;
use crate::state::{lock, SharedState};
use crate::types::SectionUpdate;
use crate::{lizz_debug, lizz_error, lizz_info, lizz_warn};

/// Observer plus the element → section id table it feeds.
///
/// Both live behind one lock so teardown clears them together.
#[derive(Default)]
struct Observation {
    observer: Option<Box<dyn IntersectionObserver>>,
    tracked: HashMap<ElementHandle, String>,
}

pub struct VisibilityMonitor {
    state: SharedState,
    platform: Arc<dyn Platform>,
    threshold: f64,
    log: DebugLog,
    observation: Mutex<Observation>,
}

impl VisibilityMonitor {
    pub fn new(state: SharedState, platform: Arc<dyn Platform>) -> Self {
        let (threshold, log) = {
            let guard = state.lock();
            (guard.config().visibility_threshold(), guard.log())
        };

        Self {
            state,
            platform,
            threshold,
            log,
            observation: Mutex::new(Observation::default()),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Intersection ratios the observer reports at
    pub fn thresholds(&self) -> [f64; 3] {
        [0.0, self.threshold, 1.0]
    }

    /// Create the observer; false if the host has no intersection support
    pub fn init(&self) -> bool {
        let mut observation = lock(&self.observation);
        if observation.observer.is_some() {
            return true;
        }

        match self.platform.create_intersection_observer(&self.thresholds()) {
            Some(observer) => {
                observation.observer = Some(observer);
                lizz_info!(
                    self.log,
                    "VisibilityMonitor initialized with threshold: {}",
                    self.threshold
                );
                true
            }
            None => {
                lizz_warn!(self.log, "IntersectionObserver not supported");
                false
            }
        }
    }

    pub fn is_observing(&self) -> bool {
        lock(&self.observation).observer.is_some()
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.observation).tracked.len()
    }

    pub fn section_id_for(&self, handle: ElementHandle) -> Option<String> {
        lock(&self.observation).tracked.get(&handle).cloned()
    }

    /// Assign section ids and start observing; returns how many elements were placed
    /// under observation.
    ///
    /// An element already under observation keeps the id it was first given.
    pub fn track_elements(&self, elements: &[Element]) -> usize {
        let mut guard = lock(&self.observation);
        let Observation { observer, tracked } = &mut *guard;
        let Some(observer) = observer.as_mut() else {
            lizz_error!(self.log, "VisibilityMonitor not initialized");
            return 0;
        };

        let mut state = self.state.lock();
        let mut placed = 0;
        for (index, element) in elements.iter().enumerate() {
            if tracked.contains_key(&element.handle) {
                continue;
            }

            let section_id = element.section_id(index);
            observer.observe(element.handle);
            state.upsert_section(&section_id, SectionUpdate::default());
            lizz_debug!(self.log, "Tracking visibility for section: {}", section_id);
            tracked.insert(element.handle, section_id);
            placed += 1;
        }
        placed
    }

    /// Stop observing one element and drop its section entry
    pub fn untrack_element(&self, handle: ElementHandle) -> bool {
        let mut guard = lock(&self.observation);
        let Observation { observer, tracked } = &mut *guard;
        let Some(section_id) = tracked.remove(&handle) else {
            return false;
        };

        if let Some(observer) = observer.as_mut() {
            observer.unobserve(handle);
        }

        // Several elements may resolve to the same section id
        if !tracked.values().any(|id| *id == section_id) {
            self.state.lock().remove_section(&section_id);
        }
        lizz_debug!(self.log, "Stopped tracking section: {}", section_id);
        true
    }

    /// Fold a batch of intersection records into section metrics.
    ///
    /// Returns the number of records applied. Records for unknown elements, or
    /// arriving after `stop()`, are ignored.
    pub fn handle_intersections(&self, entries: &[IntersectionEntry]) -> usize {
        let observation = lock(&self.observation);
        if observation.observer.is_none() {
            return 0;
        }

        let mut state = self.state.lock();
        let mut applied = 0;
        for entry in entries {
            let Some(section_id) = observation.tracked.get(&entry.target) else {
                continue;
            };
            let Some(existing) = state.section(section_id) else {
                continue;
            };
            let (previous_average, samples, previous_depth) = (
                existing.visibility_average,
                existing.visibility_samples,
                existing.max_scroll_depth_percent,
            );

            let ratio = entry.intersection_ratio.clamp(0.0, 1.0);
            let visible = ratio >= self.threshold;
            let depth = scroll_depth_percent(entry);

            state.upsert_section(
                section_id,
                SectionUpdate {
                    currently_visible: Some(visible),
                    visibility_average: Some(blend_visibility(previous_average, samples, ratio)),
                    max_scroll_depth_percent: Some(previous_depth.max(depth)),
                    last_seen_at: Some(Utc::now()),
                    visibility_samples: Some(samples.saturating_add(1)),
                    ..Default::default()
                },
            );

            lizz_debug!(
                self.log,
                "Section {}: visible={}, ratio={:.2}, depth={}%",
                section_id,
                visible,
                ratio,
                depth
            );
            applied += 1;
        }
        applied
    }

    /// Disconnect the observer and forget every element
    pub fn stop(&self) {
        let mut observation = lock(&self.observation);
        if let Some(mut observer) = observation.observer.take() {
            observer.disconnect();
        }
        observation.tracked.clear();
        lizz_info!(self.log, "VisibilityMonitor stopped");
    }
}

/// Two-term visibility blend.
///
/// The first sample sets the average; every later sample averages the previous
/// average with the new ratio, so recent samples outweigh older ones.
pub fn blend_visibility(previous_average: f64, samples: u32, ratio: f64) -> f64 {
    if samples == 0 {
        ratio
    } else {
        (previous_average + ratio) / 2.0
    }
}

/// Percentage (0-100, rounded) of the element's height inside the viewport
pub fn scroll_depth_percent(entry: &IntersectionEntry) -> f64 {
    let Some(root) = entry.root_bounds else {
        return 0.0;
    };

    let rect = entry.bounding_client_rect;
    let height = rect.height();
    if height <= 0.0 {
        return 0.0;
    }

    let visible_height = rect.bottom.min(root.bottom) - rect.top.max(root.top);
    ((visible_height / height) * 100.0).clamp(0.0, 100.0).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LizzConfig;
    use crate::host::Rect;
    use crate::state::TrackingState;
    use crate::test_support::{entry, section_element, FakePlatform};
    use pretty_assertions::assert_eq;

    fn monitor_with(platform: FakePlatform) -> (VisibilityMonitor, SharedState, Arc<FakePlatform>) {
        let state = SharedState::new(TrackingState::new(LizzConfig::new("site")));
        let platform = Arc::new(platform);
        let monitor = VisibilityMonitor::new(state.clone(), platform.clone());
        (monitor, state, platform)
    }

    fn tracked_monitor() -> (VisibilityMonitor, SharedState, Arc<FakePlatform>) {
        let (monitor, state, platform) = monitor_with(FakePlatform::new());
        assert!(monitor.init());
        monitor.track_elements(&[section_element(1, "hero"), section_element(2, "faq")]);
        (monitor, state, platform)
    }

    #[test]
    fn test_init_registers_three_thresholds() {
        let (monitor, _state, platform) = monitor_with(FakePlatform::new());
        assert!(monitor.init());
        assert_eq!(platform.observer_log.lock().unwrap().thresholds, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_init_fails_gracefully_without_support() {
        let (monitor, _state, _platform) =
            monitor_with(FakePlatform::new().without_intersection_observer());
        assert!(!monitor.init());
        assert!(!monitor.is_observing());
        assert_eq!(monitor.track_elements(&[section_element(1, "hero")]), 0);
    }

    #[test]
    fn test_track_elements_creates_entries_and_observes() {
        let (monitor, state, platform) = tracked_monitor();

        assert_eq!(monitor.tracked_count(), 2);
        assert_eq!(platform.observed().len(), 2);
        assert!(state.lock().section("hero").is_some());
        assert!(state.lock().section("faq").is_some());
        assert_eq!(monitor.section_id_for(ElementHandle(1)).as_deref(), Some("hero"));
    }

    #[test]
    fn test_identifier_fixed_for_observation_lifetime() {
        let (monitor, _state, _platform) = tracked_monitor();
        let renamed = section_element(1, "renamed");
        assert_eq!(monitor.track_elements(&[renamed]), 0);
        assert_eq!(monitor.section_id_for(ElementHandle(1)).as_deref(), Some("hero"));
    }

    #[test]
    fn test_intersection_sets_visibility_and_depth() {
        let (monitor, state, _platform) = tracked_monitor();

        assert_eq!(monitor.handle_intersections(&[entry(1, 0.8, 160.0)]), 1);

        let state = state.lock();
        let hero = state.section("hero").unwrap();
        assert!(hero.currently_visible);
        assert_eq!(hero.visibility_average, 0.8);
        assert_eq!(hero.max_scroll_depth_percent, 80.0);
        assert_eq!(hero.visibility_samples, 1);
    }

    #[test]
    fn test_below_threshold_is_not_visible() {
        let (monitor, state, _platform) = tracked_monitor();
        monitor.handle_intersections(&[entry(1, 0.49, 98.0)]);
        assert!(!state.lock().section("hero").unwrap().currently_visible);
    }

    #[test]
    fn test_two_term_blend() {
        let (monitor, state, _platform) = tracked_monitor();

        monitor.handle_intersections(&[entry(1, 0.0, 0.0)]);
        monitor.handle_intersections(&[entry(1, 0.8, 160.0)]);
        monitor.handle_intersections(&[entry(1, 1.0, 200.0)]);

        // 0.0 -> (0.0 + 0.8) / 2 = 0.4 -> (0.4 + 1.0) / 2 = 0.7
        let average = state.lock().section("hero").unwrap().visibility_average;
        assert!((average - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_max_depth_never_decreases() {
        let (monitor, state, _platform) = tracked_monitor();
        let mut previous = 0.0;

        for visible_px in [40.0, 180.0, 20.0, 100.0, 200.0, 0.0] {
            monitor.handle_intersections(&[entry(1, visible_px / 200.0, visible_px)]);
            let depth = state.lock().section("hero").unwrap().max_scroll_depth_percent;
            assert!(depth >= previous);
            previous = depth;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_unknown_elements_ignored() {
        let (monitor, state, _platform) = tracked_monitor();
        assert_eq!(monitor.handle_intersections(&[entry(99, 1.0, 200.0)]), 0);
        assert_eq!(state.lock().section_count(), 2);
    }

    #[test]
    fn test_records_after_stop_are_noops() {
        let (monitor, state, platform) = tracked_monitor();
        monitor.stop();

        assert_eq!(monitor.handle_intersections(&[entry(1, 1.0, 200.0)]), 0);
        assert!(!state.lock().section("hero").unwrap().currently_visible);
        assert_eq!(monitor.tracked_count(), 0);
        assert!(platform.observer_log.lock().unwrap().disconnected);
    }

    #[test]
    fn test_untrack_removes_entry() {
        let (monitor, state, platform) = tracked_monitor();

        assert!(monitor.untrack_element(ElementHandle(1)));
        assert!(!monitor.untrack_element(ElementHandle(1)));
        assert!(state.lock().section("hero").is_none());
        assert!(!platform.observed().contains(&ElementHandle(1)));
        assert_eq!(monitor.handle_intersections(&[entry(1, 1.0, 200.0)]), 0);
    }

    #[test]
    fn test_scroll_depth_without_root_bounds() {
        let mut record = entry(1, 1.0, 200.0);
        record.root_bounds = None;
        assert_eq!(scroll_depth_percent(&record), 0.0);
    }

    #[test]
    fn test_scroll_depth_of_collapsed_element() {
        let record = IntersectionEntry {
            target: ElementHandle(1),
            intersection_ratio: 0.0,
            bounding_client_rect: Rect::new(100.0, 100.0),
            root_bounds: Some(Rect::new(0.0, 800.0)),
        };
        assert_eq!(scroll_depth_percent(&record), 0.0);
    }

    #[test]
    fn test_scroll_depth_element_taller_than_viewport() {
        let record = IntersectionEntry {
            target: ElementHandle(1),
            intersection_ratio: 0.5,
            bounding_client_rect: Rect::new(-400.0, 1200.0),
            root_bounds: Some(Rect::new(0.0, 800.0)),
        };
        assert_eq!(scroll_depth_percent(&record), 50.0);
    }

    #[test]
    fn test_custom_threshold() {
        let state = SharedState::new(TrackingState::new(
            LizzConfig::new("site").with_visibility_threshold(0.9),
        ));
        let monitor = VisibilityMonitor::new(state.clone(), Arc::new(FakePlatform::new()));
        assert!(monitor.init());
        monitor.track_elements(&[section_element(1, "hero")]);

        monitor.handle_intersections(&[entry(1, 0.8, 160.0)]);
        assert!(!state.lock().section("hero").unwrap().currently_visible);
        assert_eq!(monitor.thresholds(), [0.0, 0.9, 1.0]);
    }
}
