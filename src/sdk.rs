//! Engine facade
//!
//! [`Lizz`] owns the shared tracking state and wires the monitors, the
//! scheduler and the transport together. The host feeds it events through
//! [`Lizz::dispatch`] and intersection records through
//! [`Lizz::handle_intersections`]; everything else happens on the tokio
//! runtime that was current when the instance was created.

use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

use crate::config::{LizzConfig, TrackPageOptions};
use crate::error::LizzError;
use crate::events::{EventBus, EventKind, EventTarget};
use crate::host::{ElementHandle, IntersectionEntry, Platform};
use crate::logging::DebugLog;
use crate::monitors::{ActivityMonitor, TabVisibilityMonitor, VisibilityMonitor};
use crate::scheduler::Scheduler;
use crate::snapshot::{section_snapshots, ScoreMode};
use crate::state::{lock, SharedState, TrackingState};
use crate::transport::Transport;
use crate::types::{SectionMetric, SectionSnapshot};
use crate::{lizz_error, lizz_info, lizz_warn};

/// Attention tracking engine for one page context
pub struct Lizz {
    state: SharedState,
    platform: Arc<dyn Platform>,
    events: EventBus,
    visibility: VisibilityMonitor,
    activity: ActivityMonitor,
    tab_visibility: TabVisibilityMonitor,
    scheduler: Scheduler,
    transport: Arc<Transport>,
    runtime: Handle,
    log: DebugLog,
    // Serializes track_page and stop
    lifecycle: Mutex<()>,
}

impl Lizz {
    /// Validate `config` and build an engine bound to the current tokio runtime.
    ///
    /// Fails with [`LizzError::MissingSiteId`] for an empty site id and with
    /// [`LizzError::HostUnavailable`] when called outside a runtime.
    pub fn new(config: LizzConfig, platform: Arc<dyn Platform>) -> Result<Self, LizzError> {
        config.validate()?;
        let runtime =
            Handle::try_current().map_err(|e| LizzError::HostUnavailable(e.to_string()))?;

        let log = DebugLog::new(config.debug);
        let transport = Arc::new(Transport::new(&config, runtime.clone())?);
        let state = SharedState::new(TrackingState::new(config));
        let events = EventBus::new();

        let visibility = VisibilityMonitor::new(state.clone(), Arc::clone(&platform));
        let activity = ActivityMonitor::new(state.clone(), events.clone(), runtime.clone());
        let tab_visibility =
            TabVisibilityMonitor::new(state.clone(), events.clone(), Arc::clone(&platform));
        let scheduler = Scheduler::new(
            state.clone(),
            events.clone(),
            Arc::clone(&platform),
            Arc::clone(&transport),
            runtime.clone(),
        );

        if transport.is_demo_mode() {
            lizz_info!(log, "Demo mode enabled, no network requests will be made");
        }
        lizz_info!(log, "Lizz SDK created, session {}", state.lock().session_id());

        Ok(Self {
            state,
            platform,
            events,
            visibility,
            activity,
            tab_visibility,
            scheduler,
            transport,
            runtime,
            log,
            lifecycle: Mutex::new(()),
        })
    }

    /// Start every monitor and the scheduler
    fn init(&self) -> bool {
        if self.state.lock().is_initialized() {
            lizz_warn!(self.log, "Already initialized");
            return true;
        }

        let visibility_ok = self.visibility.init();
        let activity_ok = self.activity.init();
        let tab_visibility_ok = self.tab_visibility.init();
        let scheduler_ok = self.scheduler.init();

        if !visibility_ok {
            lizz_warn!(self.log, "Visibility monitor unavailable, sections will stay hidden");
        }
        if !tab_visibility_ok {
            lizz_warn!(self.log, "Tab visibility unavailable, assuming visible");
        }
        if !activity_ok || !scheduler_ok {
            lizz_error!(self.log, "Failed to initialize some monitors");
            self.stop_components();
            return false;
        }

        if self.log.enabled() {
            let transport = Arc::clone(&self.transport);
            self.runtime.spawn(async move {
                transport.test_connection().await;
            });
        }

        self.state.lock().set_initialized(true);
        lizz_info!(self.log, "Lizz SDK initialized");
        true
    }

    /// Start tracking every element matching the options' selector.
    ///
    /// Initializes the engine on first use. Returns false, leaving the engine
    /// untouched, when no element matches.
    pub fn track_page(&self, options: TrackPageOptions) -> bool {
        let _lifecycle = lock(&self.lifecycle);

        let selector = options.selector();
        let elements = self.platform.query_selector_all(selector);
        if elements.is_empty() {
            lizz_warn!(self.log, "No sections found with selector: {}", selector);
            return false;
        }

        if !self.state.lock().is_initialized() && !self.init() {
            return false;
        }

        let page_id = options
            .page_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.platform.location_pathname());
        self.state.lock().set_page_id(page_id.clone());

        let placed = self.visibility.track_elements(&elements);
        self.state.lock().set_tracking(true);

        lizz_info!(
            self.log,
            "Tracking {} sections on page: {} ({} newly observed)",
            elements.len(),
            page_id,
            placed
        );
        true
    }

    /// Stop all monitoring and discard the accumulated metrics.
    ///
    /// Once this returns, no monitor mutates the state again. The session id
    /// survives, and a later [`track_page`](Self::track_page) starts fresh.
    pub fn stop(&self) {
        let _lifecycle = lock(&self.lifecycle);
        let was_tracking = self.state.lock().is_tracking();

        self.stop_components();

        let mut state = self.state.lock();
        state.set_tracking(false);
        state.set_initialized(false);
        state.clear_sections();

        if was_tracking {
            lizz_info!(self.log, "Tracking stopped");
        }
    }

    fn stop_components(&self) {
        self.visibility.stop();
        self.activity.stop();
        self.tab_visibility.stop();
        self.scheduler.stop();
    }

    /// Send a snapshot now and wait for the outcome
    pub async fn flush(&self) -> bool {
        if !self.is_tracking() {
            lizz_warn!(self.log, "Not currently tracking");
            return false;
        }
        self.scheduler.flush().await
    }

    /// Current per-section summaries.
    ///
    /// The attention score is reported as 0 here; only transmitted snapshots
    /// carry the computed score.
    pub fn get_attention_data(&self) -> Vec<SectionSnapshot> {
        section_snapshots(&self.state.lock(), ScoreMode::Placeholder)
    }

    /// Copy of every section's raw metrics
    pub fn section_metrics(&self) -> Vec<SectionMetric> {
        self.state.lock().sections().cloned().collect()
    }

    pub fn is_tracking(&self) -> bool {
        self.state.lock().is_tracking()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_initialized()
    }

    pub fn is_user_active(&self) -> bool {
        self.activity.is_user_active()
    }

    pub fn get_config(&self) -> LizzConfig {
        self.state.lock().config().clone()
    }

    pub fn session_id(&self) -> String {
        self.state.lock().session_id().to_string()
    }

    pub fn page_id(&self) -> String {
        self.state.lock().page_id().to_string()
    }

    /// Deliver a host event to every listener registered for it
    pub fn dispatch(&self, target: EventTarget, kind: EventKind) -> usize {
        self.events.dispatch(target, kind)
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Deliver a batch of intersection records from the host's observer
    pub fn handle_intersections(&self, entries: &[IntersectionEntry]) -> usize {
        self.visibility.handle_intersections(entries)
    }

    /// Stop observing one element and drop its section
    pub fn untrack_element(&self, handle: ElementHandle) -> bool {
        self.visibility.untrack_element(handle)
    }

    pub fn activity(&self) -> &ActivityMonitor {
        &self.activity
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Send a terminal snapshot over the beacon path
    pub fn on_unload(&self) -> bool {
        self.scheduler.on_unload()
    }
}

impl Drop for Lizz {
    fn drop(&mut self) {
        self.stop_components();
    }
}

/// Create an engine; tracking starts with the first [`Lizz::track_page`] call
pub fn init_lizz(config: LizzConfig, platform: Arc<dyn Platform>) -> Result<Lizz, LizzError> {
    Lizz::new(config, platform)
}
