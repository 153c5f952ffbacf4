//! Document visibility monitor

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, EventKind, EventTarget, HostEvent, Registration};
use crate::host::{Platform, VisibilityState};
use crate::logging::DebugLog;
use crate::state::{lock, SharedState};
use crate::{lizz_debug, lizz_info, lizz_warn};

/// Tracks whether the document is visible.
///
/// A hidden tab suspends activity crediting. Returning to the tab refreshes the
/// activity clock.
pub struct TabVisibilityMonitor {
    state: SharedState,
    events: EventBus,
    platform: Arc<dyn Platform>,
    log: DebugLog,
    run: Mutex<Option<(CancellationToken, Registration)>>,
}

impl TabVisibilityMonitor {
    pub fn new(state: SharedState, events: EventBus, platform: Arc<dyn Platform>) -> Self {
        let log = state.lock().log();
        Self {
            state,
            events,
            platform,
            log,
            run: Mutex::new(None),
        }
    }

    /// Read the initial visibility and follow changes; false if the host
    /// exposes no visibility signal, in which case the tab stays visible.
    pub fn init(&self) -> bool {
        let mut run = lock(&self.run);
        if run.is_some() {
            return true;
        }

        let Some(initial) = self.platform.visibility_state() else {
            lizz_warn!(self.log, "Page Visibility API not supported");
            return false;
        };

        let token = CancellationToken::new();
        apply_visibility(&self.state, &token, initial, self.log);

        let state = self.state.clone();
        let platform = Arc::clone(&self.platform);
        let handler_token = token.clone();
        let log = self.log;
        let registration = self.events.add_listener(
            EventTarget::Document,
            EventKind::VisibilityChange,
            Arc::new(move |_: &HostEvent| {
                if let Some(visibility) = platform.visibility_state() {
                    apply_visibility(&state, &handler_token, visibility, log);
                }
            }),
        );

        *run = Some((token, registration));
        lizz_info!(self.log, "TabVisibilityMonitor initialized");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    /// Detach the `visibilitychange` listener; later changes are ignored
    pub fn stop(&self) {
        let Some((token, registration)) = lock(&self.run).take() else {
            return;
        };
        token.cancel();
        self.events.remove_listener(registration);
        lizz_info!(self.log, "TabVisibilityMonitor stopped");
    }
}

fn apply_visibility(
    state: &SharedState,
    token: &CancellationToken,
    visibility: VisibilityState,
    log: DebugLog,
) {
    let mut state = state.lock();
    if token.is_cancelled() {
        return;
    }

    let visible = visibility == VisibilityState::Visible;
    state.set_tab_visible(visible);
    if visible {
        // Returning to the tab counts as activity
        state.touch_activity();
    }
    lizz_debug!(log, "Tab visibility: {}", if visible { "visible" } else { "hidden" });
}
