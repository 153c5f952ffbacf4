//! User activity monitor
//!
//! Interaction events mark the user active (debounced). A fixed tick, one
//! activity window long, credits every visible section with one window of
//! active time when the user was active within the window and the tab is
//! visible, then clears the active flag.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, EventKind, EventTarget, HostEvent, Registration};
use crate::logging::DebugLog;
use crate::state::{lock, SharedState};
use crate::types::SectionUpdate;
use crate::{lizz_debug, lizz_info};

/// Quiet period before a burst of interaction events is recorded
pub const ACTIVITY_DEBOUNCE: Duration = Duration::from_millis(100);

/// Interaction events that count as user activity
const ACTIVITY_EVENTS: [(EventTarget, EventKind); 9] = [
    (EventTarget::Document, EventKind::MouseMove),
    (EventTarget::Document, EventKind::MouseDown),
    (EventTarget::Document, EventKind::Click),
    (EventTarget::Document, EventKind::Scroll),
    (EventTarget::Window, EventKind::Scroll),
    (EventTarget::Document, EventKind::KeyDown),
    (EventTarget::Document, EventKind::TouchStart),
    (EventTarget::Document, EventKind::TouchMove),
    (EventTarget::Window, EventKind::Focus),
];

/// Trailing-edge debounce on the tokio runtime
struct Debouncer {
    wait: Duration,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    fn new(wait: Duration, runtime: Handle) -> Self {
        Self {
            wait,
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// Restart the quiet period; `action` runs once it elapses uninterrupted
    fn call<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let wait = self.wait;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            action();
        }));
    }

    fn cancel(&self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.abort();
        }
    }
}

/// State touched by the handlers and the tick task
#[derive(Clone)]
struct ActivityCore {
    state: SharedState,
    active: Arc<AtomicBool>,
    window: Duration,
    window_ms: u64,
    log: DebugLog,
}

impl ActivityCore {
    fn record_activity(&self, token: &CancellationToken) {
        let mut state = self.state.lock();
        if token.is_cancelled() {
            return;
        }
        self.active.store(true, Ordering::SeqCst);
        state.touch_activity();
    }

    fn blur(&self, token: &CancellationToken) {
        let _state = self.state.lock();
        if token.is_cancelled() {
            return;
        }
        self.active.store(false, Ordering::SeqCst);
    }

    /// One activity tick; returns how many sections were credited
    fn tick(&self, token: &CancellationToken) -> usize {
        let mut state = self.state.lock();
        if token.is_cancelled() {
            return 0;
        }

        let idle = Instant::now().saturating_duration_since(state.last_activity_at());
        let within_window = idle <= self.window;
        // The flag resets every tick whether or not time was credited
        let was_active = self.active.swap(false, Ordering::SeqCst);

        if !(within_window && state.is_tab_visible() && was_active) {
            return 0;
        }

        let now = Utc::now();
        let credited: Vec<(String, u64)> = state
            .sections()
            .filter(|metric| metric.currently_visible)
            .map(|metric| {
                (
                    metric.section_id.clone(),
                    metric.active_time_ms.saturating_add(self.window_ms),
                )
            })
            .collect();

        for (section_id, active_time_ms) in &credited {
            state.upsert_section(
                section_id,
                SectionUpdate {
                    active_time_ms: Some(*active_time_ms),
                    last_seen_at: Some(now),
                    ..Default::default()
                },
            );
            lizz_debug!(self.log, "Section {}: +{}ms active", section_id, self.window_ms);
        }
        credited.len()
    }
}

async fn tick_loop(core: ActivityCore, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + core.window, core.window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                core.tick(&token);
            }
            _ = token.cancelled() => break,
        }
    }
}

/// Listeners, debounce and tick task of one run; dropped on `stop()`
struct ActivityRun {
    token: CancellationToken,
    debouncer: Arc<Debouncer>,
    ticker: JoinHandle<()>,
    registrations: Vec<Registration>,
}

pub struct ActivityMonitor {
    core: ActivityCore,
    events: EventBus,
    runtime: Handle,
    run: Mutex<Option<ActivityRun>>,
}

impl ActivityMonitor {
    pub fn new(state: SharedState, events: EventBus, runtime: Handle) -> Self {
        let (window_ms, log) = {
            let guard = state.lock();
            (guard.config().activity_window_ms_resolved(), guard.log())
        };

        Self {
            core: ActivityCore {
                state,
                active: Arc::new(AtomicBool::new(false)),
                window: Duration::from_millis(window_ms),
                window_ms,
                log,
            },
            events,
            runtime,
            run: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.core.window
    }

    /// Register the interaction listeners and start the tick task
    pub fn init(&self) -> bool {
        let mut run = lock(&self.run);
        if run.is_some() {
            return true;
        }

        let token = CancellationToken::new();
        let debouncer = Arc::new(Debouncer::new(ACTIVITY_DEBOUNCE, self.runtime.clone()));
        let mut registrations = Vec::with_capacity(ACTIVITY_EVENTS.len() + 1);

        for (target, kind) in ACTIVITY_EVENTS {
            let core = self.core.clone();
            let token = token.clone();
            let debouncer = Arc::clone(&debouncer);
            let handler = move |_: &HostEvent| {
                let core = core.clone();
                let token = token.clone();
                debouncer.call(move || core.record_activity(&token));
            };
            registrations.push(self.events.add_listener(target, kind, Arc::new(handler)));
        }

        let core = self.core.clone();
        let blur_token = token.clone();
        registrations.push(self.events.add_listener(
            EventTarget::Window,
            EventKind::Blur,
            Arc::new(move |_: &HostEvent| core.blur(&blur_token)),
        ));

        let ticker = self
            .runtime
            .spawn(tick_loop(self.core.clone(), token.clone()));

        *run = Some(ActivityRun {
            token,
            debouncer,
            ticker,
            registrations,
        });

        lizz_info!(
            self.core.log,
            "ActivityMonitor initialized with window: {}ms",
            self.core.window_ms
        );
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    pub fn is_user_active(&self) -> bool {
        self.core.active.load(Ordering::SeqCst)
    }

    /// Record activity immediately, bypassing the debounce
    pub fn record_activity(&self) {
        if let Some(run) = lock(&self.run).as_ref() {
            self.core.record_activity(&run.token);
        }
    }

    /// Run one tick now; returns how many sections were credited
    pub fn tick(&self) -> usize {
        match lock(&self.run).as_ref() {
            Some(run) => self.core.tick(&run.token),
            None => 0,
        }
    }

    /// Remove every listener and stop the tick task
    pub fn stop(&self) {
        let Some(run) = lock(&self.run).take() else {
            return;
        };

        run.token.cancel();
        run.debouncer.cancel();
        run.ticker.abort();
        for registration in run.registrations {
            self.events.remove_listener(registration);
        }
        self.core.active.store(false, Ordering::SeqCst);
        lizz_info!(self.core.log, "ActivityMonitor stopped");
    }
}
