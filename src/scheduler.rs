//! Snapshot scheduling
//!
//! A periodic task builds and sends a snapshot every snapshot interval. Page
//! teardown signals (`beforeunload`, `unload`, `pagehide`, and `visibilitychange`
//! to hidden) each trigger a terminal snapshot over the beacon path. Delivery is
//! at-least-once; the collector is expected to deduplicate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, EventKind, EventTarget, HostEvent, Registration};
use crate::host::{Platform, VisibilityState};
use crate::logging::DebugLog;
use crate::snapshot::build_payload;
use crate::state::{lock, SharedState};
use crate::transport::Transport;
use crate::types::SnapshotPayload;
use crate::{lizz_debug, lizz_info};

/// Window events that end the page
const UNLOAD_EVENTS: [EventKind; 3] = [
    EventKind::BeforeUnload,
    EventKind::Unload,
    EventKind::PageHide,
];

#[derive(Clone)]
struct SnapshotCore {
    state: SharedState,
    platform: Arc<dyn Platform>,
    transport: Arc<Transport>,
    log: DebugLog,
    periodic_sent: Arc<AtomicU64>,
}

impl SnapshotCore {
    /// Payload for the current state, or `None` if there is nothing to send
    fn build(&self, token: Option<&CancellationToken>) -> Option<SnapshotPayload> {
        let state = self.state.lock();
        if token.is_some_and(CancellationToken::is_cancelled) || !state.is_tracking() {
            return None;
        }

        let payload = build_payload(&state);
        if payload.is_empty() {
            lizz_debug!(self.log, "No sections to snapshot");
            return None;
        }
        Some(payload)
    }

    /// Periodic firing: hand the send to its own task so a failure stays there
    fn dispatch_periodic(&self, runtime: &Handle, token: &CancellationToken) -> bool {
        let Some(payload) = self.build(Some(token)) else {
            return false;
        };

        lizz_info!(
            self.log,
            "Periodic snapshot with {} sections",
            payload.sections.len()
        );
        self.periodic_sent.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            transport.send_snapshot(&payload).await;
        });
        true
    }

    fn unload(&self, token: Option<&CancellationToken>) -> bool {
        let Some(payload) = self.build(token) else {
            return false;
        };

        lizz_info!(
            self.log,
            "Page unload snapshot with {} sections",
            payload.sections.len()
        );
        self.transport.send_beacon(&payload, self.platform.beacon())
    }
}

async fn periodic_loop(
    core: SnapshotCore,
    runtime: Handle,
    period: Duration,
    token: CancellationToken,
) {
    // First firing one full period after start
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                core.dispatch_periodic(&runtime, &token);
            }
            _ = token.cancelled() => break,
        }
    }
}

struct SchedulerRun {
    token: CancellationToken,
    periodic: JoinHandle<()>,
    registrations: Vec<Registration>,
}

pub struct Scheduler {
    core: SnapshotCore,
    events: EventBus,
    runtime: Handle,
    interval: Duration,
    run: Mutex<Option<SchedulerRun>>,
}

impl Scheduler {
    pub fn new(
        state: SharedState,
        events: EventBus,
        platform: Arc<dyn Platform>,
        transport: Arc<Transport>,
        runtime: Handle,
    ) -> Self {
        let (interval, log) = {
            let guard = state.lock();
            (guard.config().snapshot_interval(), guard.log())
        };

        Self {
            core: SnapshotCore {
                state,
                platform,
                transport,
                log,
                periodic_sent: Arc::new(AtomicU64::new(0)),
            },
            events,
            runtime,
            interval,
            run: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the periodic task and register the unload handlers
    pub fn init(&self) -> bool {
        let mut run = lock(&self.run);
        if run.is_some() {
            return true;
        }

        let token = CancellationToken::new();
        let periodic = self.runtime.spawn(periodic_loop(
            self.core.clone(),
            self.runtime.clone(),
            self.interval,
            token.clone(),
        ));

        let mut registrations = Vec::with_capacity(UNLOAD_EVENTS.len() + 1);
        for kind in UNLOAD_EVENTS {
            let core = self.core.clone();
            let token = token.clone();
            registrations.push(self.events.add_listener(
                EventTarget::Window,
                kind,
                Arc::new(move |_: &HostEvent| {
                    core.unload(Some(&token));
                }),
            ));
        }

        let core = self.core.clone();
        let hidden_token = token.clone();
        registrations.push(self.events.add_listener(
            EventTarget::Document,
            EventKind::VisibilityChange,
            Arc::new(move |_: &HostEvent| {
                if core.platform.visibility_state() == Some(VisibilityState::Hidden) {
                    core.unload(Some(&hidden_token));
                }
            }),
        ));

        *run = Some(SchedulerRun {
            token,
            periodic,
            registrations,
        });

        lizz_info!(
            self.core.log,
            "SnapshotScheduler initialized with interval: {}ms",
            self.interval.as_millis()
        );
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    /// Number of periodic snapshots handed to the transport so far
    pub fn periodic_snapshots(&self) -> u64 {
        self.core.periodic_sent.load(Ordering::Relaxed)
    }

    /// Payload that the next snapshot would carry
    pub fn build_snapshot(&self) -> Option<SnapshotPayload> {
        self.core.build(None)
    }

    /// Build and send a snapshot now, awaiting the result.
    ///
    /// Returns false when there is nothing to send.
    pub async fn take_snapshot(&self) -> bool {
        let Some(payload) = self.core.build(None) else {
            return false;
        };

        lizz_info!(
            self.core.log,
            "Taking snapshot with {} sections",
            payload.sections.len()
        );
        self.core.transport.send_snapshot(&payload).await
    }

    pub async fn flush(&self) -> bool {
        lizz_info!(self.core.log, "Flushing snapshot");
        self.take_snapshot().await
    }

    /// Terminal snapshot over the beacon path
    pub fn on_unload(&self) -> bool {
        self.core.unload(None)
    }

    /// Stop the periodic task and detach every unload handler
    pub fn stop(&self) {
        let Some(run) = lock(&self.run).take() else {
            return;
        };

        run.token.cancel();
        run.periodic.abort();
        for registration in run.registrations {
            self.events.remove_listener(registration);
        }
        lizz_info!(self.core.log, "SnapshotScheduler stopped");
    }
}
