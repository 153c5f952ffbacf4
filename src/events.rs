//! Host event sources and listener registrations
//!
//! Monitors register handlers on an [`EventBus`] and keep the returned
//! [`Registration`]s, which they hand back at `stop()`. The host forwards
//! document and window events with [`EventBus::dispatch`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::state::lock;

/// Global object an event is fired on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTarget {
    Document,
    Window,
}

/// Platform events the engine listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MouseMove,
    MouseDown,
    Click,
    Scroll,
    KeyDown,
    TouchStart,
    TouchMove,
    Focus,
    Blur,
    VisibilityChange,
    BeforeUnload,
    Unload,
    PageHide,
}

impl EventKind {
    /// DOM event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MouseMove => "mousemove",
            EventKind::MouseDown => "mousedown",
            EventKind::Click => "click",
            EventKind::Scroll => "scroll",
            EventKind::KeyDown => "keydown",
            EventKind::TouchStart => "touchstart",
            EventKind::TouchMove => "touchmove",
            EventKind::Focus => "focus",
            EventKind::Blur => "blur",
            EventKind::VisibilityChange => "visibilitychange",
            EventKind::BeforeUnload => "beforeunload",
            EventKind::Unload => "unload",
            EventKind::PageHide => "pagehide",
        }
    }
}

/// Event handed to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEvent {
    pub target: EventTarget,
    pub kind: EventKind,
}

pub type Handler = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// Proof of one (target, event, handler) registration
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a Registration leaks the listener until the bus is dropped"]
pub struct Registration {
    target: EventTarget,
    kind: EventKind,
    id: u64,
}

impl Registration {
    pub fn target(&self) -> EventTarget {
        self.target
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[derive(Default)]
struct Listeners {
    by_event: HashMap<(EventTarget, EventKind), Vec<(u64, Handler)>>,
}

/// Cloneable listener registry shared by the host and the monitors
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &self,
        target: EventTarget,
        kind: EventKind,
        handler: Handler,
    ) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners)
            .by_event
            .entry((target, kind))
            .or_default()
            .push((id, handler));
        Registration { target, kind, id }
    }

    /// Remove a listener; returns false if it was already gone
    pub fn remove_listener(&self, registration: Registration) -> bool {
        let mut listeners = lock(&self.listeners);
        let key = (registration.target, registration.kind);
        let Some(handlers) = listeners.by_event.get_mut(&key) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|(id, _)| *id != registration.id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            listeners.by_event.remove(&key);
        }
        removed
    }

    /// Fire an event; returns the number of handlers invoked
    pub fn dispatch(&self, target: EventTarget, kind: EventKind) -> usize {
        let handlers: Vec<Handler> = lock(&self.listeners)
            .by_event
            .get(&(target, kind))
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let event = HostEvent { target, kind };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).by_event.values().map(Vec::len).sum()
    }
}
