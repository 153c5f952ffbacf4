//! Host platform abstraction
//!
//! The engine never talks to a DOM directly. A host (a wasm shim, a headless
//! browser driver, a test double) implements [`Platform`] and feeds intersection
//! batches and DOM events into the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SECTION_ATTRIBUTE;
use crate::error::BeaconError;

/// Opaque, host-assigned identity of a DOM element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// Snapshot of the element attributes needed to name a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub handle: ElementHandle,
    pub tag_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Element {
    pub fn new(handle: u64, tag_name: impl Into<String>) -> Self {
        Self {
            handle: ElementHandle(handle),
            tag_name: tag_name.into(),
            id: None,
            class_name: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Resolve the stable section identifier for this element.
    ///
    /// Tries, in order: the tracking data attribute, the `id` attribute,
    /// `{first class}-{index}`, then `{tag}-{index}`.
    pub fn section_id(&self, index: usize) -> String {
        if let Some(value) = self.attribute(SECTION_ATTRIBUTE).filter(|v| !v.is_empty()) {
            return value.to_string();
        }

        if let Some(id) = self.id.as_deref().filter(|v| !v.is_empty()) {
            return id.to_string();
        }

        if let Some(class) = self.class_name.split_whitespace().next() {
            return format!("{class}-{index}");
        }

        format!("{}-{index}", self.tag_name.to_lowercase())
    }
}

/// Axis-aligned rectangle in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Rect {
    pub fn new(top: f64, bottom: f64) -> Self {
        Self {
            top,
            bottom,
            left: 0.0,
            right: 0.0,
        }
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// One intersection record delivered by the host's observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionEntry {
    pub target: ElementHandle,
    pub intersection_ratio: f64,
    pub bounding_client_rect: Rect,
    /// Viewport bounds; absent when the host cannot report them
    #[serde(default)]
    pub root_bounds: Option<Rect>,
}

/// Document visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    Visible,
    Hidden,
}

/// Viewport-intersection observer owned by the visibility monitor
pub trait IntersectionObserver: Send {
    fn observe(&mut self, target: ElementHandle);
    fn unobserve(&mut self, target: ElementHandle);
    fn disconnect(&mut self);
}

/// Non-blocking, teardown-safe send primitive
pub trait Beacon: Send + Sync {
    /// Queue `data` for delivery to `url`.
    ///
    /// `Ok(false)` means the host refused to queue the request.
    fn send_beacon(&self, url: &str, data: &str) -> Result<bool, BeaconError>;
}

/// Capabilities the engine needs from its host
pub trait Platform: Send + Sync {
    /// Elements matching a selector, in document order
    fn query_selector_all(&self, selector: &str) -> Vec<Element>;

    /// Path of the current location, used as the default page id
    fn location_pathname(&self) -> String;

    /// Current document visibility; `None` if the host has no such signal
    fn visibility_state(&self) -> Option<VisibilityState>;

    /// Create an observer firing at the given ratios; `None` if unsupported
    fn create_intersection_observer(
        &self,
        thresholds: &[f64],
    ) -> Option<Box<dyn IntersectionObserver>>;

    /// Beacon primitive, if the host has one
    fn beacon(&self) -> Option<&dyn Beacon> {
        None
    }
}
