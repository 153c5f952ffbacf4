//! Signal monitors
//!
//! Each monitor turns one family of host signals into mutations of the shared
//! tracking state:
//!
//! - **Visibility**: viewport intersection → visibility flag, visibility average, scroll depth
//! - **Activity**: interaction events + a fixed tick → accumulated active time
//! - **Tab visibility**: document visibility → tab flag and activity clock
//!
//! Monitors own their listener registrations and timers, and release all of them
//! in `stop()`.

pub mod activity;
pub mod tab_visibility;
pub mod visibility;

pub use activity::{ActivityMonitor, ACTIVITY_DEBOUNCE};
pub use tab_visibility::TabVisibilityMonitor;
pub use visibility::{blend_visibility, scroll_depth_percent, VisibilityMonitor};
