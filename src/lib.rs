//! Lizz - Attention analytics engine for content sections
//!
//! Lizz measures how much real attention each tracked section of a page receives:
//! viewport visibility, scroll depth and active user time. Per-section metrics are
//! summarized into an Attention Quality Score and shipped to a collector as
//! periodic snapshots, with a final beacon on page teardown.
//!
//! ## Modules
//!
//! - **Monitors**: viewport visibility, user activity and tab visibility
//! - **Scheduler**: periodic and teardown snapshots
//! - **Transport**: HTTP delivery with a beacon path for unload
//!
//! The browser is abstracted behind [`host::Platform`]; events reach the engine
//! through [`Lizz::dispatch`] and [`Lizz::handle_intersections`].

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod monitors;
pub mod scheduler;
pub mod scoring;
pub mod sdk;
pub mod snapshot;
pub mod state;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

#[doc(hidden)]
pub use log as __log;

pub use config::{LizzConfig, TrackPageOptions};
pub use error::{BeaconError, LizzError};
pub use events::{EventBus, EventKind, EventTarget};
pub use host::{Beacon, Element, ElementHandle, IntersectionEntry, IntersectionObserver, Platform};
pub use scoring::attention_score;
pub use sdk::{init_lizz, Lizz};
pub use types::{SectionMetric, SectionSnapshot, SnapshotPayload};

/// SDK version embedded in every snapshot
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by diagnostics
pub const PRODUCER_NAME: &str = "lizz-sdk";
