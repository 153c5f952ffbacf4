//! Error types for Lizz

use thiserror::Error;

/// Errors that can occur while constructing or configuring an engine
#[derive(Debug, Error)]
pub enum LizzError {
    #[error("siteId is required")]
    MissingSiteId,

    #[error("Host environment unavailable: {0}")]
    HostUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Failure raised by a host's beacon primitive while queueing a request
#[derive(Debug, Error)]
#[error("beacon rejected: {0}")]
pub struct BeaconError(pub String);
