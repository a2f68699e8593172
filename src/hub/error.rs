//! Error types for the broadcast hub and observer transports.

use std::time::Duration;
use thiserror::Error;

/// Errors from submitting requests to the hub.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Hub is shut down")]
    Closed,

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from an observer's transport. Any of these ends that observer's connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Failed(String),
}
