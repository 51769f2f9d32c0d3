//! Error types for the depthbook engine

use thiserror::Error;

use crate::state::StateError;

/// Umbrella error for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotFetchError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Stream failed permanently: {0}")]
    FatalStream(#[from] FatalStreamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Snapshot-fetch errors
///
/// Surfaced to the caller; the book stays in its prior state and the caller
/// (or the feed driver's retry policy) decides whether to try again.
#[derive(Error, Debug, Clone)]
pub enum SnapshotFetchError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Non-success response: HTTP {0}")]
    Status(u16),

    #[error("Unparsable snapshot payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SnapshotFetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SnapshotFetchError::Status(status.as_u16()),
            None => SnapshotFetchError::Network(err.to_string()),
        }
    }
}

/// Delta-stream errors; any of these marks the book stale
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Stream closed: {0}")]
    Closed(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Stream timed out: {0}")]
    Timeout(String),

    #[error("Malformed-message threshold crossed after {count} consecutive failures")]
    MalformedThreshold { count: u32 },
}

/// Raised when the reconnect bound is exhausted
#[derive(Error, Debug, Clone)]
#[error("Reconnect attempts exhausted after {attempts} attempts: {last}")]
pub struct FatalStreamError {
    pub attempts: u32,
    pub last: StreamError,
}

/// A single unparsable delta tuple or message
///
/// Tuple-level failures are dropped and logged without aborting the stream;
/// only whole-message failures count toward the malformed threshold.
#[derive(Error, Debug, Clone)]
pub enum MalformedDeltaError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Message carries neither a bid nor an ask side")]
    MissingSides,

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),
}

/// Store-level errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("No active subscription")]
    NotSubscribed,

    #[error("Subscription superseded by a newer generation")]
    SubscriptionSuperseded,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State error: {0}")]
    State(#[from] StateError),
}
