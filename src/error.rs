//! Error types for the synchronization core.

use crate::types::{SectionId, Topic};
use thiserror::Error;

/// Main error type for store, batcher and subscription operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The transport lost track of a subscription (expired, reconnecting).
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Unknown section: {0}")]
    UnknownSection(SectionId),

    #[error("Topic is closed: {0}")]
    Closed(Topic),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// How the orchestrator treats an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried by the next natural trigger, never surfaced.
    TransientNetwork,
    /// Surfaced as the topic error; later triggers still retry.
    Transport,
    /// Surfaced; no automatic retry.
    Misconfiguration,
    /// Record dropped or admitted with a minimum stamp; never surfaced.
    MalformedRecord,
    /// Caller misuse (unknown section, closed topic).
    Usage,
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::SubscriptionNotFound(_) => ErrorClass::TransientNetwork,
            SyncError::Transport(_) => ErrorClass::Transport,
            SyncError::Misconfiguration(_) => ErrorClass::Misconfiguration,
            SyncError::MalformedRecord(_) | SyncError::Serialization(_) => {
                ErrorClass::MalformedRecord
            }
            SyncError::UnknownSection(_) | SyncError::Closed(_) => ErrorClass::Usage,
        }
    }

    /// Whether the error should be written into the sections' error field.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transport | ErrorClass::Misconfiguration
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
