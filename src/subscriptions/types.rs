//! Subscription types: live messages, handles, and the marshaling sinks.

use crate::error::{Result, SyncError};
use crate::types::{HandleId, SectionId, Topic};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::filter::FilterFingerprint;

/// Snapshot response: raw records per section.
pub type SnapshotPayload = BTreeMap<SectionId, Vec<Value>>;

/// A message pushed by a live subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Full-section snapshot.
    Replace {
        section: SectionId,
        records: Vec<Value>,
    },

    /// Single-record partial update.
    Merge { section: SectionId, record: Value },
}

impl LiveMessage {
    pub fn section(&self) -> &SectionId {
        match self {
            LiveMessage::Replace { section, .. } | LiveMessage::Merge { section, .. } => section,
        }
    }
}

/// Everything the orchestrator's owning thread receives.
#[derive(Debug)]
pub(crate) enum Inbound {
    Live {
        handle: HandleId,
        message: LiveMessage,
    },
    LiveError {
        handle: HandleId,
        error: SyncError,
    },
    Snapshot {
        epoch: u64,
        result: Result<SnapshotPayload>,
    },
}

/// Lifecycle of a handle: absent, pending, active, then replaced or closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    /// Open call in progress.
    Pending,
    /// Delivering into the store.
    Active,
    /// Superseded by a filter change; deliveries are discarded.
    Replaced,
    /// Torn down.
    Closed,
}

/// One live feed for one topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: HandleId,
    pub topic: Topic,
    /// Fingerprint of the filter the handle was opened with.
    pub fingerprint: FilterFingerprint,
}

/// Delivery side handed to the transport for one handle.
///
/// Cheap to clone and `Send`: transports may deliver from any thread. Every
/// message is tagged with the handle so superseded handles can be discarded
/// on the owning thread. The channel is unbounded, so delivery never drops.
#[derive(Clone, Debug)]
pub struct MessageSink {
    handle: HandleId,
    tx: Sender<Inbound>,
}

impl MessageSink {
    pub(crate) fn new(handle: HandleId, tx: Sender<Inbound>) -> Self {
        Self { handle, tx }
    }

    /// Handle this sink delivers for.
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Deliver a live message. Returns false once the orchestrator is gone.
    pub fn deliver(&self, message: LiveMessage) -> bool {
        let handle = self.handle;
        self.tx.send(Inbound::Live { handle, message }).is_ok()
    }

    /// Report a stream-level error for this handle.
    pub fn fail(&self, error: SyncError) -> bool {
        let handle = self.handle;
        self.tx.send(Inbound::LiveError { handle, error }).is_ok()
    }
}

/// One-shot completion for a snapshot fetch.
///
/// Dropping it without completing reports a transport error, so a pending
/// hydration never hangs.
#[derive(Debug)]
pub struct SnapshotReply {
    epoch: u64,
    tx: Option<Sender<Inbound>>,
}

impl SnapshotReply {
    pub(crate) fn new(epoch: u64, tx: Sender<Inbound>) -> Self {
        Self { epoch, tx: Some(tx) }
    }

    /// Subscription epoch the request belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn complete(mut self, result: Result<SnapshotPayload>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<SnapshotPayload>) {
        if let Some(tx) = self.tx.take() {
            let epoch = self.epoch;
            if tx.send(Inbound::Snapshot { epoch, result }).is_err() {
                debug!(epoch, "orchestrator gone, snapshot reply discarded");
            }
        }
    }
}

impl Drop for SnapshotReply {
    fn drop(&mut self) {
        self.send(Err(SyncError::Transport(
            "snapshot request dropped without a reply".to_string(),
        )));
    }
}
