//! In-process loopback transport.
//!
//! Scripted snapshots and failures plus a `publish` entry point that pushes
//! live messages to every open handle of a topic. Thread-safe, so a feeder
//! thread can publish while the owning thread pumps.

use super::filter::FilterPayload;
use super::transport::FeedTransport;
use super::types::{LiveMessage, MessageSink, SnapshotPayload, SnapshotReply};
use crate::error::{Result, SyncError};
use crate::types::{HandleId, Topic};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Unsubscribed sinks kept for late deliveries.
const RETIRED_CAPACITY: usize = 8;

#[derive(Default)]
struct MemoryState {
    live: BTreeMap<HandleId, (Topic, MessageSink)>,
    retired: VecDeque<MessageSink>,
    snapshot: Option<SnapshotPayload>,
    snapshot_results: VecDeque<Result<SnapshotPayload>>,
    defer_snapshots: bool,
    deferred: VecDeque<SnapshotReply>,
    subscribe_failures: VecDeque<SyncError>,
    unsubscribe_failure: Option<SyncError>,
    snapshot_fetches: usize,
    subscribe_attempts: usize,
}

/// Loopback [`FeedTransport`].
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload returned by every snapshot fetch without a scripted result.
    pub fn set_snapshot(&self, payload: SnapshotPayload) {
        self.state.lock().snapshot = Some(payload);
    }

    /// One-shot snapshot result, consumed by the next fetch.
    pub fn push_snapshot_result(&self, result: Result<SnapshotPayload>) {
        self.state.lock().snapshot_results.push_back(result);
    }

    /// Hold snapshot replies until [`MemoryTransport::complete_deferred`].
    pub fn defer_snapshots(&self, defer: bool) {
        self.state.lock().defer_snapshots = defer;
    }

    /// Complete the oldest deferred snapshot. Returns false if none is pending.
    pub fn complete_deferred(&self, result: Result<SnapshotPayload>) -> bool {
        let reply = self.state.lock().deferred.pop_front();
        reply.map(|reply| reply.complete(result)).is_some()
    }

    /// Fail the next `subscribe_live` call with `error`.
    pub fn fail_next_subscribe(&self, error: SyncError) {
        self.state.lock().subscribe_failures.push_back(error);
    }

    /// Make every `unsubscribe` report `error` (the handle is still removed).
    pub fn fail_unsubscribe(&self, error: Option<SyncError>) {
        self.state.lock().unsubscribe_failure = error;
    }

    /// Deliver `message` to every open handle of `topic`. Returns deliveries.
    pub fn publish(&self, topic: &Topic, message: LiveMessage) -> usize {
        let sinks: Vec<MessageSink> = self
            .state
            .lock()
            .live
            .values()
            .filter(|(t, _)| t == topic)
            .map(|(_, sink)| sink.clone())
            .collect();
        sinks.iter().filter(|sink| sink.deliver(message.clone())).count()
    }

    /// Deliver to one handle, open or recently unsubscribed.
    pub fn deliver_to(&self, handle: HandleId, message: LiveMessage) -> bool {
        let sink = {
            let state = self.state.lock();
            state.live.get(&handle).map(|(_, sink)| sink.clone()).or_else(|| {
                state.retired.iter().find(|s| s.handle() == handle).cloned()
            })
        };
        sink.map_or(false, |sink| sink.deliver(message))
    }

    /// Report a stream error on an open handle.
    pub fn fail_live(&self, handle: HandleId, error: SyncError) -> bool {
        let sink = self.state.lock().live.get(&handle).map(|(_, s)| s.clone());
        sink.map_or(false, |sink| sink.fail(error))
    }

    /// Open handles for `topic`.
    pub fn live_handles(&self, topic: &Topic) -> Vec<HandleId> {
        let state = self.state.lock();
        state
            .live
            .iter()
            .filter(|(_, (t, _))| t == topic)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn snapshot_fetches(&self) -> usize {
        self.state.lock().snapshot_fetches
    }

    /// Subscribe calls, failed ones included.
    pub fn subscribe_attempts(&self) -> usize {
        self.state.lock().subscribe_attempts
    }
}

impl FeedTransport for MemoryTransport {
    fn fetch_snapshot(&self, _topic: &Topic, _filter: &FilterPayload, reply: SnapshotReply) {
        let mut state = self.state.lock();
        state.snapshot_fetches += 1;
        if state.defer_snapshots {
            state.deferred.push_back(reply);
            return;
        }

        let result = match state.snapshot_results.pop_front() {
            Some(result) => result,
            None => state
                .snapshot
                .clone()
                .ok_or_else(|| SyncError::Transport("no snapshot available".to_string())),
        };
        drop(state);
        reply.complete(result);
    }

    fn subscribe_live(&self, topic: &Topic, _filter: &FilterPayload, sink: MessageSink) -> Result<()> {
        let mut state = self.state.lock();
        state.subscribe_attempts += 1;
        if let Some(error) = state.subscribe_failures.pop_front() {
            return Err(error);
        }

        debug!(topic = %topic, handle = %sink.handle(), "memory transport subscribed");
        state.live.insert(sink.handle(), (topic.clone(), sink));
        Ok(())
    }

    fn unsubscribe(&self, _topic: &Topic, handle: HandleId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((_, sink)) = state.live.remove(&handle) {
            if state.retired.len() == RETIRED_CAPACITY {
                state.retired.pop_front();
            }
            state.retired.push_back(sink);
        }

        match state.unsubscribe_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
