//! Per-topic subscription orchestrator.
//!
//! Owns the live handle, the derived filter, two batchers (full-section
//! replaces and single-record merges) and the section store they feed.
//! Everything runs on one owning thread: transports deliver through
//! [`MessageSink`]s into a channel that [`TopicOrchestrator::pump`] drains,
//! and the host's tick source flushes the batchers into the store.

use super::filter::{DerivedFilter, FeedSettings, FilterFingerprint, FilterPayload};
use super::transport::FeedTransport;
use super::types::{
    HandleState, Inbound, LiveMessage, MessageSink, SnapshotPayload, SnapshotReply,
    SubscriptionHandle,
};
use crate::batcher::{Batcher, TickScheduler};
use crate::clock::{Clock, SystemClock};
use crate::config::{OrchestratorConfig, SyncConfig};
use crate::error::{ErrorClass, Result, SyncError};
use crate::store::{Section, SectionStore, StoreWatch};
use crate::types::{EntityRecord, HandleId, SectionId, Topic};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Network-side lifecycle of a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicPhase {
    Idle,
    Hydrating,
    Subscribing,
    Streaming,
    Paused,
    Closed,
}

/// Counters exposed for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Live messages from superseded or closed handles.
    pub dropped_stale: u64,
    pub dropped_paused: u64,
    /// Live messages for sections the store does not have.
    pub dropped_unknown_section: u64,
    /// Records that could not be keyed.
    pub dropped_malformed: u64,
    pub replaces_applied: u64,
    /// Replace messages superseded by a later one in the same flush.
    pub replaces_coalesced: u64,
    pub merges_applied: u64,
    /// Snapshot replies for an outdated epoch.
    pub snapshots_discarded: u64,
    pub resubscriptions: u64,
}

struct ReplaceItem {
    section: SectionId,
    records: Vec<Value>,
}

struct MergeItem {
    section: SectionId,
    record: Value,
}

/// State shared with the batcher callbacks.
#[derive(Default)]
struct ApplyState {
    stats: OrchestratorStats,
    /// Sections fully replaced by the live feed in the current epoch; a late
    /// snapshot must not overwrite them.
    live_replaced: HashSet<SectionId>,
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    filter: DerivedFilter,
    state: HandleState,
}

/// Lifecycle coordinator for one topic.
pub struct TopicOrchestrator {
    topic: Topic,
    config: OrchestratorConfig,
    transport: Arc<dyn FeedTransport>,
    clock: Arc<dyn Clock>,
    store: Rc<RefCell<SectionStore>>,
    shared: Rc<RefCell<ApplyState>>,
    replace_batcher: Batcher<ReplaceItem>,
    merge_batcher: Batcher<MergeItem>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    phase: TopicPhase,
    /// Last successfully derived filter, whether or not a handle is open for it.
    desired: Option<DerivedFilter>,
    /// Handle and the filter it was opened with, swapped together.
    active: Option<ActiveSubscription>,
    next_handle: u64,
    /// Bumped on every resubscription and on close.
    epoch: u64,
    pending_snapshot: Option<u64>,
    hydrated: bool,
    paused: bool,
    resume_at: Option<Instant>,
    halted: Option<SyncError>,
    last_error: Option<SyncError>,
}

impl TopicOrchestrator {
    /// Create an idle orchestrator with its own section store.
    pub fn new(
        topic: Topic,
        config: SyncConfig,
        transport: Arc<dyn FeedTransport>,
        scheduler: Rc<dyn TickScheduler>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Rc::new(RefCell::new(SectionStore::new(config.store)?));
        let shared = Rc::new(RefCell::new(ApplyState::default()));

        let replace_batcher = {
            let store = Rc::clone(&store);
            let shared = Rc::clone(&shared);
            Batcher::new(
                format!("{topic}/replace"),
                Rc::clone(&scheduler),
                move |batch: Vec<ReplaceItem>| apply_replaces(&store, &shared, batch),
            )
        };
        let merge_batcher = {
            let store = Rc::clone(&store);
            let shared = Rc::clone(&shared);
            Batcher::new(
                format!("{topic}/merge"),
                scheduler,
                move |batch: Vec<MergeItem>| apply_merges(&store, &shared, batch),
            )
        };

        // Unbounded: deliveries are never dropped, `pump` drains it.
        let (inbound_tx, inbound_rx) = unbounded();

        Ok(Self {
            topic,
            config: config.orchestrator,
            transport,
            clock: Arc::new(SystemClock),
            store,
            shared,
            replace_batcher,
            merge_batcher,
            inbound_tx,
            inbound_rx,
            phase: TopicPhase::Idle,
            desired: None,
            active: None,
            next_handle: 1,
            epoch: 0,
            pending_snapshot: None,
            hydrated: false,
            paused: false,
            resume_at: None,
            halted: None,
            last_error: None,
        })
    }

    /// Replace the time source used for the settle-window resume.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // --- Reads ---

    /// Topic this orchestrator subscribes to.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Current phase. While the live handle is open, `Paused` wins over
    /// `Hydrating`, which is reported until the snapshot reply is handled.
    pub fn phase(&self) -> TopicPhase {
        match self.phase {
            TopicPhase::Streaming if self.paused => TopicPhase::Paused,
            TopicPhase::Streaming if self.pending_snapshot.is_some() => TopicPhase::Hydrating,
            phase => phase,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_hydrating(&self) -> bool {
        self.pending_snapshot.is_some()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Open live handle, if any.
    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    fn fingerprint(&self) -> Option<&FilterFingerprint> {
        self.active.as_ref().map(|a| &a.filter.fingerprint)
    }

    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    /// Snapshot of the diagnostic counters.
    pub fn stats(&self) -> OrchestratorStats {
        self.shared.borrow().stats
    }

    /// Owned copy of one section.
    pub fn section(&self, id: &SectionId) -> Result<Section> {
        self.store.borrow().section(id).cloned()
    }

    /// Records of a section matching `query`.
    pub fn filtered_section(&self, id: &SectionId, query: &str) -> Result<Vec<EntityRecord>> {
        let store = self.store.borrow();
        Ok(store.filtered_by(id, query)?.into_iter().cloned().collect())
    }

    /// Run `f` against the store. The borrow ends when `f` returns.
    pub fn with_store<R>(&self, f: impl FnOnce(&SectionStore) -> R) -> R {
        f(&*self.store.borrow())
    }

    pub fn set_search(&self, id: &SectionId, query: &str) -> Result<()> {
        let mut store = self.store.borrow_mut();
        store.set_search(id, query)?;
        store.publish_changes();
        Ok(())
    }

    pub fn set_visible(&self, id: &SectionId, visible: bool) -> Result<()> {
        let mut store = self.store.borrow_mut();
        store.set_visible(id, visible)?;
        store.publish_changes();
        Ok(())
    }

    /// New watcher on the store's change events.
    pub fn watch(&self) -> StoreWatch {
        self.store.borrow_mut().watch()
    }

    /// Items waiting in the (replace, merge) batchers.
    pub fn pending_batches(&self) -> (usize, usize) {
        (self.replace_batcher.pending(), self.merge_batcher.pending())
    }

    // --- Triggers ---

    /// Recompute the filter from `settings` and resubscribe if it changed.
    ///
    /// Also the natural retry trigger: with no open handle the subscription is
    /// reopened even if the filter is unchanged, unless the last attempt was
    /// a misconfiguration for that same filter. Returns whether a new handle
    /// was opened.
    pub fn on_filter_settings_changed(&mut self, settings: &FeedSettings) -> Result<bool> {
        self.ensure_open()?;

        let derived = match DerivedFilter::derive(settings) {
            Ok(derived) => derived,
            Err(error) => {
                // The current handle, if any, keeps streaming its old filter.
                warn!(topic = %self.topic, error = %error, "filter derivation failed");
                self.surface(&error);
                return Err(error);
            }
        };

        if self.fingerprint() == Some(&derived.fingerprint) {
            trace!(topic = %self.topic, "filter unchanged");
            return Ok(false);
        }

        if let Some(halt) = &self.halted {
            let same_filter = self
                .desired
                .as_ref()
                .map_or(false, |d| d.fingerprint == derived.fingerprint);
            if same_filter {
                debug!(topic = %self.topic, "halted on misconfiguration, not retrying");
                return Err(halt.clone());
            }
        }

        self.halted = None;
        self.desired = Some(derived.clone());
        self.resubscribe(derived)
    }

    /// Pause, apply `settings`, and resume after the settle window.
    pub fn apply_filters(&mut self, settings: &FeedSettings) -> Result<bool> {
        self.ensure_open()?;
        self.pause();
        let result = self.on_filter_settings_changed(settings);
        self.resume_at = Some(self.clock.now() + self.config.settle_window());
        result
    }

    /// Manual retry with the last derived filter. Clears a misconfiguration halt.
    pub fn refresh(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.halted = None;
        match self.desired.clone() {
            Some(desired) => self.resubscribe(desired),
            None => Ok(false),
        }
    }

    /// Drop inbound live messages until `resume`. The connection stays open.
    pub fn pause(&mut self) {
        if !self.paused {
            debug!(topic = %self.topic, "paused");
        }
        self.paused = true;
        self.resume_at = None;
    }

    pub fn resume(&mut self) {
        if self.paused {
            debug!(topic = %self.topic, "resumed");
        }
        self.paused = false;
        self.resume_at = None;
    }

    /// Drain everything transports delivered since the last call.
    /// Returns the number of inbound items handled.
    pub fn pump(&mut self) -> usize {
        self.poll_resume();

        let mut handled = 0;
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            handled += 1;
            match inbound {
                Inbound::Live { handle, message } => self.route_live(handle, message),
                Inbound::LiveError { handle, error } => self.on_live_error(handle, error),
                Inbound::Snapshot { epoch, result } => self.on_snapshot(epoch, result),
            }
        }
        handled
    }

    /// Close the live handle and discard queued updates. Store contents stay.
    pub fn close(&mut self) {
        if self.phase == TopicPhase::Closed {
            return;
        }
        self.retire_active(HandleState::Closed);
        self.replace_batcher.clear();
        self.merge_batcher.clear();
        self.epoch += 1;
        self.pending_snapshot = None;
        self.paused = false;
        self.resume_at = None;
        self.phase = TopicPhase::Closed;
        info!(topic = %self.topic, "closed");
    }

    /// Close and clear every section.
    pub fn reset(&mut self) {
        self.close();
        let mut store = self.store.borrow_mut();
        store.reset();
        store.publish_changes();
    }

    // --- Lifecycle internals ---

    fn ensure_open(&self) -> Result<()> {
        if self.phase == TopicPhase::Closed {
            return Err(SyncError::Closed(self.topic.clone()));
        }
        Ok(())
    }

    /// Swap to a new handle for `filter`. Routing for the old handle stops
    /// before anything else happens.
    fn resubscribe(&mut self, filter: DerivedFilter) -> Result<bool> {
        if self.retire_active(HandleState::Replaced) {
            self.shared.borrow_mut().stats.resubscriptions += 1;
        }
        self.replace_batcher.clear();
        self.merge_batcher.clear();
        self.epoch += 1;
        self.pending_snapshot = None;
        self.shared.borrow_mut().live_replaced.clear();
        self.clear_surfaced_error();

        if !self.hydrated {
            self.request_snapshot(&filter.payload);
        }

        self.phase = TopicPhase::Subscribing;
        let handle = SubscriptionHandle {
            id: HandleId(self.next_handle),
            topic: self.topic.clone(),
            fingerprint: filter.fingerprint.clone(),
        };
        self.next_handle += 1;

        let sink = MessageSink::new(handle.id, self.inbound_tx.clone());
        let mut pending = ActiveSubscription {
            handle,
            filter,
            state: HandleState::Pending,
        };

        match self
            .transport
            .subscribe_live(&self.topic, &pending.filter.payload, sink)
        {
            Ok(()) => {
                pending.state = HandleState::Active;
                info!(
                    topic = %self.topic,
                    handle = %pending.handle.id,
                    filter = %pending.filter.fingerprint,
                    "subscribed"
                );
                self.active = Some(pending);
                self.phase = TopicPhase::Streaming;
                Ok(true)
            }
            Err(error) => self.on_subscribe_failed(pending.handle.id, error),
        }
    }

    /// Stop routing for the current handle and unsubscribe it. Returns
    /// whether there was one.
    fn retire_active(&mut self, state: HandleState) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        active.state = state;

        let id = active.handle.id;
        if let Err(error) = self.transport.unsubscribe(&self.topic, id) {
            warn!(topic = %self.topic, handle = %id, error = %error, "unsubscribe failed");
        }
        debug!(topic = %self.topic, handle = %id, state = ?state, "handle retired");
        true
    }

    fn request_snapshot(&mut self, filter: &FilterPayload) {
        let epoch = self.epoch;
        self.pending_snapshot = Some(epoch);
        {
            let mut store = self.store.borrow_mut();
            for id in store.section_ids() {
                let _ = store.set_loading(&id, true);
            }
            store.publish_changes();
        }
        debug!(topic = %self.topic, epoch, "fetching snapshot");
        let reply = SnapshotReply::new(epoch, self.inbound_tx.clone());
        self.transport.fetch_snapshot(&self.topic, filter, reply);
    }

    fn on_subscribe_failed(&mut self, handle: HandleId, error: SyncError) -> Result<bool> {
        self.phase = TopicPhase::Idle;
        if error.class() == ErrorClass::TransientNetwork {
            debug!(topic = %self.topic, handle = %handle, error = %error,
                "subscription not found, retrying on next trigger");
            return Ok(false);
        }

        warn!(topic = %self.topic, error = %error, "subscription failed");
        if error.class() == ErrorClass::Misconfiguration {
            self.halted = Some(error.clone());
        }
        if error.is_surfaced() {
            self.surface(&error);
        }
        Err(error)
    }

    fn on_live_error(&mut self, handle: HandleId, error: SyncError) {
        if !self.is_current(handle) {
            trace!(topic = %self.topic, handle = %handle, "error from stale handle ignored");
            return;
        }

        let class = error.class();
        if matches!(class, ErrorClass::TransientNetwork | ErrorClass::Misconfiguration) {
            debug!(topic = %self.topic, handle = %handle, error = %error, "live subscription lost");
            self.retire_active(HandleState::Closed);
            self.phase = TopicPhase::Idle;
        } else {
            warn!(topic = %self.topic, error = %error, "live subscription error");
        }
        if class == ErrorClass::Misconfiguration {
            self.halted = Some(error.clone());
        }
        if error.is_surfaced() {
            self.surface(&error);
        }
    }

    fn on_snapshot(&mut self, epoch: u64, result: Result<SnapshotPayload>) {
        if self.pending_snapshot != Some(epoch) {
            debug!(topic = %self.topic, epoch, current = self.epoch, "discarding outdated snapshot");
            self.shared.borrow_mut().stats.snapshots_discarded += 1;
            return;
        }
        self.pending_snapshot = None;

        let mut store = self.store.borrow_mut();
        let mut shared = self.shared.borrow_mut();

        match result {
            Ok(payload) => {
                for (section, values) in payload {
                    if !store.has_section(&section) {
                        warn!(topic = %self.topic, section = %section, "snapshot for unknown section");
                        continue;
                    }
                    if shared.live_replaced.contains(&section) {
                        debug!(topic = %self.topic, section = %section,
                            "live replace already applied, skipping snapshot");
                        continue;
                    }
                    let records = parse_records(&store, &section, values, &mut shared.stats);
                    let _ = store.replace_all(&section, records);
                }
                self.hydrated = true;
                info!(topic = %self.topic, epoch, "snapshot applied");
            }
            // Hydration is an optimization; the live feed fills the store.
            Err(error) => warn!(topic = %self.topic, error = %error, "snapshot failed"),
        }

        for id in store.section_ids() {
            if store.section(&id).map_or(false, Section::loading) {
                let _ = store.set_loading(&id, false);
            }
        }
        store.publish_changes();
    }

    fn route_live(&mut self, handle: HandleId, message: LiveMessage) {
        let mut shared = self.shared.borrow_mut();
        if !self.is_current(handle) {
            trace!(topic = %self.topic, handle = %handle, "dropping message from stale handle");
            shared.stats.dropped_stale += 1;
            return;
        }
        if self.paused {
            shared.stats.dropped_paused += 1;
            return;
        }
        if !self.store.borrow().has_section(message.section()) {
            warn!(topic = %self.topic, section = %message.section(), "message for unknown section");
            shared.stats.dropped_unknown_section += 1;
            return;
        }
        drop(shared);

        match message {
            LiveMessage::Replace { section, records } => {
                self.replace_batcher.add(ReplaceItem { section, records })
            }
            LiveMessage::Merge { section, record } => {
                self.merge_batcher.add(MergeItem { section, record })
            }
        }
    }

    fn is_current(&self, handle: HandleId) -> bool {
        self.active
            .as_ref()
            .map_or(false, |a| a.handle.id == handle && a.state == HandleState::Active)
    }

    fn poll_resume(&mut self) {
        if self.resume_at.map_or(false, |at| self.clock.now() >= at) {
            self.resume();
        }
    }

    /// Write the error into every section.
    fn surface(&mut self, error: &SyncError) {
        self.last_error = Some(error.clone());
        let message = error.to_string();
        let mut store = self.store.borrow_mut();
        for id in store.section_ids() {
            let _ = store.set_error(&id, Some(message.clone()));
        }
        store.publish_changes();
    }

    fn clear_surfaced_error(&mut self) {
        if self.last_error.take().is_none() {
            return;
        }
        let mut store = self.store.borrow_mut();
        for id in store.section_ids() {
            let _ = store.set_error(&id, None);
        }
        store.publish_changes();
    }
}

impl Drop for TopicOrchestrator {
    fn drop(&mut self) {
        self.close();
    }
}

fn parse_records(
    store: &SectionStore,
    section: &SectionId,
    values: Vec<Value>,
    stats: &mut OrchestratorStats,
) -> Vec<EntityRecord> {
    values
        .into_iter()
        .filter_map(|value| match store.parse_record(section, value) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(section = %section, error = %error, "dropping record");
                stats.dropped_malformed += 1;
                None
            }
        })
        .collect()
}

/// Apply the newest replace per section; earlier ones in the batch are
/// superseded snapshots.
fn apply_replaces(store: &RefCell<SectionStore>, shared: &RefCell<ApplyState>, batch: Vec<ReplaceItem>) {
    let total = batch.len();
    let mut seen = HashSet::new();
    let mut latest: Vec<ReplaceItem> = batch
        .into_iter()
        .rev()
        .filter(|item| seen.insert(item.section.clone()))
        .collect();
    latest.reverse();

    let mut store = store.borrow_mut();
    let mut shared = shared.borrow_mut();
    shared.stats.replaces_coalesced += (total - latest.len()) as u64;

    for item in latest {
        let records = parse_records(&store, &item.section, item.records, &mut shared.stats);
        match store.replace_all(&item.section, records) {
            Ok(()) => {
                let _ = store.set_loading(&item.section, false);
                shared.stats.replaces_applied += 1;
                shared.live_replaced.insert(item.section);
            }
            Err(error) => warn!(section = %item.section, error = %error, "replace failed"),
        }
    }
    store.publish_changes();
}

/// Apply every merge in arrival order.
fn apply_merges(store: &RefCell<SectionStore>, shared: &RefCell<ApplyState>, batch: Vec<MergeItem>) {
    let mut store = store.borrow_mut();
    let mut shared = shared.borrow_mut();

    for item in batch {
        let record = match store.parse_record(&item.section, item.record) {
            Ok(record) => record,
            Err(error) => {
                warn!(section = %item.section, error = %error, "dropping record");
                shared.stats.dropped_malformed += 1;
                continue;
            }
        };
        match store.merge(&item.section, record) {
            Ok(outcome) => {
                trace!(section = %item.section, outcome = ?outcome, "merged");
                shared.stats.merges_applied += 1;
                if store.section(&item.section).map_or(false, Section::loading) {
                    let _ = store.set_loading(&item.section, false);
                }
            }
            Err(error) => warn!(section = %item.section, error = %error, "merge failed"),
        }
    }
    store.publish_changes();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::FrameTicker;
    use crate::config::{SectionSpec, StoreConfig};
    use crate::subscriptions::MemoryTransport;
    use serde_json::json;

    struct Fixture {
        ticker: FrameTicker,
        transport: Arc<MemoryTransport>,
        orchestrator: TopicOrchestrator,
    }

    fn fixture() -> Fixture {
        let ticker = FrameTicker::new();
        let transport = Arc::new(MemoryTransport::new());
        transport.set_snapshot(SnapshotPayload::new());
        let config = SyncConfig {
            store: StoreConfig::with_sections(vec![SectionSpec::new("new")]),
            ..Default::default()
        };
        let orchestrator = TopicOrchestrator::new(
            Topic::new("tokens"),
            config,
            transport.clone(),
            Rc::new(ticker.clone()),
        )
        .unwrap();
        Fixture {
            ticker,
            transport,
            orchestrator,
        }
    }

    fn token(address: &str, created_at: i64) -> Value {
        json!({"address": address, "chain": "sol", "createdAt": created_at})
    }

    fn chains(list: &[&str]) -> FeedSettings {
        FeedSettings {
            chains: list.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_subscribe_opens_active_handle() {
        let mut f = fixture();
        assert!(f.orchestrator.on_filter_settings_changed(&chains(&["sol"])).unwrap());
        assert_eq!(f.orchestrator.phase(), TopicPhase::Hydrating);
        assert_eq!(f.transport.live_handles(&Topic::new("tokens")).len(), 1);

        f.orchestrator.pump();
        assert_eq!(f.orchestrator.phase(), TopicPhase::Streaming);
        assert!(f.orchestrator.is_hydrated());

        // Same filter is a no-op.
        assert!(!f.orchestrator.on_filter_settings_changed(&chains(&["SOL "])).unwrap());
        assert_eq!(f.orchestrator.stats().resubscriptions, 0);
    }

    #[test]
    fn test_stale_handle_messages_dropped() {
        let mut f = fixture();
        f.orchestrator.on_filter_settings_changed(&chains(&["sol"])).unwrap();
        let old = f.orchestrator.handle().unwrap().id;

        f.orchestrator.on_filter_settings_changed(&chains(&["base"])).unwrap();
        assert_ne!(f.orchestrator.handle().unwrap().id, old);

        f.transport.deliver_to(
            old,
            LiveMessage::Merge {
                section: "new".into(),
                record: token("a", 1),
            },
        );
        f.orchestrator.pump();
        f.ticker.run_until_idle(8);

        assert_eq!(f.orchestrator.stats().dropped_stale, 1);
        assert!(f.orchestrator.section(&"new".into()).unwrap().is_empty());
    }

    #[test]
    fn test_replace_last_wins_within_flush() {
        let mut f = fixture();
        f.orchestrator.on_filter_settings_changed(&FeedSettings::default()).unwrap();
        f.orchestrator.pump();

        let topic = Topic::new("tokens");
        f.transport.publish(
            &topic,
            LiveMessage::Replace {
                section: "new".into(),
                records: vec![token("a", 1)],
            },
        );
        f.transport.publish(
            &topic,
            LiveMessage::Replace {
                section: "new".into(),
                records: vec![token("b", 2), token("c", 3)],
            },
        );
        f.orchestrator.pump();
        f.ticker.run_tick();

        let section = f.orchestrator.section(&"new".into()).unwrap();
        let keys: Vec<_> = section.records().iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["c:sol", "b:sol"]);

        let stats = f.orchestrator.stats();
        assert_eq!(stats.replaces_applied, 1);
        assert_eq!(stats.replaces_coalesced, 1);
    }

    #[test]
    fn test_paused_messages_dropped() {
        let mut f = fixture();
        f.orchestrator.on_filter_settings_changed(&FeedSettings::default()).unwrap();
        f.orchestrator.pause();
        assert_eq!(f.orchestrator.phase(), TopicPhase::Paused);

        f.transport.publish(
            &Topic::new("tokens"),
            LiveMessage::Merge {
                section: "new".into(),
                record: token("a", 1),
            },
        );
        f.orchestrator.pump();
        f.ticker.run_until_idle(8);

        assert_eq!(f.orchestrator.stats().dropped_paused, 1);
        assert_eq!(f.orchestrator.pending_batches(), (0, 0));
    }

    #[test]
    fn test_closed_rejects_triggers() {
        let mut f = fixture();
        f.orchestrator.on_filter_settings_changed(&FeedSettings::default()).unwrap();
        f.orchestrator.close();

        assert_eq!(f.orchestrator.phase(), TopicPhase::Closed);
        assert!(f.transport.live_handles(&Topic::new("tokens")).is_empty());
        assert!(matches!(
            f.orchestrator.refresh(),
            Err(SyncError::Closed(_))
        ));
    }
}
