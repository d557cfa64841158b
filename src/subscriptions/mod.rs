//! Live subscriptions feeding the section store.
//!
//! A [`TopicOrchestrator`] owns one topic: it derives a [`FilterPayload`]
//! from user [`FeedSettings`], hydrates the store from a snapshot, opens a
//! live feed through a [`FeedTransport`], and routes live messages through
//! two batchers into the store. Superseded handles are dropped on the owning
//! thread, so a filter change never leaks records from the old feed.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use serde_json::json;
//! use tick_sync::batcher::FrameTicker;
//! use tick_sync::subscriptions::{FeedSettings, LiveMessage, MemoryTransport, TopicOrchestrator};
//! use tick_sync::{SectionSpec, StoreConfig, SyncConfig, Topic};
//!
//! let ticker = FrameTicker::new();
//! let transport = Arc::new(MemoryTransport::new());
//! let config = SyncConfig {
//!     store: StoreConfig::with_sections(vec![SectionSpec::new("new")]),
//!     ..Default::default()
//! };
//! let topic = Topic::new("tokens");
//! let mut orchestrator =
//!     TopicOrchestrator::new(topic.clone(), config, transport.clone(), Rc::new(ticker.clone()))?;
//!
//! orchestrator.on_filter_settings_changed(&FeedSettings::default())?;
//! transport.publish(&topic, LiveMessage::Merge {
//!     section: "new".into(),
//!     record: json!({"address": "0x1", "chain": "sol", "createdAt": 1}),
//! });
//!
//! orchestrator.pump();
//! ticker.run_until_idle(4);
//! assert_eq!(orchestrator.section(&"new".into())?.len(), 1);
//! # Ok::<(), tick_sync::SyncError>(())
//! ```

mod filter;
mod memory;
mod orchestrator;
mod transport;
mod types;

pub use filter::{DerivedFilter, FeedSettings, FilterFingerprint, FilterPayload, MetricRange};
pub use memory::MemoryTransport;
pub use orchestrator::{OrchestratorStats, TopicOrchestrator, TopicPhase};
pub use transport::FeedTransport;
pub use types::{
    HandleState, LiveMessage, MessageSink, SnapshotPayload, SnapshotReply, SubscriptionHandle,
};
