//! # Tick Sync
//!
//! Client-side synchronization core for ranked live feeds.
//!
//! ## Core Concepts
//!
//! - **Sections**: Bounded, newest-first record lists deduplicated by key
//! - **Batchers**: Coalesce bursts of updates into one apply per frame tick
//! - **Orchestrator**: Hydrates, subscribes, and resubscribes a topic as its
//!   filter changes, discarding traffic from superseded handles
//!
//! Everything that touches the store runs on one owning thread. Transports
//! may run anywhere; their deliveries are marshaled through a channel that
//! [`TopicOrchestrator::pump`] drains.

pub mod batcher;
pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use batcher::{Batcher, BatcherStats, FrameTicker, TickScheduler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OrchestratorConfig, SectionSpec, StoreConfig, SyncConfig};
pub use error::{ErrorClass, Result, SyncError};
pub use store::{MergeOutcome, Section, SectionStore, StoreEvent, StoreWatch};
pub use subscriptions::{
    FeedSettings, FeedTransport, LiveMessage, MemoryTransport, TopicOrchestrator, TopicPhase,
};
pub use types::*;
