//! Contract with the network transport.

use super::filter::FilterPayload;
use super::types::{MessageSink, SnapshotReply};
use crate::error::Result;
use crate::types::{HandleId, Topic};

/// Snapshot fetches and live subscriptions for a topic.
///
/// Implementations own their I/O concurrency. Results flow back only through
/// the [`SnapshotReply`] and [`MessageSink`] they are handed, both of which
/// marshal onto the orchestrator's owning thread.
pub trait FeedTransport {
    /// Start a snapshot fetch; complete `reply` once, from any thread.
    fn fetch_snapshot(&self, topic: &Topic, filter: &FilterPayload, reply: SnapshotReply);

    /// Open a live feed delivering into `sink` until unsubscribed.
    ///
    /// Errors are classified by [`crate::SyncError::class`]:
    /// `SubscriptionNotFound` is retried on the next trigger, `Transport` is
    /// surfaced and retried, `Misconfiguration` is surfaced and not retried.
    fn subscribe_live(&self, topic: &Topic, filter: &FilterPayload, sink: MessageSink) -> Result<()>;

    /// Best effort; failures are logged by the caller and otherwise ignored.
    fn unsubscribe(&self, topic: &Topic, handle: HandleId) -> Result<()>;
}
