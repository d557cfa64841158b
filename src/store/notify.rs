//! Change notification for store watchers.

use crate::types::SectionId;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Events delivered to store watchers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// One or more sections changed since the previous event.
    Changed {
        sections: Vec<SectionId>,
        revision: u64,
    },

    /// The watcher overflowed its buffer and was removed.
    Dropped,
}

/// Receiving side of a store watch.
pub struct StoreWatch {
    pub receiver: Receiver<StoreEvent>,
}

impl StoreWatch {
    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Fans change events out to watchers; slow watchers are dropped.
pub(crate) struct ChangeNotifier {
    watchers: Vec<Sender<StoreEvent>>,
    buffer_size: usize,
}

impl ChangeNotifier {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self {
            watchers: Vec::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    pub(crate) fn watch(&mut self) -> StoreWatch {
        let (sender, receiver) = bounded(self.buffer_size);
        self.watchers.push(sender);
        StoreWatch { receiver }
    }

    /// Send `event` to every watcher, removing those that cannot take it.
    pub(crate) fn broadcast(&mut self, event: StoreEvent) {
        self.watchers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("dropping slow store watcher");
                // Best effort, the buffer is usually still full.
                let _ = sender.try_send(StoreEvent::Dropped);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(revision: u64) -> StoreEvent {
        StoreEvent::Changed {
            sections: vec![SectionId::new("new")],
            revision,
        }
    }

    #[test]
    fn test_watch_receives_broadcast() {
        let mut notifier = ChangeNotifier::new(8);
        let watch = notifier.watch();
        assert_eq!(notifier.watchers.len(), 1);

        notifier.broadcast(changed(1));
        assert_eq!(watch.try_recv().unwrap(), changed(1));
        assert!(watch.try_recv().is_err());
    }

    #[test]
    fn test_drop_slow_watcher() {
        let mut notifier = ChangeNotifier::new(2);
        let watch = notifier.watch();
        for revision in 0..5 {
            notifier.broadcast(changed(revision));
        }
        assert_eq!(notifier.watchers.len(), 0);
        assert_eq!(watch.try_recv().unwrap(), changed(0));
    }

    #[test]
    fn test_disconnected_watcher_removed() {
        let mut notifier = ChangeNotifier::new(2);
        drop(notifier.watch());
        notifier.broadcast(changed(1));
        assert_eq!(notifier.watchers.len(), 0);
    }
}
