//! Frame-aligned coalescing queue.

use super::scheduler::{TickScheduler, TickToken};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

/// Counters for one batcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Callback invocations.
    pub flushes: u64,
    /// Items handed to the callback.
    pub items_delivered: u64,
    /// Items discarded by `clear`.
    pub cleared: u64,
}

struct BatchState<T> {
    queue: Vec<T>,
    scheduled: Option<TickToken>,
    flushing: bool,
    /// Bumped by `clear`; tasks from an older generation do nothing.
    generation: u64,
    stats: BatcherStats,
}

struct Shared<T> {
    name: String,
    scheduler: Rc<dyn TickScheduler>,
    state: RefCell<BatchState<T>>,
    callback: RefCell<Box<dyn FnMut(Vec<T>)>>,
}

/// Ends a flush, on return or unwind: clears the flushing flag and
/// schedules a follow-up flush for items added meanwhile.
struct FlushGuard<'a, T: 'static> {
    shared: &'a Rc<Shared<T>>,
}

impl<T: 'static> Drop for FlushGuard<'_, T> {
    fn drop(&mut self) {
        let reschedule = {
            let mut state = self.shared.state.borrow_mut();
            state.flushing = false;
            !state.queue.is_empty() && state.scheduled.is_none()
        };
        if reschedule {
            schedule(self.shared);
        }
    }
}

/// Queues items and delivers them to a callback at most once per tick.
///
/// Items added while the callback runs are held for a new flush scheduled
/// after the current one returns; they never join the in-flight batch.
pub struct Batcher<T: 'static> {
    shared: Rc<Shared<T>>,
}

impl<T: 'static> Batcher<T> {
    /// Create a batcher delivering to `callback`. A panicking callback loses
    /// its batch but leaves the batcher usable.
    pub fn new<F>(name: impl Into<String>, scheduler: Rc<dyn TickScheduler>, callback: F) -> Self
    where
        F: FnMut(Vec<T>) + 'static,
    {
        Self {
            shared: Rc::new(Shared {
                name: name.into(),
                scheduler,
                state: RefCell::new(BatchState {
                    queue: Vec::new(),
                    scheduled: None,
                    flushing: false,
                    generation: 0,
                    stats: BatcherStats::default(),
                }),
                callback: RefCell::new(Box::new(callback)),
            }),
        }
    }

    /// Queue an item, scheduling a flush if none is scheduled or running.
    pub fn add(&self, item: T) {
        let needs_schedule = {
            let mut state = self.shared.state.borrow_mut();
            state.queue.push(item);
            state.scheduled.is_none() && !state.flushing
        };

        if needs_schedule {
            schedule(&self.shared);
        }
    }

    /// Cancel the pending flush and discard queued items without delivering them.
    pub fn clear(&self) {
        let token = {
            let mut state = self.shared.state.borrow_mut();
            state.generation += 1;
            state.stats.cleared += state.queue.len() as u64;
            state.queue.clear();
            state.scheduled.take()
        };

        if let Some(token) = token {
            self.shared.scheduler.cancel(token);
        }
        trace!(batcher = %self.shared.name, "cleared");
    }

    /// Items waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.shared.state.borrow().queue.len()
    }

    pub fn is_scheduled(&self) -> bool {
        self.shared.state.borrow().scheduled.is_some()
    }

    pub fn stats(&self) -> BatcherStats {
        self.shared.state.borrow().stats
    }
}

fn schedule<T: 'static>(shared: &Rc<Shared<T>>) {
    let weak: Weak<Shared<T>> = Rc::downgrade(shared);
    let generation = shared.state.borrow().generation;

    let token = shared.scheduler.schedule_once(Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            flush(&shared, generation);
        }
    }));

    shared.state.borrow_mut().scheduled = Some(token);
}

/// Swap the queue out, then hand the swapped batch to the callback.
fn flush<T: 'static>(shared: &Rc<Shared<T>>, generation: u64) {
    let batch = {
        let mut state = shared.state.borrow_mut();
        if state.generation != generation || state.flushing {
            return;
        }
        state.scheduled = None;
        if state.queue.is_empty() {
            return;
        }
        state.flushing = true;
        state.stats.flushes += 1;
        state.stats.items_delivered += state.queue.len() as u64;
        std::mem::take(&mut state.queue)
    };

    trace!(batcher = %shared.name, items = batch.len(), "flush");
    let _guard = FlushGuard { shared };
    let mut callback = shared.callback.borrow_mut();
    (*callback)(batch);
}

impl<T: 'static> Clone for Batcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::FrameTicker;

    fn recording_batcher(ticker: &FrameTicker) -> (Batcher<u32>, Rc<RefCell<Vec<Vec<u32>>>>) {
        let flushed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&flushed);
        let batcher = Batcher::new("test", Rc::new(ticker.clone()), move |batch| {
            sink.borrow_mut().push(batch)
        });
        (batcher, flushed)
    }

    #[test]
    fn test_single_flush_per_tick() {
        let ticker = FrameTicker::new();
        let (batcher, flushed) = recording_batcher(&ticker);

        for i in 1..=5 {
            batcher.add(i);
        }
        assert_eq!(ticker.pending(), 1);
        assert!(flushed.borrow().is_empty());

        ticker.run_tick();
        assert_eq!(*flushed.borrow(), vec![vec![1, 2, 3, 4, 5]]);
        assert_eq!(batcher.stats().flushes, 1);
        assert_eq!(batcher.stats().items_delivered, 5);
        assert!(!batcher.is_scheduled());
    }

    #[test]
    fn test_clear_discards() {
        let ticker = FrameTicker::new();
        let (batcher, flushed) = recording_batcher(&ticker);

        batcher.add(1);
        batcher.add(2);
        batcher.clear();
        assert_eq!(ticker.pending(), 0);
        assert_eq!(batcher.pending(), 0);

        batcher.add(3);
        ticker.run_tick();
        assert_eq!(*flushed.borrow(), vec![vec![3]]);
        assert_eq!(batcher.stats().cleared, 2);
    }

    #[test]
    fn test_no_flush_without_items() {
        let ticker = FrameTicker::new();
        let (_batcher, flushed) = recording_batcher(&ticker);
        ticker.run_tick();
        assert!(flushed.borrow().is_empty());
    }
}
