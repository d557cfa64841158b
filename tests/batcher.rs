//! Integration tests for frame-aligned batching.

use proptest::prelude::*;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tick_sync::batcher::{Batcher, FrameTicker};

type Flushed = Rc<RefCell<Vec<Vec<u32>>>>;

fn recording(ticker: &FrameTicker) -> (Batcher<u32>, Flushed) {
    let flushed: Flushed = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&flushed);
    let batcher = Batcher::new("test", Rc::new(ticker.clone()), move |batch: Vec<u32>| {
        sink.borrow_mut().push(batch);
    });
    (batcher, flushed)
}

#[test]
fn test_same_tick_adds_flush_once_in_order() {
    let ticker = FrameTicker::new();
    let (batcher, flushed) = recording(&ticker);

    for i in 1..=5 {
        batcher.add(i);
    }
    assert_eq!(ticker.pending(), 1);
    assert!(flushed.borrow().is_empty());

    ticker.run_tick();
    assert_eq!(*flushed.borrow(), vec![vec![1, 2, 3, 4, 5]]);
    assert_eq!(batcher.stats().flushes, 1);
    assert_eq!(batcher.stats().items_delivered, 5);
}

#[test]
fn test_separate_ticks_flush_separately() {
    let ticker = FrameTicker::new();
    let (batcher, flushed) = recording(&ticker);

    batcher.add(1);
    ticker.run_tick();
    batcher.add(2);
    batcher.add(3);
    ticker.run_tick();

    assert_eq!(*flushed.borrow(), vec![vec![1], vec![2, 3]]);
}

#[test]
fn test_add_during_flush_goes_to_next_tick() {
    let ticker = FrameTicker::new();
    let flushed: Flushed = Rc::new(RefCell::new(Vec::new()));
    let slot: Rc<RefCell<Option<Batcher<u32>>>> = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&flushed);
    let reentry = Rc::clone(&slot);
    let batcher = Batcher::new("reentrant", Rc::new(ticker.clone()), move |batch: Vec<u32>| {
        if batch.contains(&1) {
            if let Some(batcher) = reentry.borrow().as_ref() {
                batcher.add(100);
                batcher.add(101);
            }
        }
        sink.borrow_mut().push(batch);
    });
    *slot.borrow_mut() = Some(batcher.clone());

    batcher.add(1);
    batcher.add(2);
    ticker.run_tick();

    assert_eq!(*flushed.borrow(), vec![vec![1, 2]]);
    assert_eq!(batcher.pending(), 2);
    assert!(batcher.is_scheduled());

    ticker.run_tick();
    assert_eq!(*flushed.borrow(), vec![vec![1, 2], vec![100, 101]]);

    slot.borrow_mut().take();
}

#[test]
fn test_clear_discards_and_cancels() {
    let ticker = FrameTicker::new();
    let (batcher, flushed) = recording(&ticker);

    batcher.add(1);
    batcher.add(2);
    batcher.clear();
    assert_eq!(batcher.pending(), 0);
    assert!(!batcher.is_scheduled());

    ticker.run_until_idle(4);
    assert!(flushed.borrow().is_empty());
    assert_eq!(batcher.stats().cleared, 2);

    // Adds after a clear schedule a fresh flush.
    batcher.add(3);
    ticker.run_tick();
    assert_eq!(*flushed.borrow(), vec![vec![3]]);
}

#[test]
fn test_dropped_batcher_task_is_noop() {
    let ticker = FrameTicker::new();
    let (batcher, flushed) = recording(&ticker);

    batcher.add(1);
    drop(batcher);
    ticker.run_until_idle(4);

    assert!(flushed.borrow().is_empty());
}

#[test]
fn test_panicking_callback_leaves_batcher_usable() {
    let ticker = FrameTicker::new();
    let flushed: Flushed = Rc::new(RefCell::new(Vec::new()));
    let slot: Rc<RefCell<Option<Batcher<u32>>>> = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&flushed);
    let reentry = Rc::clone(&slot);
    let batcher = Batcher::new("panicky", Rc::new(ticker.clone()), move |batch: Vec<u32>| {
        if batch.contains(&13) {
            if let Some(batcher) = reentry.borrow().as_ref() {
                batcher.add(2);
            }
            panic!("unlucky batch");
        }
        sink.borrow_mut().push(batch);
    });
    *slot.borrow_mut() = Some(batcher.clone());

    batcher.add(13);
    let result = panic::catch_unwind(AssertUnwindSafe(|| ticker.run_tick()));
    assert!(result.is_err());

    // The item added during the failed flush gets its own flush.
    assert_eq!(batcher.pending(), 1);
    assert!(batcher.is_scheduled());
    ticker.run_until_idle(8);
    assert_eq!(*flushed.borrow(), vec![vec![2]]);

    batcher.add(3);
    ticker.run_tick();
    assert_eq!(*flushed.borrow(), vec![vec![2], vec![3]]);

    slot.borrow_mut().take();
}

proptest! {
    #[test]
    fn prop_one_flush_per_tick(n in 1usize..200) {
        let ticker = FrameTicker::new();
        let (batcher, flushed) = recording(&ticker);

        let items: Vec<u32> = (0..n as u32).collect();
        for &i in &items {
            batcher.add(i);
        }
        ticker.run_tick();

        prop_assert_eq!(flushed.borrow().len(), 1);
        prop_assert_eq!(&flushed.borrow()[0], &items);
    }
}
