//! Frame-aligned batching.
//!
//! Producers call [`Batcher::add`] as often as they like; the batcher asks a
//! [`TickScheduler`] for a single future flush and hands everything queued
//! since the last flush to its callback, in arrival order.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tick_sync::batcher::{Batcher, FrameTicker};
//!
//! let ticker = FrameTicker::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let batcher = Batcher::new("ticks", Rc::new(ticker.clone()), move |batch: Vec<u32>| {
//!     sink.borrow_mut().push(batch);
//! });
//!
//! batcher.add(1);
//! batcher.add(2);
//! ticker.run_tick();
//! assert_eq!(*seen.borrow(), vec![vec![1, 2]]);
//! ```

mod queue;
mod scheduler;

pub use queue::{Batcher, BatcherStats};
pub use scheduler::{FrameTicker, TickScheduler, TickTask, TickToken};
