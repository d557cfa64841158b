//! "Run once, soon" scheduling primitive.

use std::cell::RefCell;
use std::rc::Rc;

/// Work scheduled for the next tick.
pub type TickTask = Box<dyn FnOnce()>;

/// Token identifying a scheduled task, used for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickToken(pub u64);

/// Minimal scheduler capability the batcher depends on.
pub trait TickScheduler {
    /// Run `task` once on a later tick.
    fn schedule_once(&self, task: TickTask) -> TickToken;

    /// Cancel a task that has not run yet. Returns false if it already ran.
    fn cancel(&self, token: TickToken) -> bool;
}

#[derive(Default)]
struct TickerState {
    next_token: u64,
    pending: Vec<(TickToken, TickTask)>,
}

/// Host-driven tick source.
///
/// The host loop (render frame, event loop turn) calls [`FrameTicker::run_tick`];
/// tasks scheduled while a tick is running land in the next tick.
#[derive(Clone, Default)]
pub struct FrameTicker {
    state: Rc<RefCell<TickerState>>,
}

impl FrameTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every task scheduled before this call. Returns how many ran.
    pub fn run_tick(&self) -> usize {
        let tasks = std::mem::take(&mut self.state.borrow_mut().pending);
        let count = tasks.len();
        for (_, task) in tasks {
            task();
        }
        count
    }

    /// Run ticks until nothing is pending, bounded by `max_ticks`.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.pending() > 0 {
            self.run_tick();
            ticks += 1;
        }
        ticks
    }

    /// Tasks waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

impl TickScheduler for FrameTicker {
    fn schedule_once(&self, task: TickTask) -> TickToken {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let token = TickToken(state.next_token);
        state.pending.push((token, task));
        token
    }

    fn cancel(&self, token: TickToken) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.pending.len();
        state.pending.retain(|(t, _)| *t != token);
        state.pending.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_tasks_run_on_next_tick() {
        let ticker = FrameTicker::new();
        let ran = Rc::new(Cell::new(0));

        let counter = Rc::clone(&ran);
        ticker.schedule_once(Box::new(move || counter.set(counter.get() + 1)));
        assert_eq!(ran.get(), 0);

        assert_eq!(ticker.run_tick(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(ticker.run_tick(), 0);
    }

    #[test]
    fn test_scheduled_during_tick_defers() {
        let ticker = FrameTicker::new();
        let ran = Rc::new(Cell::new(0));

        let inner_ticker = ticker.clone();
        let counter = Rc::clone(&ran);
        ticker.schedule_once(Box::new(move || {
            let counter = Rc::clone(&counter);
            inner_ticker.schedule_once(Box::new(move || counter.set(counter.get() + 1)));
        }));

        ticker.run_tick();
        assert_eq!(ran.get(), 0);
        assert_eq!(ticker.pending(), 1);

        ticker.run_tick();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_cancel() {
        let ticker = FrameTicker::new();
        let ran = Rc::new(Cell::new(false));

        let flag = Rc::clone(&ran);
        let token = ticker.schedule_once(Box::new(move || flag.set(true)));
        assert!(ticker.cancel(token));
        assert!(!ticker.cancel(token));

        ticker.run_tick();
        assert!(!ran.get());
    }
}
