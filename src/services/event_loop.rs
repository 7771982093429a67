//! Single-threaded event loop with one-shot timers.
//!
//! All console work runs on one thread. The only deferred work is timer
//! callbacks (`set_timeout`), which run when the loop is pumped with
//! [`EventLoop::run_due`] or one of the helpers built on it. Callbacks may
//! schedule or cancel other timers while running.

use super::time_source::SharedTimeSource;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Handle for a scheduled timer, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct Timer {
    due: Instant,
    callback: Box<dyn FnOnce()>,
}

pub struct EventLoop {
    time: SharedTimeSource,
    next_id: Cell<u64>,
    timers: RefCell<BTreeMap<TimerId, Timer>>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("time", &self.time)
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

impl EventLoop {
    pub fn new(time: SharedTimeSource) -> Self {
        Self {
            time,
            next_id: Cell::new(0),
            timers: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn time(&self) -> &SharedTimeSource {
        &self.time
    }

    pub fn now(&self) -> Instant {
        self.time.now()
    }

    /// Schedule `callback` to run once, `delay` from now.
    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let due = self.time.now() + delay;
        self.timers.borrow_mut().insert(
            id,
            Timer {
                due,
                callback: Box::new(callback),
            },
        );
        tracing::trace!("timer {:?} scheduled in {:?}", id, delay);
        id
    }

    /// Cancel a timer. Returns false if it already ran or was cancelled.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().remove(&id).is_some()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.borrow().contains_key(&id)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Earliest deadline among scheduled timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().values().map(|t| t.due).min()
    }

    /// Time left until the next timer is due (zero if already due).
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|due| due.saturating_duration_since(self.time.now()))
    }

    /// Run every timer whose deadline has passed, earliest first.
    ///
    /// Timers scheduled by a callback run in the same pass if they are already
    /// due. Returns the number of callbacks run.
    pub fn run_due(&self) -> usize {
        let mut ran = 0;
        while let Some(timer) = self.pop_due(self.time.now()) {
            (timer.callback)();
            ran += 1;
        }
        ran
    }

    /// Advance through `duration`, firing each timer at its own deadline.
    ///
    /// With a logical clock this is instant; with the real clock it blocks.
    pub fn run_for(&self, duration: Duration) -> usize {
        let end = self.time.now() + duration;
        let mut ran = self.run_due();
        while let Some(due) = self.next_deadline().filter(|due| *due <= end) {
            let now = self.time.now();
            if due > now {
                self.time.sleep(due - now);
            }
            ran += self.run_due();
        }
        let now = self.time.now();
        if end > now {
            self.time.sleep(end - now);
        }
        ran
    }

    /// Keep firing timers, sleeping to each deadline, until none remain.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = self.run_due();
        while let Some(wait) = self.time_until_next() {
            if !wait.is_zero() {
                self.time.sleep(wait);
            }
            ran += self.run_due();
        }
        ran
    }

    fn pop_due(&self, now: Instant) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let id = timers
            .iter()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(id, t)| (t.due, **id))
            .map(|(id, _)| *id)?;
        timers.remove(&id)
    }
}
