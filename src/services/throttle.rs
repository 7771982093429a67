//! Flush throttle: bounds how often buffered console text reaches the sink.
//!
//! Every buffer mutation asks the throttle what to do:
//!
//! - at least one interval since the last flush: flush now (cancelling any
//!   timer still outstanding),
//! - otherwise, if no flush is pending: schedule one for the end of the
//!   current window,
//! - otherwise: nothing, the pending flush will pick the mutation up.
//!
//! So at most one flush happens per window, and the first mutation of a burst
//! is rendered no later than one interval after the previous flush.
//!
//! The throttle only does bookkeeping. Running the timer is the caller's job.

use std::time::{Duration, Instant};

/// Default minimum spacing between two flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(16);

/// Slack allowed on the timer-fire invariant.
const TIMER_TOLERANCE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    /// No flush pending. `last_flush` is `None` until the first flush.
    Idle { last_flush: Option<Instant> },
    /// A flush is scheduled for `due`.
    Pending {
        last_flush: Option<Instant>,
        due: Instant,
    },
}

/// What the caller must do after a buffer mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Render now. If `cancel_pending` is set, an outstanding flush timer must
    /// be cancelled first.
    Immediate { cancel_pending: bool },
    /// Schedule a flush after the given delay.
    Schedule(Duration),
    /// A flush is already scheduled; nothing to do.
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct FlushThrottle {
    interval: Duration,
    state: ThrottleState,
}

impl Default for FlushThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

impl FlushThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: ThrottleState::Idle { last_flush: None },
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> ThrottleState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ThrottleState::Pending { .. })
    }

    pub fn last_flush(&self) -> Option<Instant> {
        match self.state {
            ThrottleState::Idle { last_flush } | ThrottleState::Pending { last_flush, .. } => {
                last_flush
            }
        }
    }

    /// Record a buffer mutation at `now` and decide how to flush it.
    pub fn on_mutation(&mut self, now: Instant) -> FlushDecision {
        let last_flush = self.last_flush();
        let delta = last_flush.map(|t| now.saturating_duration_since(t));

        match delta {
            Some(delta) if delta < self.interval => match self.state {
                ThrottleState::Pending { .. } => FlushDecision::Coalesced,
                ThrottleState::Idle { .. } => {
                    let wait = self.interval - delta;
                    self.state = ThrottleState::Pending {
                        last_flush,
                        due: now + wait,
                    };
                    FlushDecision::Schedule(wait)
                }
            },
            _ => {
                let cancel_pending = self.is_pending();
                self.state = ThrottleState::Idle {
                    last_flush: Some(now),
                };
                FlushDecision::Immediate { cancel_pending }
            }
        }
    }

    /// Record that the scheduled flush fired at `now`. The caller renders.
    pub fn on_timer_fired(&mut self, now: Instant) {
        if let Some(last) = self.last_flush() {
            // A timer firing early means the scheduler is broken, not the input.
            debug_assert!(
                now.saturating_duration_since(last) + TIMER_TOLERANCE >= self.interval,
                "flush timer fired {:?} after the previous flush, interval is {:?}",
                now.saturating_duration_since(last),
                self.interval
            );
        }
        self.state = ThrottleState::Idle {
            last_flush: Some(now),
        };
    }

    /// Drop a pending flush without rendering. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            ThrottleState::Pending { last_flush, .. } => {
                self.state = ThrottleState::Idle { last_flush };
                true
            }
            ThrottleState::Idle { .. } => false,
        }
    }
}
