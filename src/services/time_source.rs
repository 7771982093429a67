//! Clocks for the flush throttle and the event loop.
//!
//! The throttle needs "time since last flush" and the loop needs to wait for
//! timer deadlines. Production uses the wall clock; tests use a logical clock
//! that only moves on `advance` or `sleep`, so a 16 ms window costs nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait TimeSource: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;

    /// Block for `duration`. The logical clock jumps forward instead.
    fn sleep(&self, duration: Duration);

    /// Time from `earlier` to now, zero if `earlier` is in the future.
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

pub type SharedTimeSource = Arc<dyn TimeSource>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeSource;

impl RealTimeSource {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedTimeSource {
        Arc::new(Self)
    }
}

impl TimeSource for RealTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Logical clock starting at zero.
///
/// ```
/// use serial_console::services::time_source::{TimeSource, TestTimeSource};
/// use std::time::Duration;
///
/// let clock = TestTimeSource::new();
/// let flushed_at = clock.now();
/// clock.sleep(Duration::from_millis(16));
/// assert_eq!(clock.elapsed_since(flushed_at), Duration::from_millis(16));
/// ```
#[derive(Debug)]
pub struct TestTimeSource {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl Default for TestTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Shared handle that keeps the concrete type, so tests can still
    /// `advance` it after handing a clone to the event loop.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Logical time since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }

    pub fn millis(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl TimeSource for TestTimeSource {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
