//! Injectable time sources
//!
//! The rate estimator buckets samples by wall-clock second-of-minute, while
//! the sync throttle measures elapsed time and render cost on a monotonic
//! reading so a stepped system clock cannot stall rendering. Both read time
//! through `Clock` instead of calling `Utc::now()` or `Instant::now()`
//! directly.

use {
    chrono::{DateTime, Duration, Utc},
    std::{
        sync::{Arc, Mutex},
        time::Instant,
    },
};

pub trait Clock: Send + Sync {
    /// Wall-clock time, used for bucketing and timestamps
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time, used for measuring intervals
    fn instant(&self) -> Instant;
}

/// Reads the system wall clock and tokio's monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        // Follows paused time in tokio tests, plain `Instant::now()` otherwise
        tokio::time::Instant::now().into_std()
    }
}

#[derive(Debug)]
struct ManualTime {
    wall: DateTime<Utc>,
    elapsed: std::time::Duration,
}

/// Settable clock shared between a test and the components under test
///
/// `advance` moves both readings forward; `set` only steps the wall clock,
/// the way an NTP correction would.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    time: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            time: Arc::new(Mutex::new(ManualTime {
                wall: start,
                elapsed: std::time::Duration::ZERO,
            })),
        }
    }

    /// Clock starting at the given Unix timestamp (seconds)
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.lock().wall = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.lock();
        time.wall += by;
        // Monotonic time never runs backwards
        if let Ok(by) = by.to_std() {
            time.elapsed += by;
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.advance(Duration::milliseconds(millis));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualTime> {
        // Poisoning only happens if a test panicked mid-update; the value is still usable.
        self.time.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().wall
    }

    fn instant(&self) -> Instant {
        self.origin + self.lock().elapsed
    }
}
