//! Adaptive render throttling
//!
//! Bounds how often presenters are asked to sync with the store. The interval
//! between syncs grows when a sync turns out to be slow and drops back to the
//! base interval once syncs are cheap again. Notifications that arrive before
//! the interval has elapsed are coalesced into a pending flag; the event loop
//! asks `time_until_due` and calls `flush` so the final state of a burst is
//! still presented.

use {
    crate::clock::Clock,
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Interval used while syncs are cheap
    pub base_interval: Duration,
    /// Sync cost above which the interval grows
    pub slow_threshold: Duration,
    /// Minimum interval once a sync was slow
    pub slow_floor: Duration,
    /// Upper bound on the cost-proportional part of a slow interval
    pub slow_cap: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(500),
            slow_threshold: Duration::from_millis(50),
            slow_floor: Duration::from_millis(1_000),
            slow_cap: Duration::from_millis(10_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// The presenters ran and took `cost`
    Synced { cost: Duration },
    /// Too soon since the last sync; the change is pending
    Coalesced,
    /// Nothing pending
    Idle,
}

pub struct SyncThrottle {
    config: ThrottleConfig,
    interval: Duration,
    last_sync: Option<Instant>,
    pending: bool,
    clock: Arc<dyn Clock>,
}

impl SyncThrottle {
    pub fn new(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            interval: config.base_interval,
            last_sync: None,
            pending: false,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The store changed: sync now if the interval has elapsed, otherwise coalesce
    pub fn notify<F: FnOnce()>(&mut self, sync: F) -> SyncDecision {
        self.pending = true;
        self.try_sync(sync)
    }

    /// Run a coalesced sync if it is due
    pub fn flush<F: FnOnce()>(&mut self, sync: F) -> SyncDecision {
        if !self.pending {
            return SyncDecision::Idle;
        }
        self.try_sync(sync)
    }

    /// How long until a pending sync may run; `None` when nothing is pending
    pub fn time_until_due(&self) -> Option<Duration> {
        if !self.pending {
            return None;
        }
        Some(self.interval.saturating_sub(self.elapsed(self.clock.instant())))
    }

    fn elapsed(&self, now: Instant) -> Duration {
        match self.last_sync {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::MAX,
        }
    }

    fn try_sync<F: FnOnce()>(&mut self, sync: F) -> SyncDecision {
        let started = self.clock.instant();
        if self.elapsed(started) < self.interval {
            return SyncDecision::Coalesced;
        }

        sync();

        let cost = self.clock.instant().saturating_duration_since(started);
        self.last_sync = Some(started);
        self.pending = false;
        self.adapt(cost);

        SyncDecision::Synced { cost }
    }

    fn adapt(&mut self, cost: Duration) {
        let next = if cost > self.config.slow_threshold {
            self.config.slow_floor + (cost * 2).min(self.config.slow_cap)
        } else {
            self.config.base_interval
        };

        if next != self.interval {
            log::debug!(
                "Sync took {}ms, interval {}ms -> {}ms",
                cost.as_millis(),
                self.interval.as_millis(),
                next.as_millis()
            );
        }
        self.interval = next;
    }
}
