use {
    crate::{
        clock::Clock,
        protocol::{Counts, Envelope, RecentEvent},
        rate::{RateEstimator, StaleSlotPolicy},
    },
    chrono::{DateTime, Utc},
    serde::Serialize,
    std::{
        collections::{BTreeMap, HashMap, VecDeque},
        sync::Arc,
    },
};

/// A recent event plus the time this client received it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentEntry {
    #[serde(flatten)]
    pub event: RecentEvent,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Maximum number of recent events kept in memory
    pub max_recent: usize,
    pub stale_slot_policy: StaleSlotPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_recent: 30,
            stale_slot_policy: StaleSlotPolicy::default(),
        }
    }
}

/// Point-in-time copy of every view, maps in key order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub live: Vec<RecentEntry>,
    pub lifetime: BTreeMap<String, Counts>,
    pub global: Counts,
    pub project: BTreeMap<String, Counts>,
    pub current_scan_rate: f64,
}

/// Aggregate views over the live stats stream
///
/// Only `merge` and `reset` mutate the views. Snapshot fields replace a view
/// wholesale, the `live_new` delta is then folded on top of whatever the
/// views hold.
pub struct AggregateStore {
    live: VecDeque<RecentEntry>,
    lifetime: HashMap<String, Counts>,
    global: Counts,
    project: HashMap<String, Counts>,
    rate: RateEstimator,
    max_recent: usize,
    clock: Arc<dyn Clock>,
}

impl AggregateStore {
    pub fn new(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            live: VecDeque::with_capacity(config.max_recent + 1),
            lifetime: HashMap::new(),
            global: Counts::default(),
            project: HashMap::new(),
            rate: RateEstimator::new(config.stale_slot_policy),
            max_recent: config.max_recent,
            clock,
        }
    }

    /// Apply one decoded message. Returns `true` if any view changed.
    pub fn merge(&mut self, envelope: Envelope) -> bool {
        if envelope.is_empty() {
            return false;
        }

        let now = self.clock.now();

        if let Some(live) = envelope.live_snapshot {
            self.live = live
                .into_iter()
                .take(self.max_recent)
                .map(|event| RecentEntry { event, received_at: now })
                .collect();
        }

        if let Some(lifetime) = envelope.lifetime_snapshot {
            self.lifetime = lifetime;
        }

        if let Some(global) = envelope.global_snapshot {
            self.global = global;
        }

        if let Some(project) = envelope.project_snapshot {
            self.project = project;
        }

        if let Some(delta) = envelope.delta {
            self.apply_delta(delta, now);
        }

        true
    }

    fn apply_delta(&mut self, event: RecentEvent, now: DateTime<Utc>) {
        let (found, scanned) = (event.found, event.scanned);

        self.lifetime
            .entry(event.username.clone())
            .or_default()
            .add(found, scanned);

        self.global.add(found, scanned);

        self.project
            .entry(event.project.clone())
            .or_default()
            .add(found, scanned);

        self.live.push_front(RecentEntry { event, received_at: now });
        self.live.truncate(self.max_recent);

        self.rate.sample(scanned, now);
    }

    /// Clear every view, including the rate buffer
    pub fn reset(&mut self) {
        self.live.clear();
        self.lifetime.clear();
        self.global = Counts::default();
        self.project.clear();
        self.rate.reset();
    }

    /// Recent events, most recent first
    pub fn live(&self) -> impl ExactSizeIterator<Item = &RecentEntry> {
        self.live.iter()
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn lifetime(&self) -> &HashMap<String, Counts> {
        &self.lifetime
    }

    pub fn global(&self) -> Counts {
        self.global
    }

    pub fn project(&self) -> &HashMap<String, Counts> {
        &self.project
    }

    pub fn current_scan_rate(&self) -> f64 {
        self.rate.current_rate_at(self.clock.now())
    }

    pub fn max_recent(&self) -> usize {
        self.max_recent
    }

    /// Whether the global scanned total agrees with both keyed views
    pub fn totals_consistent(&self) -> bool {
        let by_user: u64 = self.lifetime.values().map(|c| c.scanned).sum();
        let by_project: u64 = self.project.values().map(|c| c.scanned).sum();
        self.global.scanned == by_user && self.global.scanned == by_project
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            live: self.live.iter().cloned().collect(),
            lifetime: self.lifetime.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            global: self.global,
            project: self.project.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            current_scan_rate: self.current_scan_rate(),
        }
    }
}
