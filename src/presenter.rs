use crate::store::AggregateStore;

pub const UNAVAILABLE_NOTICE: &str = "Sorry, live stat updates is currently unavailable.";

/// Presentation-side observer of the stats client
///
/// `on_sync` is called by the throttle when a render is due and reads the
/// store's current state. `on_availability` follows the connection state.
pub trait Presenter: Send {
    fn on_sync(&mut self, stats: &AggregateStore);

    fn on_availability(&mut self, _available: bool) {}
}

/// Presenter that writes a summary of each sync to the log
pub struct LogPresenter {
    top_users: usize,
}

impl LogPresenter {
    pub fn new(top_users: usize) -> Self {
        Self { top_users }
    }
}

impl Presenter for LogPresenter {
    fn on_sync(&mut self, stats: &AggregateStore) {
        let global = stats.global();
        log::info!(
            "📊 found={} scanned={} rate={:.1}/s recent={} users={} projects={}",
            global.found,
            global.scanned,
            stats.current_scan_rate(),
            stats.live_len(),
            stats.lifetime().len(),
            stats.project().len()
        );

        let mut users: Vec<_> = stats.lifetime().iter().collect();
        users.sort_by(|a, b| b.1.scanned.cmp(&a.1.scanned).then_with(|| a.0.cmp(b.0)));
        for (rank, (user, counts)) in users.iter().take(self.top_users).enumerate() {
            log::info!("   #{} {} found={} scanned={}", rank + 1, user, counts.found, counts.scanned);
        }

        if log::log_enabled!(log::Level::Trace) {
            match serde_json::to_string(&stats.snapshot()) {
                Ok(json) => log::trace!("Stats snapshot: {}", json),
                Err(e) => log::warn!("Failed to serialize stats snapshot: {}", e),
            }
        }
    }

    fn on_availability(&mut self, available: bool) {
        if available {
            log::info!("✅ Live stat updates available");
        } else {
            log::warn!("{}", UNAVAILABLE_NOTICE);
        }
    }
}
