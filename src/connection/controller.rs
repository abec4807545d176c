use {
    super::{
        backoff::ReconnectBackoff,
        timer::{ReconnectDue, ReconnectScheduler, TimerHandle},
        transport::{FrameStream, Transport, TransportError},
    },
    crate::{
        clock::Clock,
        presenter::Presenter,
        protocol::decode,
        store::{AggregateStore, StoreConfig},
        throttle::{SyncDecision, SyncThrottle, ThrottleConfig},
    },
    std::{future::Future, pin::Pin, sync::Arc, time::Duration},
    tokio::sync::mpsc,
    url::Url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Live,
    Disconnected,
}

/// What to do with accumulated stats when a dropped connection comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Keep showing the old aggregates until the server resends them
    #[default]
    KeepStale,
    /// Clear the store before merging anything from the new connection
    ResetOnReconnect,
}

impl ReconnectPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "keep" => Some(ReconnectPolicy::KeepStale),
            "reset" => Some(ReconnectPolicy::ResetOnReconnect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    pub store: StoreConfig,
    pub throttle: ThrottleConfig,
    pub backoff: ReconnectBackoff,
    pub reconnect_policy: ReconnectPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub connections_opened: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub reconnects_scheduled: u64,
}

enum LoopEvent {
    Shutdown,
    Opened(Box<dyn FrameStream>),
    ConnectFailed(TransportError),
    Frame(Option<Result<String, TransportError>>),
    ReconnectDue(ReconnectDue),
    FlushDue,
}

/// Owns the connection lifecycle and the stats store
///
/// All mutation happens on the task running `run`: inbound frames, reconnect
/// timers and throttled syncs are handled one at a time in arrival order.
pub struct ConnectionController {
    url: Url,
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    store: AggregateStore,
    throttle: SyncThrottle,
    presenters: Vec<Box<dyn Presenter>>,
    backoff: ReconnectBackoff,
    reconnect_delay: Duration,
    policy: ReconnectPolicy,
    scheduler: ReconnectScheduler,
    reconnect_rx: mpsc::UnboundedReceiver<ReconnectDue>,
    pending_reconnect: Option<TimerHandle>,
    has_been_live: bool,
    available: Option<bool>,
    stats: ControllerStats,
}

impl ConnectionController {
    pub fn new(
        url: Url,
        transport: Arc<dyn Transport>,
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (scheduler, reconnect_rx) = ReconnectScheduler::channel();
        let mut backoff = config.backoff;
        let reconnect_delay = backoff.next_delay();
        backoff.reset();

        Self {
            url,
            transport,
            state: ConnectionState::Connecting,
            store: AggregateStore::new(config.store, clock.clone()),
            throttle: SyncThrottle::new(config.throttle, clock),
            presenters: Vec::new(),
            backoff,
            reconnect_delay,
            policy: config.reconnect_policy,
            scheduler,
            reconnect_rx,
            pending_reconnect: None,
            has_been_live: false,
            available: None,
            stats: ControllerStats::default(),
        }
    }

    pub fn subscribe(&mut self, presenter: Box<dyn Presenter>) {
        self.presenters.push(presenter);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Id of the one outstanding reconnect timer, if any
    pub fn pending_reconnect(&self) -> Option<u64> {
        self.pending_reconnect.as_ref().map(TimerHandle::id)
    }

    /// Drive the connection until `shutdown` resolves; returns the controller for inspection
    pub async fn run<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut frames: Option<Box<dyn FrameStream>> = None;
        let mut connecting: Option<ConnectFuture> = None;

        loop {
            if self.state == ConnectionState::Connecting && connecting.is_none() {
                log::info!("🔌 Connecting to live stats: {}", self.url);
                connecting = Some(connect(self.transport.clone(), self.url.clone()));
            }

            let flush_in = self.throttle.time_until_due();
            let event = tokio::select! {
                _ = &mut shutdown => LoopEvent::Shutdown,
                result = pending_connect(&mut connecting) => match result {
                    Ok(stream) => LoopEvent::Opened(stream),
                    Err(e) => LoopEvent::ConnectFailed(e),
                },
                frame = next_frame(&mut frames) => LoopEvent::Frame(frame),
                Some(due) = self.reconnect_rx.recv() => LoopEvent::ReconnectDue(due),
                _ = sleep_for(flush_in) => LoopEvent::FlushDue,
            };

            match event {
                LoopEvent::Shutdown => break,
                LoopEvent::Opened(stream) => {
                    connecting = None;
                    frames = Some(stream);
                    self.handle_open();
                }
                LoopEvent::ConnectFailed(e) => {
                    connecting = None;
                    self.handle_disconnect(&e.to_string());
                }
                LoopEvent::Frame(Some(Ok(text))) => {
                    self.handle_frame(&text);
                }
                LoopEvent::Frame(Some(Err(e))) => {
                    frames = None;
                    self.handle_disconnect(&e.to_string());
                }
                LoopEvent::Frame(None) => {
                    frames = None;
                    self.handle_disconnect("connection closed");
                }
                LoopEvent::ReconnectDue(due) => {
                    self.handle_reconnect_due(due);
                }
                LoopEvent::FlushDue => self.flush(),
            }
        }

        if let Some(timer) = self.pending_reconnect.take() {
            timer.cancel();
        }
        log::info!(
            "Live stats client stopped (frames={}, dropped={}, reconnects={})",
            self.stats.frames_received,
            self.stats.frames_dropped,
            self.stats.reconnects_scheduled
        );
        self
    }

    /// Connection opened: go live and clear the unavailable signal
    pub fn handle_open(&mut self) {
        if let Some(timer) = self.pending_reconnect.take() {
            timer.cancel();
        }

        if self.has_been_live && self.policy == ReconnectPolicy::ResetOnReconnect {
            log::info!("Clearing stats until the server resends them");
            self.store.reset();
            self.notify_change();
        }

        self.state = ConnectionState::Live;
        self.has_been_live = true;
        self.backoff.reset();
        self.stats.connections_opened += 1;
        log::info!("✅ Live stats connected: {}", self.url);

        self.set_available(true);
    }

    /// Decode and merge one inbound frame. Returns `true` if the store changed.
    pub fn handle_frame(&mut self, raw: &str) -> bool {
        self.stats.frames_received += 1;

        let envelope = match decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.frames_dropped += 1;
                log::warn!("Dropping stats message: {}", e);
                return false;
            }
        };

        let had_snapshot = envelope.has_snapshot();
        let changed = self.store.merge(envelope);

        if had_snapshot && !self.store.totals_consistent() {
            log::warn!(
                "Stats snapshot totals disagree (global scanned={})",
                self.store.global().scanned
            );
        }

        if changed {
            log::debug!("Merged stats message (recent={})", self.store.live_len());
            self.notify_change();
        }
        changed
    }

    /// Connection failed or closed: signal unavailability and schedule one reconnect
    pub fn handle_disconnect(&mut self, reason: &str) {
        let was = self.state;
        self.state = ConnectionState::Disconnected;

        if was != ConnectionState::Disconnected {
            self.reconnect_delay = self.backoff.next_delay();
        }
        self.set_available(false);

        if let Some(timer) = self.pending_reconnect.take() {
            log::debug!("Rescheduling pending reconnect {}", timer.id());
            timer.cancel();
        }

        let timer = self.scheduler.schedule(self.reconnect_delay);
        log::warn!(
            "❌ Live stats disconnected ({}), reconnecting in {:?}",
            reason,
            self.reconnect_delay
        );
        self.pending_reconnect = Some(timer);
        self.stats.reconnects_scheduled += 1;
    }

    /// A reconnect timer fired. Returns `true` if it was the pending one.
    pub fn handle_reconnect_due(&mut self, due: ReconnectDue) -> bool {
        match self.pending_reconnect.take() {
            Some(timer) if timer.id() == due.0 => {
                self.state = ConnectionState::Connecting;
                true
            }
            other => {
                log::debug!("Ignoring stale reconnect timer {}", due.0);
                self.pending_reconnect = other;
                false
            }
        }
    }

    /// Run a coalesced sync if it is due
    pub fn flush(&mut self) {
        let store = &self.store;
        let presenters = &mut self.presenters;
        let decision = self.throttle.flush(|| sync_presenters(presenters, store));
        log::trace!("Throttle flush: {:?}", decision);
    }

    fn set_available(&mut self, available: bool) {
        if self.available == Some(available) {
            return;
        }
        self.available = Some(available);
        for presenter in self.presenters.iter_mut() {
            presenter.on_availability(available);
        }
    }

    fn notify_change(&mut self) {
        let store = &self.store;
        let presenters = &mut self.presenters;
        match self.throttle.notify(|| sync_presenters(presenters, store)) {
            SyncDecision::Synced { cost } => log::trace!("Synced presenters in {:?}", cost),
            decision => log::trace!("Throttle: {:?}", decision),
        }
    }
}

fn sync_presenters(presenters: &mut [Box<dyn Presenter>], store: &AggregateStore) {
    for presenter in presenters.iter_mut() {
        presenter.on_sync(store);
    }
}

type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn FrameStream>, TransportError>> + Send>>;

/// An owned connect attempt, kept across loop iterations so a flush does not restart it
fn connect(transport: Arc<dyn Transport>, url: Url) -> ConnectFuture {
    Box::pin(async move { transport.connect(&url).await })
}

async fn pending_connect(
    connecting: &mut Option<ConnectFuture>,
) -> Result<Box<dyn FrameStream>, TransportError> {
    match connecting {
        Some(attempt) => attempt.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    frames: &mut Option<Box<dyn FrameStream>>,
) -> Option<Result<String, TransportError>> {
    match frames {
        Some(stream) => stream.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
