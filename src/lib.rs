//! Live statistics client for a distributed scanning tracker
//!
//! Consumes the tracker's live stats WebSocket, folds snapshot and delta
//! messages into aggregate views (recent events, per-user and per-project
//! totals, a global total and a trailing-minute scan rate) and tells
//! presenters when to re-render without letting event bursts trigger a render
//! per message.


pub mod clock;
pub mod config;
pub mod connection;
pub mod presenter;
pub mod protocol;
pub mod rate;
pub mod store;
pub mod throttle;

pub use {
    clock::{Clock, ManualClock, SystemClock},
    config::{Config, ConfigError},
    connection::{ConnectionController, ConnectionState, ControllerConfig, ReconnectPolicy},
    presenter::{LogPresenter, Presenter},
    protocol::{decode, Counts, DecodeError, Envelope, RecentEvent},
    rate::{RateEstimator, StaleSlotPolicy},
    store::{AggregateStore, RecentEntry, StatsSnapshot, StoreConfig},
    throttle::{SyncDecision, SyncThrottle, ThrottleConfig},
};
