//! Live stats connection lifecycle
//!
//! `Connecting -> Live` on open, `Live -> Disconnected` on error or close,
//! `Disconnected -> Connecting` once the single outstanding reconnect timer
//! fires. There is no terminal state.

pub mod backoff;
pub mod controller;
pub mod timer;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use controller::{
    ConnectionController, ConnectionState, ControllerConfig, ControllerStats, ReconnectPolicy,
};
pub use timer::{ReconnectDue, TimerHandle};
pub use transport::{FrameStream, Transport, TransportError, WebSocketTransport};

use {crate::config::ConfigError, url::Url};

/// WebSocket URL for `endpoint` on the host serving `page`
///
/// `https` pages connect with `wss`, `http` pages with `ws`.
pub fn endpoint_url(page: &Url, endpoint: &str) -> Result<Url, ConfigError> {
    let scheme = match page.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ConfigError::InvalidValue(format!(
                "page URL scheme must be http or https, got {}",
                other
            )))
        }
    };

    let host = page
        .host_str()
        .ok_or_else(|| ConfigError::InvalidValue(format!("page URL has no host: {}", page)))?;

    let authority = match page.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{}", endpoint)
    };

    Url::parse(&format!("{}://{}{}", scheme, authority, path))
        .map_err(|e| ConfigError::InvalidValue(format!("invalid endpoint URL: {}", e)))
}
