use {
    crate::{
        connection::{endpoint_url, ControllerConfig, ReconnectBackoff, ReconnectPolicy},
        rate::StaleSlotPolicy,
        store::StoreConfig,
        throttle::ThrottleConfig,
    },
    std::{env, time::Duration},
    url::Url,
};

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub page_url: Url,
    pub endpoint: String,
    pub max_display: usize,
    pub reconnect_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub reconnect_policy: ReconnectPolicy,
    pub stale_slot_policy: StaleSlotPolicy,
    pub sync_interval_ms: u64,
    pub slow_render_threshold_ms: u64,
    pub slow_render_floor_ms: u64,
    pub slow_render_cap_ms: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STATS_PAGE_URL` (required) - page whose host serves the stats socket
    /// - `STATS_ENDPOINT` (default: /api/live_stats)
    /// - `STATS_MAX_DISPLAY` (default: 30)
    /// - `RECONNECT_DELAY_SECS` (default: 60)
    /// - `RECONNECT_MAX_DELAY_SECS` (default: same as RECONNECT_DELAY_SECS)
    /// - `RECONNECT_POLICY` keep | reset (default: keep)
    /// - `RATE_STALE_SLOTS` retain | expire (default: retain)
    /// - `SYNC_INTERVAL_MS` (default: 500)
    /// - `SLOW_RENDER_THRESHOLD_MS` (default: 50)
    /// - `SLOW_RENDER_FLOOR_MS` (default: 1000)
    /// - `SLOW_RENDER_CAP_MS` (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let page_url = lookup("STATS_PAGE_URL")
            .ok_or_else(|| ConfigError::MissingVariable("STATS_PAGE_URL".to_string()))?;

        if !page_url.starts_with("http://") && !page_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "STATS_PAGE_URL must start with http:// or https://".to_string(),
            ));
        }

        let page_url = Url::parse(&page_url)
            .map_err(|e| ConfigError::InvalidValue(format!("STATS_PAGE_URL: {}", e)))?;

        let number = |key: &str, default: u64| -> u64 {
            lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
        };

        let reconnect_delay_secs = number("RECONNECT_DELAY_SECS", 60);

        let policy_str = lookup("RECONNECT_POLICY").unwrap_or_else(|| "keep".to_string());
        let reconnect_policy = ReconnectPolicy::from_str(&policy_str.to_lowercase()).unwrap_or_else(|| {
            log::warn!("Invalid RECONNECT_POLICY '{}', defaulting to keep", policy_str);
            ReconnectPolicy::default()
        });

        let slots_str = lookup("RATE_STALE_SLOTS").unwrap_or_else(|| "retain".to_string());
        let stale_slot_policy = StaleSlotPolicy::from_str(&slots_str.to_lowercase()).unwrap_or_else(|| {
            log::warn!("Invalid RATE_STALE_SLOTS '{}', defaulting to retain", slots_str);
            StaleSlotPolicy::default()
        });

        Ok(Self {
            page_url,
            endpoint: lookup("STATS_ENDPOINT").unwrap_or_else(|| "/api/live_stats".to_string()),
            max_display: number("STATS_MAX_DISPLAY", 30) as usize,
            reconnect_delay_secs,
            reconnect_max_delay_secs: number("RECONNECT_MAX_DELAY_SECS", reconnect_delay_secs),
            reconnect_policy,
            stale_slot_policy,
            sync_interval_ms: number("SYNC_INTERVAL_MS", 500),
            slow_render_threshold_ms: number("SLOW_RENDER_THRESHOLD_MS", 50),
            slow_render_floor_ms: number("SLOW_RENDER_FLOOR_MS", 1_000),
            slow_render_cap_ms: number("SLOW_RENDER_CAP_MS", 10_000),
        })
    }

    /// WebSocket URL derived from the page URL and endpoint path
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        endpoint_url(&self.page_url, &self.endpoint)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            store: StoreConfig {
                max_recent: self.max_display,
                stale_slot_policy: self.stale_slot_policy,
            },
            throttle: ThrottleConfig {
                base_interval: Duration::from_millis(self.sync_interval_ms),
                slow_threshold: Duration::from_millis(self.slow_render_threshold_ms),
                slow_floor: Duration::from_millis(self.slow_render_floor_ms),
                slow_cap: Duration::from_millis(self.slow_render_cap_ms),
            },
            backoff: ReconnectBackoff::new(
                Duration::from_secs(self.reconnect_delay_secs),
                Duration::from_secs(self.reconnect_max_delay_secs),
            ),
            reconnect_policy: self.reconnect_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[("STATS_PAGE_URL", "https://tracker.example.org/")]).unwrap();

        assert_eq!(config.endpoint, "/api/live_stats");
        assert_eq!(config.max_display, 30);
        assert_eq!(config.reconnect_delay_secs, 60);
        assert_eq!(config.reconnect_max_delay_secs, 60);
        assert_eq!(config.reconnect_policy, ReconnectPolicy::KeepStale);
        assert_eq!(config.stale_slot_policy, StaleSlotPolicy::Retain);
        assert_eq!(config.sync_interval_ms, 500);
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "wss://tracker.example.org/api/live_stats"
        );

        let controller = config.controller_config();
        assert_eq!(controller.store.max_recent, 30);
        assert_eq!(controller.throttle, ThrottleConfig::default());
    }

    #[test]
    fn test_custom_config() {
        let config = load(&[
            ("STATS_PAGE_URL", "http://localhost:8000"),
            ("STATS_ENDPOINT", "/live"),
            ("STATS_MAX_DISPLAY", "10"),
            ("RECONNECT_DELAY_SECS", "5"),
            ("RECONNECT_MAX_DELAY_SECS", "120"),
            ("RECONNECT_POLICY", "Reset"),
            ("RATE_STALE_SLOTS", "expire"),
            ("SYNC_INTERVAL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.max_display, 10);
        assert_eq!(config.reconnect_policy, ReconnectPolicy::ResetOnReconnect);
        assert_eq!(config.stale_slot_policy, StaleSlotPolicy::Expire);
        assert_eq!(config.endpoint_url().unwrap().as_str(), "ws://localhost:8000/live");

        let mut backoff = config.controller_config().backoff;
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("STATS_PAGE_URL", "http://localhost"),
            ("STATS_MAX_DISPLAY", "lots"),
            ("RECONNECT_POLICY", "sometimes"),
        ])
        .unwrap();

        assert_eq!(config.max_display, 30);
        assert_eq!(config.reconnect_policy, ReconnectPolicy::KeepStale);
    }

    #[test]
    fn test_missing_page_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVariable(_))));
    }

    #[test]
    fn test_page_url_scheme_is_checked() {
        let result = load(&[("STATS_PAGE_URL", "ws://localhost/")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
