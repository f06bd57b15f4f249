//! Runtime configuration for the client engine and the session server.

use std::env;
use std::ops::Range;
use std::time::Duration;

/// Default per-side clock in seconds.
pub const DEFAULT_CLOCK_SECONDS: u32 = 300;

/// Timing and endpoint settings for a client session view.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub default_clock_seconds: u32,
    /// Reconnect attempts allowed before degrading to polling.
    pub reconnect_cap: u32,
    /// Backoff is `attempt * backoff_step`.
    pub backoff_step: Duration,
    pub poll_interval: Duration,
    pub lobby_poll_interval: Duration,
    /// Bot thinking delay in milliseconds, half-open.
    pub bot_delay_ms: Range<u64>,
    pub clock_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            ws_base_url: "ws://127.0.0.1:8080".to_string(),
            default_clock_seconds: DEFAULT_CLOCK_SECONDS,
            reconnect_cap: 2,
            backoff_step: Duration::from_millis(500),
            poll_interval: Duration::from_secs(2),
            lobby_poll_interval: Duration::from_secs(3),
            bot_delay_ms: 500..1500,
            clock_tick: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `CHESS_API_URL`, `CHESS_WS_URL` and
    /// `CHESS_CLOCK_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("CHESS_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("CHESS_WS_URL") {
            config.ws_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(seconds) = clock_from_env() {
            config.default_clock_seconds = seconds;
        }
        config
    }
}

/// Settings for the reference session server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub default_clock_seconds: u32,
    /// Players seen within this window are listed as online.
    pub online_window: Duration,
    pub timer_interval: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            default_clock_seconds: DEFAULT_CLOCK_SECONDS,
            online_window: Duration::from_secs(60),
            timer_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            client_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `CHESS_BIND` and `CHESS_CLOCK_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = env::var("CHESS_BIND") {
            config.bind = bind;
        }
        if let Some(seconds) = clock_from_env() {
            config.default_clock_seconds = seconds;
        }
        config
    }
}

fn clock_from_env() -> Option<u32> {
    let raw = env::var("CHESS_CLOCK_SECONDS").ok()?;
    match raw.parse::<u32>() {
        Ok(seconds) => Some(seconds),
        Err(e) => {
            log::warn!("Ignoring CHESS_CLOCK_SECONDS={}: {}", raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.default_clock_seconds, 300);
        assert_eq!(config.reconnect_cap, 2);
        assert_eq!(config.backoff_step, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.lobby_poll_interval, Duration::from_secs(3));
        assert_eq!(config.bot_delay_ms, 500..1500);
    }
}
