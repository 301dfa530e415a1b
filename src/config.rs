//! Runtime configuration, sourced from environment variables.

use std::time::Duration;

/// Default polling cadence in seconds
const DEFAULT_POLL_SECS: u64 = 4;

/// Default per-request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default candle timeframe
const DEFAULT_TIMEFRAME: &str = "15m";

/// Default initial zoom window (bars visible on first data load)
const DEFAULT_INITIAL_ZOOM_BARS: usize = 100;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the bot backend, e.g. "http://127.0.0.1:8001"
    pub base_url: String,
    /// Polling period for the active view
    pub poll_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Candle timeframe requested from the details endpoint
    pub default_timeframe: String,
    /// Bars shown by the one-shot initial zoom on first data load
    pub initial_zoom_bars: usize,
    /// Whether the render dedup cache is enabled
    pub render_dedup: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_timeframe: DEFAULT_TIMEFRAME.to_string(),
            initial_zoom_bars: DEFAULT_INITIAL_ZOOM_BARS,
            render_dedup: true,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GRIDWATCH_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.base_url),
            poll_interval: std::env::var("GRIDWATCH_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            request_timeout: std::env::var("GRIDWATCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            default_timeframe: std::env::var("GRIDWATCH_TIMEFRAME")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.default_timeframe),
            initial_zoom_bars: std::env::var("GRIDWATCH_ZOOM_BARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.initial_zoom_bars),
            render_dedup: std::env::var("GRIDWATCH_DEDUP")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(defaults.render_dedup),
        }
    }
}
