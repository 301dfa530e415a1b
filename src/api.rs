//! Typed REST client for the grid-bot backend.
//!
//! This module provides:
//! - `BotClient`, a thin reqwest wrapper with base URL and timeout
//! - serde types for every backend payload the client consumes
//! - structured error extraction from non-2xx responses
//!
//! GET endpoints are idempotent polling targets; a transient failure simply
//! skips one render pass. POST endpoints are single-shot control actions and
//! are never retried by this layer.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// PAYLOAD TYPES
// ============================================================================

/// Engine status as reported by `/api/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EngineStatus {
    Running,
    Paused,
    Stopped,
    Error,
    #[default]
    Offline,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineStatus::Running => "Running",
            EngineStatus::Paused => "Paused",
            EngineStatus::Stopped => "Stopped",
            EngineStatus::Error => "Error",
            EngineStatus::Offline => "Offline",
        };
        write!(f, "{}", s)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One slice of a donut distribution (portfolio or trade counts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub name: String,
    pub value: f64,
}

/// Per-strategy row in the home view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRow {
    pub symbol: String,
    #[serde(default)]
    pub enabled: bool,
    /// Grid line count; the backend sends "-" when unset, so keep raw JSON
    #[serde(default)]
    pub grids: serde_json::Value,
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub spread: serde_json::Value,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub total_pnl: f64,
    #[serde(default)]
    pub session_pnl: f64,
}

/// Session or global aggregate stats
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodStats {
    #[serde(default)]
    pub trades: u64,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub best_coin: String,
    #[serde(default)]
    pub uptime: String,
}

/// Session/global stats pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsBlock {
    #[serde(default)]
    pub session: PeriodStats,
    #[serde(default)]
    pub global: PeriodStats,
}

/// `/api/status` response, the main dashboard payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: EngineStatus,
    #[serde(default)]
    pub active_pairs: Vec<String>,
    #[serde(default)]
    pub balance_usdc: f64,
    #[serde(default)]
    pub total_usdc_value: f64,
    #[serde(default)]
    pub portfolio_distribution: Vec<Slice>,
    #[serde(default)]
    pub session_trades_distribution: Vec<Slice>,
    #[serde(default)]
    pub global_trades_distribution: Vec<Slice>,
    #[serde(default)]
    pub strategies: Vec<StrategyRow>,
    #[serde(default)]
    pub stats: StatsBlock,
}

/// Raw candle row from `/api/details`: `[time, open, close, low, high]`
///
/// Time is a "%Y-%m-%d %H:%M" string; numeric fields may arrive out of order
/// or duplicated across overlapping fetches and are normalized downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandle(pub String, pub f64, pub f64, pub f64, pub f64);

impl RawCandle {
    /// Parse the candle's wall-clock label into a unix timestamp (seconds).
    pub fn timestamp(&self) -> Option<i64> {
        NaiveDateTime::parse_from_str(&self.0, "%Y-%m-%d %H:%M")
            .ok()
            .map(|dt| dt.and_utc().timestamp())
    }

    pub fn open(&self) -> f64 {
        self.1
    }

    pub fn close(&self) -> f64 {
        self.2
    }

    pub fn low(&self) -> f64 {
        self.3
    }

    pub fn high(&self) -> f64 {
        self.4
    }
}

/// An open limit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub amount: f64,
    /// Estimated entry price for sell orders (buy orders have no entry)
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub total_value: f64,
}

/// A filled trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Fill time, unix milliseconds
    pub timestamp: i64,
    pub side: Side,
    pub price: f64,
    #[serde(default)]
    pub cost: f64,
}

/// `/api/details/{symbol}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDetails {
    pub symbol: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub open_orders: Vec<OpenOrder>,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
    #[serde(default)]
    pub chart_data: Vec<RawCandle>,
    #[serde(default)]
    pub grid_lines: Vec<f64>,
    #[serde(default)]
    pub session_pnl: f64,
    #[serde(default)]
    pub global_pnl: f64,
}

/// `/api/history/balance` response: `[unix_ms, usdc_value]` rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceHistory {
    #[serde(default)]
    pub session: Vec<(i64, f64)>,
    #[serde(default)]
    pub global: Vec<(i64, f64)>,
}

/// One asset row from `/api/wallet`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub asset: String,
    #[serde(default)]
    pub free: f64,
    #[serde(default)]
    pub locked: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub usdc_value: f64,
    #[serde(default)]
    pub price: f64,
}

/// `/api/config` response: raw config text, edited and round-tripped opaquely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigText {
    pub content: String,
}

/// Successful reply from a control POST
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Error body shape used by the backend for non-2xx responses
#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// CLIENT
// ============================================================================

/// HTTP client for the bot backend
#[derive(Debug, Clone)]
pub struct BotClient {
    client: reqwest::Client,
    base_url: String,
}

impl BotClient {
    /// Create a client from config
    pub fn new(config: &ClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client against an explicit base URL (tests, tooling)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON payload, mapping non-2xx responses to structured errors.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(response).await
    }

    /// POST a JSON payload (or empty body) and decode the reply.
    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = payload {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> SyncResult<T> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            let detail = response
                .bytes()
                .await
                .ok()
                .and_then(|b| serde_json::from_slice::<ErrorBody>(&b).ok())
                .and_then(|body| body.detail.or(body.message))
                .unwrap_or_else(|| status.to_string());
            debug!("backend rejected request: {} {}", status.as_u16(), detail);
            Err(SyncError::Backend {
                status: status.as_u16(),
                detail,
            })
        }
    }

    // ------------------------------------------------------------------
    // GET endpoints (polled)
    // ------------------------------------------------------------------

    /// Main dashboard payload: engine status, active pairs, distributions.
    pub async fn status(&self) -> SyncResult<StatusResponse> {
        self.get_json("/api/status").await
    }

    /// Per-pair detail: price, candles, open orders, grid lines, PnL.
    pub async fn details(&self, symbol: &str, timeframe: &str) -> SyncResult<PairDetails> {
        let path = format!("/api/details/{}?timeframe={}", symbol, timeframe);
        self.get_json(&path).await
    }

    /// Session and global balance time series.
    pub async fn balance_history(&self) -> SyncResult<BalanceHistory> {
        self.get_json("/api/history/balance").await
    }

    /// Flat listing of all active orders across pairs.
    pub async fn orders(&self) -> SyncResult<Vec<OpenOrder>> {
        self.get_json("/api/orders").await
    }

    /// Wallet listing with USDC valuations.
    pub async fn wallet(&self) -> SyncResult<Vec<WalletEntry>> {
        self.get_json("/api/wallet").await
    }

    /// Raw config text.
    pub async fn config_text(&self) -> SyncResult<ConfigText> {
        self.get_json("/api/config").await
    }

    // ------------------------------------------------------------------
    // POST endpoints (control actions)
    // ------------------------------------------------------------------

    /// Save raw config text back to the backend.
    pub async fn save_config(&self, content: &str) -> SyncResult<ActionReply> {
        let payload = serde_json::json!({ "content": content });
        self.post_json("/api/config", Some(&payload)).await
    }

    /// Fire a control action at the given endpoint path.
    pub async fn post_action(
        &self,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> SyncResult<ActionReply> {
        self.post_json(path, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decoding() {
        let raw = r#"{
            "status": "Running",
            "active_pairs": ["BTC/USDC", "ETH/USDC"],
            "balance_usdc": 1250.5,
            "total_usdc_value": 4810.22,
            "portfolio_distribution": [{"name": "USDC", "value": 1250.5}, {"name": "BTC", "value": 3559.72}],
            "session_trades_distribution": [],
            "global_trades_distribution": [],
            "strategies": [{
                "symbol": "BTC/USDC", "enabled": true,
                "grids": 10, "amount": 25, "spread": 0.8,
                "total_trades": 42, "total_pnl": 12.31, "session_pnl": 1.05
            }],
            "stats": {
                "session": {"trades": 7, "profit": 1.05, "best_coin": "BTC", "uptime": "3h 12m"},
                "global": {"trades": 42, "profit": 12.31, "best_coin": "BTC", "uptime": "9d 4h 1m"}
            }
        }"#;
        let status: StatusResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(status.status, EngineStatus::Running);
        assert_eq!(status.active_pairs.len(), 2);
        assert_eq!(status.stats.global.trades, 42);
        assert_eq!(status.strategies[0].total_trades, 42);
    }

    #[test]
    fn test_status_decoding_degraded_payload() {
        // The backend's error fallback sends a minimal body.
        let raw = r#"{"status": "Error", "active_pairs": []}"#;
        let status: StatusResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(status.status, EngineStatus::Error);
        assert!(status.strategies.is_empty());
        assert_eq!(status.stats.session.trades, 0);
    }

    #[test]
    fn test_details_decoding() {
        let raw = r#"{
            "symbol": "BTC/USDC",
            "price": 60123.4,
            "open_orders": [
                {"id": "1", "symbol": "BTC/USDC", "side": "buy", "price": 59000.0, "amount": 0.001},
                {"id": "2", "symbol": "BTC/USDC", "side": "sell", "price": 61000.0, "amount": 0.001}
            ],
            "trades": [{"timestamp": 1700000000000, "side": "buy", "price": 59500.0, "cost": 59.5}],
            "chart_data": [["2024-01-01 10:00", 100.0, 103.0, 99.0, 104.0]],
            "grid_lines": [59000.0, 59500.0, 60000.0],
            "session_pnl": 2.5,
            "global_pnl": 11.0
        }"#;
        let details: PairDetails = serde_json::from_str(raw).unwrap();
        assert_eq!(details.open_orders[0].side, Side::Buy);
        assert_eq!(details.chart_data[0].open(), 100.0);
        assert_eq!(details.chart_data[0].close(), 103.0);
        assert_eq!(details.chart_data[0].low(), 99.0);
        assert_eq!(details.chart_data[0].high(), 104.0);
        assert!(details.chart_data[0].timestamp().is_some());
    }

    #[test]
    fn test_candle_timestamp_parsing() {
        let candle = RawCandle("2024-06-15 09:30".to_string(), 1.0, 1.1, 0.9, 1.2);
        let ts = candle.timestamp().unwrap();
        // 2024-06-15 09:30 UTC
        assert_eq!(ts, 1718443800);

        let bad = RawCandle("not a date".to_string(), 1.0, 1.1, 0.9, 1.2);
        assert!(bad.timestamp().is_none());
    }

    #[test]
    fn test_balance_history_decoding() {
        let raw = r#"{"global": [[1700000000000, 4800.0], [1700000600000, 4810.0]], "session": []}"#;
        let history: BalanceHistory = serde_json::from_str(raw).unwrap();
        assert_eq!(history.global.len(), 2);
        assert_eq!(history.global[1], (1700000600000, 4810.0));
        assert!(history.session.is_empty());
    }

    #[test]
    fn test_action_reply_decoding() {
        let raw = r#"{"status": "success", "message": "Orden cerrada."}"#;
        let reply: ActionReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.status, "success");
    }
}
