//! Control actions: fire-and-confirm POSTs against the bot backend.
//!
//! Actions never mutate local state optimistically. Each one fires its POST,
//! waits for the backend's confirmation, and only then triggers a scoped
//! refresh so the displayed state comes back from the source of truth. A
//! failed POST surfaces the backend's error and changes nothing locally.

use crate::api::{ActionReply, BotClient, Side};
use crate::error::SyncResult;
use serde_json::json;
use tracing::{info, warn};

/// Which views must be refetched after an action is confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// Confirmation-only action; the regular poll will pick up any change
    None,
    /// Aggregate home view
    Home,
    /// One pair's detail view
    Pair(String),
    /// Everything: registries cleared, all views refetched from scratch
    FullReload,
}

/// A user-initiated control action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    EngineOn,
    EngineOff,
    PanicStop,
    PanicStart,
    PanicCancelAll,
    PanicSellAll,
    CloseOrder {
        symbol: String,
        order_id: String,
        side: Side,
        amount: f64,
    },
    LiquidateAsset {
        asset: String,
    },
    AdjustBalance {
        asset: String,
        amount: f64,
    },
    RefreshOrders,
    ResetStats,
    ResetSessionChart,
    ResetGlobalChart,
    ResetGlobalPnl,
    ResetCoinSession {
        symbol: String,
    },
    ResetCoinGlobal {
        symbol: String,
    },
    ClearHistory {
        symbol: String,
    },
}

impl Action {
    /// Backend endpoint path for this action.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Action::EngineOn => "/api/engine/on",
            Action::EngineOff => "/api/engine/off",
            Action::PanicStop => "/api/panic/stop",
            Action::PanicStart => "/api/panic/start",
            Action::PanicCancelAll => "/api/panic/cancel_all",
            Action::PanicSellAll => "/api/panic/sell_all",
            Action::CloseOrder { .. } => "/api/close_order",
            Action::LiquidateAsset { .. } => "/api/liquidate_asset",
            Action::AdjustBalance { .. } => "/api/balance/adjust",
            Action::RefreshOrders => "/api/refresh_orders",
            Action::ResetStats => "/api/reset_stats",
            Action::ResetSessionChart => "/api/reset/chart/session",
            Action::ResetGlobalChart => "/api/reset/chart/global",
            Action::ResetGlobalPnl => "/api/reset/pnl/global",
            Action::ResetCoinSession { .. } => "/api/reset/coin/session",
            Action::ResetCoinGlobal { .. } => "/api/reset/coin/global",
            Action::ClearHistory { .. } => "/api/history/clear",
        }
    }

    /// JSON request body, where the endpoint takes one.
    pub fn payload(&self) -> Option<serde_json::Value> {
        match self {
            Action::CloseOrder {
                symbol,
                order_id,
                side,
                amount,
            } => Some(json!({
                "symbol": symbol,
                "order_id": order_id,
                "side": side,
                "amount": amount,
            })),
            Action::LiquidateAsset { asset } => Some(json!({ "asset": asset })),
            Action::AdjustBalance { asset, amount } => {
                Some(json!({ "asset": asset, "amount": amount }))
            }
            Action::ResetCoinSession { symbol }
            | Action::ResetCoinGlobal { symbol }
            | Action::ClearHistory { symbol } => Some(json!({ "symbol": symbol })),
            _ => None,
        }
    }

    /// What to refetch once the backend confirms.
    pub fn refresh_scope(&self) -> RefreshScope {
        match self {
            // Engine and panic switches change everything the home view shows.
            Action::EngineOn
            | Action::EngineOff
            | Action::PanicStop
            | Action::PanicStart
            | Action::PanicCancelAll
            | Action::PanicSellAll
            | Action::RefreshOrders
            | Action::ResetSessionChart
            | Action::ResetGlobalChart
            | Action::ResetGlobalPnl
            | Action::LiquidateAsset { .. }
            | Action::AdjustBalance { .. } => RefreshScope::Home,
            Action::CloseOrder { symbol, .. }
            | Action::ResetCoinSession { symbol }
            | Action::ResetCoinGlobal { symbol } => RefreshScope::Pair(symbol.clone()),
            // Whole-state resets invalidate derived state everywhere.
            Action::ResetStats | Action::ClearHistory { .. } => RefreshScope::FullReload,
        }
    }
}

/// Fires actions and reports the scope the caller must refresh
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    client: BotClient,
}

impl ActionDispatcher {
    pub fn new(client: BotClient) -> Self {
        Self { client }
    }

    /// POST the action and wait for confirmation.
    ///
    /// On success returns the backend's reply plus the refresh scope; on
    /// failure the error propagates and the caller refreshes nothing.
    pub async fn dispatch(&self, action: &Action) -> SyncResult<(ActionReply, RefreshScope)> {
        let endpoint = action.endpoint();
        let payload = action.payload();
        info!("dispatching {:?} -> {}", action, endpoint);

        match self.client.post_action(endpoint, payload.as_ref()).await {
            Ok(reply) => {
                info!("{} confirmed: {}", endpoint, reply.message);
                Ok((reply, action.refresh_scope()))
            }
            Err(err) => {
                warn!("{} rejected: {}", endpoint, err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_match_backend_routes() {
        assert_eq!(Action::EngineOn.endpoint(), "/api/engine/on");
        assert_eq!(Action::PanicSellAll.endpoint(), "/api/panic/sell_all");
        assert_eq!(
            Action::ResetCoinSession {
                symbol: "BTC/USDC".to_string()
            }
            .endpoint(),
            "/api/reset/coin/session"
        );
    }

    #[test]
    fn test_close_order_payload() {
        let action = Action::CloseOrder {
            symbol: "BTC/USDC".to_string(),
            order_id: "42".to_string(),
            side: Side::Sell,
            amount: 0.001,
        };
        let payload = action.payload().unwrap();
        assert_eq!(payload["symbol"], "BTC/USDC");
        assert_eq!(payload["order_id"], "42");
        assert_eq!(payload["side"], "sell");
        assert_eq!(payload["amount"], 0.001);
    }

    #[test]
    fn test_toggle_actions_have_no_payload() {
        assert!(Action::EngineOff.payload().is_none());
        assert!(Action::PanicStop.payload().is_none());
        assert!(Action::ResetStats.payload().is_none());
    }

    #[test]
    fn test_refresh_scopes() {
        assert_eq!(Action::EngineOn.refresh_scope(), RefreshScope::Home);
        assert_eq!(
            Action::CloseOrder {
                symbol: "ETH/USDC".to_string(),
                order_id: "1".to_string(),
                side: Side::Buy,
                amount: 0.1,
            }
            .refresh_scope(),
            RefreshScope::Pair("ETH/USDC".to_string())
        );
        assert_eq!(
            Action::ClearHistory {
                symbol: "ETH/USDC".to_string()
            }
            .refresh_scope(),
            RefreshScope::FullReload
        );
        assert_eq!(Action::ResetStats.refresh_scope(), RefreshScope::FullReload);
    }
}
