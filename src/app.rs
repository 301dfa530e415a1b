//! Application state and the scoped refresh operations.
//!
//! `App` owns everything the poll loop and the action dispatcher mutate:
//! the active view, mounted pair views, chart handles, the render dedup
//! cache, and the latest home/wallet snapshots. Fetches run outside the
//! state lock; the lock is taken only to apply a finished payload.
//!
//! Stale-response discard: every refresh captures the generation counter
//! before its fetch and re-checks it under the lock afterwards. View
//! switches, timeframe changes, and full reloads bump the counter, so a
//! response that raced one of those is dropped instead of clobbering the
//! new view's state.

use crate::api::{
    ActionReply, BalanceHistory, BotClient, OpenOrder, PairDetails, Side, StatusResponse,
    WalletEntry,
};
use crate::chart::{
    bars_from_raw, prepare_points, Bar, ChartData, ChartKind, ChartRegistry, ChartTheme, Point,
    PriceLine, UpdateEffect,
};
use crate::config::ClientConfig;
use crate::dispatch::{Action, ActionDispatcher, RefreshScope};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::ViewRegistry;
use crate::render::{Fingerprint, RenderCache};
use crate::symbol::ViewState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What a refresh pass did with its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Payload applied to state (possibly with some renders deduped away)
    Applied,
    /// Response arrived for a superseded generation and was dropped
    Discarded,
}

/// Everything mutated by refreshes and actions, behind one lock
#[derive(Debug)]
pub struct SyncState {
    pub view: ViewState,
    pub timeframe: String,
    pub theme: ChartTheme,
    pub views: ViewRegistry,
    pub charts: ChartRegistry,
    pub cache: RenderCache,
    /// Latest home snapshot; `None` until the first successful status poll
    pub status: Option<StatusResponse>,
    pub orders: Vec<OpenOrder>,
    pub wallet: Vec<WalletEntry>,
}

impl SyncState {
    fn new(config: &ClientConfig) -> Self {
        Self {
            view: ViewState::Home,
            timeframe: config.default_timeframe.clone(),
            theme: ChartTheme::default(),
            views: ViewRegistry::new(),
            charts: ChartRegistry::new(),
            cache: RenderCache::new(config.render_dedup),
            status: None,
            orders: Vec::new(),
            wallet: Vec::new(),
        }
    }
}

/// Shared application handle. Cheap to clone via `Arc`.
#[derive(Debug)]
pub struct App {
    pub client: BotClient,
    dispatcher: ActionDispatcher,
    state: RwLock<SyncState>,
    generation: AtomicU64,
    initial_zoom_bars: usize,
}

impl App {
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        let client = BotClient::new(config);
        Arc::new(Self {
            dispatcher: ActionDispatcher::new(client.clone()),
            client,
            state: RwLock::new(SyncState::new(config)),
            generation: AtomicU64::new(0),
            initial_zoom_bars: config.initial_zoom_bars,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, SyncState> {
        self.state.read().await
    }

    // ------------------------------------------------------------------
    // VIEW CONTROL
    // ------------------------------------------------------------------

    /// Switch the active view. Bumps the generation so in-flight fetches
    /// for the previous view are discarded on arrival.
    pub async fn set_view(&self, view: ViewState) {
        let mut state = self.state.write().await;
        if state.view == view {
            return;
        }
        info!("view: {} -> {}", state.view, view);
        state.view = view;
        self.bump_generation();
    }

    /// Change the candle timeframe. The active pair's chart rearms its
    /// initial zoom so the new resolution snaps to the trailing window;
    /// timeframe is part of every candle dedup key, so no stale skip.
    pub async fn set_timeframe(&self, timeframe: &str) {
        let mut state = self.state.write().await;
        if state.timeframe == timeframe {
            return;
        }
        state.timeframe = timeframe.to_string();
        if let ViewState::Pair(symbol) = state.view.clone() {
            if let Some(target) = state.views.get(&symbol).map(|v| v.chart_target()) {
                state.charts.reset_zoom(&target);
            }
        }
        self.bump_generation();
    }

    /// Re-theme every live chart in place. Data and viewports untouched.
    pub async fn set_theme(&self, theme: ChartTheme) {
        let mut state = self.state.write().await;
        state.theme = theme;
        state.charts.set_theme_all(theme);
    }

    // ------------------------------------------------------------------
    // REFRESH OPERATIONS
    // ------------------------------------------------------------------

    /// Refresh whatever the active view needs. Called once per poll tick.
    pub async fn refresh_active(&self) -> SyncResult<RefreshOutcome> {
        let view = self.state.read().await.view.clone();
        match view {
            ViewState::Home => self.refresh_home().await,
            ViewState::Pair(symbol) => self.refresh_pair(&symbol).await,
            ViewState::Wallet => self.refresh_wallet().await,
            // The config editor holds user-entered text; never poll over it.
            ViewState::Config => Ok(RefreshOutcome::Applied),
        }
    }

    /// Full home-view pass: status, tab reconciliation, donut distributions,
    /// balance history, open orders.
    pub async fn refresh_home(&self) -> SyncResult<RefreshOutcome> {
        let generation = self.generation();
        let status = self.client.status().await?;
        let history = self.client.balance_history().await?;
        let orders = self.client.orders().await?;
        Ok(self.apply_home(generation, status, history, orders).await)
    }

    /// Apply a fetched home payload, unless `generation` was superseded
    /// while the fetch was in flight.
    async fn apply_home(
        &self,
        generation: u64,
        status: StatusResponse,
        history: BalanceHistory,
        orders: Vec<OpenOrder>,
    ) -> RefreshOutcome {
        let mut state = self.state.write().await;
        if self.generation() != generation {
            debug!("home refresh superseded, dropping payload");
            return RefreshOutcome::Discarded;
        }

        let SyncState {
            views,
            charts,
            cache,
            ..
        } = &mut *state;
        views.reconcile(&status.active_pairs, charts, cache);

        let theme = state.theme;
        let zoom = self.initial_zoom_bars;
        Self::apply_donut(&mut state, "donut-portfolio", &status.portfolio_distribution, theme);
        Self::apply_donut(
            &mut state,
            "donut-trades-session",
            &status.session_trades_distribution,
            theme,
        );
        Self::apply_donut(
            &mut state,
            "donut-trades-global",
            &status.global_trades_distribution,
            theme,
        );

        Self::apply_balance_line(&mut state, "balance-session", &history.session, theme, zoom);
        Self::apply_balance_line(&mut state, "balance-global", &history.global, theme, zoom);

        let fp = Fingerprint::of_series(&orders.iter().map(order_key).collect::<Vec<_>>(), |_| 0);
        if !state.cache.should_skip("orders", fp) {
            state.orders = orders;
        }

        state.status = Some(status);
        RefreshOutcome::Applied
    }

    /// Per-pair pass: details payload, derived order books, candle chart
    /// with grid and order price lines.
    pub async fn refresh_pair(&self, symbol: &str) -> SyncResult<RefreshOutcome> {
        let generation = self.generation();
        let timeframe = self.state.read().await.timeframe.clone();
        let details = self.client.details(symbol, &timeframe).await?;
        Ok(self.apply_pair(generation, symbol, &timeframe, details).await)
    }

    /// Apply a fetched details payload, unless `generation` was superseded.
    async fn apply_pair(
        &self,
        generation: u64,
        symbol: &str,
        timeframe: &str,
        details: PairDetails,
    ) -> RefreshOutcome {
        let mut state = self.state.write().await;
        if self.generation() != generation {
            debug!("pair refresh for {} superseded, dropping payload", symbol);
            return RefreshOutcome::Discarded;
        }

        // A details payload for a pair with no mounted view is a no-op, not
        // an error: the next status poll decides whether it should exist.
        let Some(view) = state.views.get_mut(symbol) else {
            debug!("no mounted view for {}, ignoring details", symbol);
            return RefreshOutcome::Applied;
        };
        view.apply(&details, timeframe);
        let target = view.chart_target();

        let bars = bars_from_raw(&details.chart_data);
        let mut lines: Vec<PriceLine> = details.grid_lines.iter().map(|p| PriceLine::Grid(*p)).collect();
        lines.extend(details.open_orders.iter().map(|order| PriceLine::Order {
            side: order.side,
            price: order.price,
            amount: order.amount,
        }));

        let cache_key = format!("{}:{}", target, timeframe);
        let fp = pair_chart_fingerprint(&bars, &lines);
        if state.cache.should_skip(&cache_key, fp) {
            debug!("chart {} unchanged, skipping render", cache_key);
            return RefreshOutcome::Applied;
        }

        let theme = state.theme;
        let zoom = self.initial_zoom_bars;
        let handle = state.charts.get_or_create(&target, ChartKind::Candles, theme);
        if handle.update(ChartData::Bars(bars), lines, zoom) == UpdateEffect::Unchanged {
            debug!("chart {} content identical after normalization", target);
        }
        RefreshOutcome::Applied
    }

    /// Wallet listing pass.
    pub async fn refresh_wallet(&self) -> SyncResult<RefreshOutcome> {
        let generation = self.generation();
        let wallet = self.client.wallet().await?;
        Ok(self.apply_wallet(generation, wallet).await)
    }

    async fn apply_wallet(&self, generation: u64, wallet: Vec<WalletEntry>) -> RefreshOutcome {
        let mut state = self.state.write().await;
        if self.generation() != generation {
            return RefreshOutcome::Discarded;
        }
        let fp = Fingerprint::of_series(
            &wallet
                .iter()
                .map(|w| (w.asset.clone(), w.total.to_bits(), w.usdc_value.to_bits()))
                .collect::<Vec<_>>(),
            |_| 0,
        );
        if !state.cache.should_skip("wallet", fp) {
            state.wallet = wallet;
        }
        RefreshOutcome::Applied
    }

    fn apply_donut(state: &mut SyncState, target: &str, slices: &[crate::api::Slice], theme: ChartTheme) {
        let fp = Fingerprint::of_series(
            &slices
                .iter()
                .map(|s| (s.name.clone(), s.value.to_bits()))
                .collect::<Vec<_>>(),
            |_| 0,
        );
        if state.cache.should_skip(target, fp) {
            return;
        }
        let zoom = usize::MAX; // donuts have no time axis, never window them
        state
            .charts
            .get_or_create(target, ChartKind::Donut, theme)
            .update(ChartData::Slices(slices.to_vec()), Vec::new(), zoom);
    }

    fn apply_balance_line(
        state: &mut SyncState,
        target: &str,
        rows: &[(i64, f64)],
        theme: ChartTheme,
        zoom: usize,
    ) {
        let points = prepare_points(rows.iter().map(|(ms, value)| Point {
            time: ms / 1000,
            value: *value,
        }));
        let fp = Fingerprint::of_series(
            &points
                .iter()
                .map(|p| (p.time, p.value.to_bits()))
                .collect::<Vec<_>>(),
            |item| item.0,
        );
        if state.cache.should_skip(target, fp) {
            return;
        }
        state
            .charts
            .get_or_create(target, ChartKind::Line, theme)
            .update(ChartData::Points(points), Vec::new(), zoom);
    }

    // ------------------------------------------------------------------
    // ACTIONS
    // ------------------------------------------------------------------

    /// Fire a control action and, once confirmed, refresh its scope.
    ///
    /// A rejected action propagates the backend error untouched; no local
    /// state changes and no refresh fires. Once the backend HAS confirmed,
    /// a failed follow-up refresh is logged but never turns the confirmed
    /// action into an error: the next poll tick converges the state.
    pub async fn perform(&self, action: Action) -> SyncResult<ActionReply> {
        let (reply, scope) = self.dispatcher.dispatch(&action).await?;

        let refreshed = match scope {
            RefreshScope::None => Ok(RefreshOutcome::Applied),
            RefreshScope::Home => self.refresh_home().await,
            RefreshScope::Pair(symbol) => self.refresh_pair(&symbol).await,
            RefreshScope::FullReload => self.full_reload().await,
        };
        if let Err(err) = refreshed {
            Self::note_refresh_error(&err);
        }
        Ok(reply)
    }

    /// Tear down every registry and refetch from scratch. Also invalidates
    /// in-flight responses via the generation counter.
    pub async fn full_reload(&self) -> SyncResult<RefreshOutcome> {
        {
            let mut state = self.state.write().await;
            let SyncState {
                views,
                charts,
                cache,
                ..
            } = &mut *state;
            views.clear(charts, cache);
            charts.clear();
            cache.clear();
            state.status = None;
            state.orders.clear();
            state.wallet.clear();
            self.bump_generation();
        }
        let outcome = self.refresh_home().await?;
        let view = self.state.read().await.view.clone();
        if let ViewState::Pair(symbol) = view {
            // The reload may have unmounted the pair; fall back to home.
            if self.state.read().await.views.contains(&symbol) {
                self.refresh_pair(&symbol).await?;
            } else {
                warn!("pair {} gone after reload, returning home", symbol);
                self.set_view(ViewState::Home).await;
            }
        }
        Ok(outcome)
    }

    /// Round-trip the raw config text for the editor view.
    pub async fn load_config_text(&self) -> SyncResult<String> {
        Ok(self.client.config_text().await?.content)
    }

    /// Save edited config text. Surfaces the backend's validation error
    /// verbatim on rejection.
    pub async fn save_config_text(&self, content: &str) -> SyncResult<ActionReply> {
        self.client.save_config(content).await
    }

    /// Log a refresh failure at the severity its class deserves.
    pub fn note_refresh_error(err: &SyncError) {
        if err.is_transient() {
            debug!("transient refresh failure, retrying next tick: {}", err);
        } else {
            warn!("backend refresh error: {}", err);
        }
    }
}

fn order_key(order: &OpenOrder) -> (String, u64, u64) {
    (order.id.clone(), order.price.to_bits(), order.amount.to_bits())
}

/// Dedup fingerprint for a pair's candle chart. Bars and overlay lines both
/// count as content: a relocated grid level or a changed order line must
/// invalidate the render even when the candles are identical or absent.
fn pair_chart_fingerprint(bars: &[Bar], lines: &[PriceLine]) -> Fingerprint {
    let bar_tuples: Vec<(i64, u64, u64, u64, u64)> = bars
        .iter()
        .map(|b| {
            (
                b.time,
                b.open.to_bits(),
                b.high.to_bits(),
                b.low.to_bits(),
                b.close.to_bits(),
            )
        })
        .collect();
    let line_tuples: Vec<(u8, u64, u64)> = lines
        .iter()
        .map(|line| match line {
            PriceLine::Grid(price) => (0u8, price.to_bits(), 0u64),
            PriceLine::Order { side, price, amount } => {
                let tag = match side {
                    Side::Buy => 1u8,
                    Side::Sell => 2u8,
                };
                (tag, price.to_bits(), amount.to_bits())
            }
        })
        .collect();
    let last_time = bars.last().map(|b| b.time).unwrap_or(0);
    Fingerprint::of(
        &(bar_tuples, line_tuples),
        bars.len() + lines.len(),
        last_time,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{EngineStatus, StatsBlock};

    fn app() -> Arc<App> {
        App::new(&ClientConfig::default())
    }

    fn status_payload(pairs: &[&str]) -> StatusResponse {
        StatusResponse {
            status: EngineStatus::Running,
            active_pairs: pairs.iter().map(|s| s.to_string()).collect(),
            balance_usdc: 0.0,
            total_usdc_value: 0.0,
            portfolio_distribution: Vec::new(),
            session_trades_distribution: Vec::new(),
            global_trades_distribution: Vec::new(),
            strategies: Vec::new(),
            stats: StatsBlock::default(),
        }
    }

    fn details_payload(symbol: &str, price: f64) -> PairDetails {
        PairDetails {
            symbol: symbol.to_string(),
            price,
            open_orders: Vec::new(),
            trades: Vec::new(),
            chart_data: Vec::new(),
            grid_lines: Vec::new(),
            session_pnl: 0.0,
            global_pnl: 0.0,
        }
    }

    fn bar(time: i64, close: f64) -> Bar {
        Bar {
            time,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
        }
    }

    fn order_line(price: f64) -> PriceLine {
        PriceLine::Order {
            side: Side::Buy,
            price,
            amount: 0.001,
        }
    }

    #[tokio::test]
    async fn test_set_view_bumps_generation() {
        let app = app();
        let before = app.generation();
        app.set_view(ViewState::Pair("BTC/USDC".to_string())).await;
        assert_eq!(app.generation(), before + 1);

        // Re-setting the same view is a no-op.
        app.set_view(ViewState::Pair("BTC/USDC".to_string())).await;
        assert_eq!(app.generation(), before + 1);
    }

    #[tokio::test]
    async fn test_set_timeframe_bumps_generation() {
        let app = app();
        let before = app.generation();
        app.set_timeframe("1h").await;
        assert_eq!(app.generation(), before + 1);
        assert_eq!(app.state().await.timeframe, "1h");

        app.set_timeframe("1h").await;
        assert_eq!(app.generation(), before + 1);
    }

    #[tokio::test]
    async fn test_set_theme_keeps_generation() {
        let app = app();
        let before = app.generation();
        app.set_theme(ChartTheme::Dark).await;
        assert_eq!(app.generation(), before);
        assert_eq!(app.state().await.theme, ChartTheme::Dark);
    }

    #[tokio::test]
    async fn test_current_home_payload_applied() {
        let app = app();
        let outcome = app
            .apply_home(
                app.generation(),
                status_payload(&["BTC/USDC"]),
                BalanceHistory::default(),
                Vec::new(),
            )
            .await;
        assert_eq!(outcome, RefreshOutcome::Applied);
        let state = app.state().await;
        assert!(state.views.contains("BTC/USDC"));
        assert_eq!(state.status.as_ref().unwrap().status, EngineStatus::Running);
    }

    #[tokio::test]
    async fn test_stale_home_payload_discarded() {
        let app = app();
        let generation = app.generation();
        // The view flips while the fetch is in flight.
        app.set_view(ViewState::Wallet).await;

        let outcome = app
            .apply_home(
                generation,
                status_payload(&["BTC/USDC"]),
                BalanceHistory::default(),
                Vec::new(),
            )
            .await;
        assert_eq!(outcome, RefreshOutcome::Discarded);
        let state = app.state().await;
        assert!(state.status.is_none());
        assert!(state.views.is_empty());
        assert!(state.charts.is_empty());
    }

    #[tokio::test]
    async fn test_stale_pair_payload_discarded() {
        let app = app();
        app.apply_home(
            app.generation(),
            status_payload(&["BTC/USDC"]),
            BalanceHistory::default(),
            Vec::new(),
        )
        .await;

        let generation = app.generation();
        // A timeframe change supersedes the in-flight details fetch.
        app.set_timeframe("1h").await;

        let outcome = app
            .apply_pair(generation, "BTC/USDC", "15m", details_payload("BTC/USDC", 60000.0))
            .await;
        assert_eq!(outcome, RefreshOutcome::Discarded);
        assert_eq!(app.state().await.views.get("BTC/USDC").unwrap().price, 0.0);
    }

    #[tokio::test]
    async fn test_current_pair_payload_applied() {
        let app = app();
        app.apply_home(
            app.generation(),
            status_payload(&["BTC/USDC"]),
            BalanceHistory::default(),
            Vec::new(),
        )
        .await;

        let outcome = app
            .apply_pair(
                app.generation(),
                "BTC/USDC",
                "15m",
                details_payload("BTC/USDC", 60000.0),
            )
            .await;
        assert_eq!(outcome, RefreshOutcome::Applied);
        assert_eq!(app.state().await.views.get("BTC/USDC").unwrap().price, 60000.0);
    }

    #[test]
    fn test_chart_fingerprint_tracks_line_prices() {
        // Same candles, same line count, relocated grid levels.
        let bars = vec![bar(1, 1.5), bar(2, 2.5)];
        let a = pair_chart_fingerprint(&bars, &[PriceLine::Grid(59000.0), PriceLine::Grid(59500.0)]);
        let b = pair_chart_fingerprint(&bars, &[PriceLine::Grid(60000.0), PriceLine::Grid(60500.0)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_chart_fingerprint_tracks_lines_without_bars() {
        let a = pair_chart_fingerprint(&[], &[order_line(59000.0)]);
        let b = pair_chart_fingerprint(&[], &[order_line(59000.0), order_line(61000.0)]);
        let c = pair_chart_fingerprint(&[], &[order_line(59000.0)]);
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[tokio::test]
    async fn test_failed_action_mutates_nothing() {
        // Nothing listens here; the dispatch must fail before any refresh.
        let config = ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout: std::time::Duration::from_millis(50),
            ..ClientConfig::default()
        };
        let app = App::new(&config);
        let before = app.generation();

        let result = app.perform(Action::EngineOn).await;
        assert!(result.is_err());

        let state = app.state().await;
        assert!(state.status.is_none());
        assert!(state.views.is_empty());
        assert!(state.charts.is_empty());
        assert_eq!(app.generation(), before);
    }

    // Serves one canned HTTP response, then goes away.
    async fn one_shot_backend(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_confirmed_action_survives_failed_refresh() {
        // The backend confirms the POST, then disappears before the scoped
        // home refresh; the confirmed reply must still reach the caller.
        let base_url = one_shot_backend(r#"{"status": "success", "message": "ok"}"#).await;
        let config = ClientConfig {
            base_url,
            request_timeout: std::time::Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let app = App::new(&config);

        let reply = app.perform(Action::EngineOn).await.unwrap();
        assert_eq!(reply.status, "success");
    }

    #[tokio::test]
    async fn test_initial_state() {
        let app = app();
        let state = app.state().await;
        assert_eq!(state.view, ViewState::Home);
        assert_eq!(state.timeframe, "15m");
        assert!(state.status.is_none());
        assert!(state.views.is_empty());
        assert!(state.charts.is_empty());
    }
}
