//! Tab reconciliation: converge mounted pair views toward the backend's
//! active pair set.
//!
//! Every status poll carries the authoritative list of active pairs. Each
//! tick diffs that list against the mounted views and applies the delta:
//! missing pairs are mounted, pairs no longer active are torn down. Teardown
//! is ordered (render-cache entries first, then the chart handle, then the
//! view itself) so a failed step never leaves a live handle pointing at a
//! dismantled view. Reconciling the same set twice is a no-op.

use crate::api::{OpenOrder, PairDetails, Side, TradeRecord};
use crate::chart::ChartRegistry;
use crate::error::SyncResult;
use crate::render::RenderCache;
use crate::symbol::KeyRegistry;
use std::collections::HashMap;
use tracing::{info, warn};

/// Mounted state for one trading pair's detail view
#[derive(Debug, Clone, Default)]
pub struct PairView {
    pub symbol: String,
    pub safe_key: String,
    pub price: f64,
    /// Open buys, best (highest) price first
    pub buys: Vec<OpenOrder>,
    /// Open sells, best (lowest) price first
    pub sells: Vec<OpenOrder>,
    /// Price of the buy that would fill next
    pub next_buy: Option<f64>,
    /// Price of the sell that would fill next
    pub next_sell: Option<f64>,
    pub grid_lines: Vec<f64>,
    /// Fills, newest first
    pub trades: Vec<TradeRecord>,
    pub session_pnl: f64,
    pub global_pnl: f64,
    /// Timeframe of the last applied candle fetch
    pub timeframe: String,
}

impl PairView {
    fn new(symbol: &str, safe_key: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            safe_key: safe_key.to_string(),
            ..Self::default()
        }
    }

    /// Chart target id for this pair's candle chart.
    pub fn chart_target(&self) -> String {
        format!("chart-{}", self.safe_key)
    }

    /// Apply a fresh details payload, rederiving order books and next-fill
    /// prices. Candle data is applied separately through the chart registry.
    pub fn apply(&mut self, details: &PairDetails, timeframe: &str) {
        self.price = details.price;
        self.session_pnl = details.session_pnl;
        self.global_pnl = details.global_pnl;
        self.grid_lines = details.grid_lines.clone();
        self.timeframe = timeframe.to_string();

        let (mut buys, mut sells): (Vec<_>, Vec<_>) = details
            .open_orders
            .iter()
            .cloned()
            .partition(|order| order.side == Side::Buy);
        buys.sort_by(|a, b| b.price.total_cmp(&a.price));
        sells.sort_by(|a, b| a.price.total_cmp(&b.price));
        self.next_buy = buys.first().map(|order| order.price);
        self.next_sell = sells.first().map(|order| order.price);
        self.buys = buys;
        self.sells = sells;

        let mut trades = details.trades.clone();
        trades.sort_by_key(|trade| std::cmp::Reverse(trade.timestamp));
        self.trades = trades;
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileDelta {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// All mounted pair views, keyed by symbol
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: HashMap<String, PairView>,
    keys: KeyRegistry,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&PairView> {
        self.views.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut PairView> {
        self.views.get_mut(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.views.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.views.keys()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Converge mounted views toward `active`, tearing down chart handles
    /// and render-cache entries for removed pairs.
    ///
    /// A symbol whose safe key collides with an already-mounted pair is
    /// skipped with a warning rather than aborting the pass; every other
    /// pair still converges.
    pub fn reconcile(
        &mut self,
        active: &[String],
        charts: &mut ChartRegistry,
        cache: &mut RenderCache,
    ) -> ReconcileDelta {
        let mut delta = ReconcileDelta::default();

        for symbol in active {
            if self.views.contains_key(symbol) {
                continue;
            }
            match self.mount(symbol) {
                Ok(()) => delta.added.push(symbol.clone()),
                Err(err) => warn!("skipping pair {}: {}", symbol, err),
            }
        }

        let stale: Vec<String> = self
            .views
            .keys()
            .filter(|symbol| !active.contains(symbol))
            .cloned()
            .collect();
        for symbol in stale {
            self.unmount(&symbol, charts, cache);
            delta.removed.push(symbol);
        }

        if !delta.is_noop() {
            info!(
                "reconciled pair views: +{:?} -{:?}",
                delta.added, delta.removed
            );
        }
        delta
    }

    fn mount(&mut self, symbol: &str) -> SyncResult<()> {
        let key = self.keys.register(symbol)?;
        self.views
            .insert(symbol.to_string(), PairView::new(symbol, &key));
        Ok(())
    }

    /// Tear down one pair view. Cache entries go first, then the chart
    /// handle, then the view and its key.
    fn unmount(&mut self, symbol: &str, charts: &mut ChartRegistry, cache: &mut RenderCache) {
        if let Some(view) = self.views.get(symbol) {
            let target = view.chart_target();
            cache.invalidate_prefix(&target);
            cache.invalidate_prefix(&format!("pair-{}", view.safe_key));
            charts.destroy(&target);
        }
        self.views.remove(symbol);
        self.keys.remove(symbol);
    }

    /// Tear everything down (full reload).
    pub fn clear(&mut self, charts: &mut ChartRegistry, cache: &mut RenderCache) {
        let symbols: Vec<String> = self.views.keys().cloned().collect();
        for symbol in symbols {
            self.unmount(&symbol, charts, cache);
        }
    }
}
