//! Chart instance cache and series normalization.
//!
//! This module provides:
//! - series preparation (timestamp dedup + ascending sort) ahead of any
//!   chart update, since upstream candles arrive out of order and duplicated
//!   across overlapping fetches
//! - `ChartHandle`, the per-target state a chart library instance would own:
//!   kind, theme, applied data, price-line overlays, viewport
//! - `ChartRegistry`, mapping a target id to its live handle; updates happen
//!   in place so zoom/scroll survives refreshes, and recreation is reserved
//!   for a genuine kind change or explicit destroy
//!
//! Handle lifecycle: `Absent -> Created -> Updated* -> Destroyed`. `Updated`
//! is reentrant and idempotent for identical input. The one-shot initial
//! zoom (last N bars) fires on the first non-empty data load and is tracked
//! via `initial_zoom_applied`, which `reset_zoom` clears to rearm.

use crate::api::{RawCandle, Side, Slice};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Chart flavor bound to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Candles,
    Line,
    Donut,
}

/// Color theme applied to a handle. Switching themes updates options in
/// place; it never recreates the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartTheme {
    #[default]
    Light,
    Dark,
}

/// One OHLC bar, time in unix seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn from_raw(raw: &RawCandle) -> Option<Self> {
        Some(Self {
            time: raw.timestamp()?,
            open: raw.open(),
            high: raw.high(),
            low: raw.low(),
            close: raw.close(),
        })
    }
}

/// One line-series point, time in unix seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub time: i64,
    pub value: f64,
}

/// Horizontal overlay drawn on a price chart
#[derive(Debug, Clone, PartialEq)]
pub enum PriceLine {
    /// Dotted grid level
    Grid(f64),
    /// Active order at a price, labeled with its volume
    Order { side: Side, price: f64, amount: f64 },
}

/// Data applied to a handle; variant must agree with the handle's kind
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    Bars(Vec<Bar>),
    Points(Vec<Point>),
    Slices(Vec<Slice>),
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        match self {
            ChartData::Bars(bars) => bars.is_empty(),
            ChartData::Points(points) => points.is_empty(),
            ChartData::Slices(slices) => slices.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChartData::Bars(bars) => bars.len(),
            ChartData::Points(points) => points.len(),
            ChartData::Slices(slices) => slices.len(),
        }
    }
}

/// Visible bar-index window; `None` on a handle means fit-all
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalRange {
    pub from: f64,
    pub to: f64,
}

// ============================================================================
// SERIES PREPARATION
// ============================================================================

/// Deduplicate bars by timestamp and sort ascending.
///
/// Tie-break is last-write-wins: for duplicate timestamps the bar appearing
/// later in the input replaces the earlier one.
pub fn prepare_bars(input: impl IntoIterator<Item = Bar>) -> Vec<Bar> {
    let mut by_time: BTreeMap<i64, Bar> = BTreeMap::new();
    for bar in input {
        by_time.insert(bar.time, bar);
    }
    by_time.into_values().collect()
}

/// Deduplicate points by timestamp and sort ascending (last write wins).
pub fn prepare_points(input: impl IntoIterator<Item = Point>) -> Vec<Point> {
    let mut by_time: BTreeMap<i64, Point> = BTreeMap::new();
    for point in input {
        by_time.insert(point.time, point);
    }
    by_time.into_values().collect()
}

/// Convert raw backend candles into normalized bars, dropping rows whose
/// time label fails to parse.
pub fn bars_from_raw(raw: &[RawCandle]) -> Vec<Bar> {
    prepare_bars(raw.iter().filter_map(Bar::from_raw))
}

// ============================================================================
// CHART HANDLE
// ============================================================================

/// Result of applying an update to a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEffect {
    /// Applied data or overlays differed from the previous render
    Changed,
    /// Identical input; the handle's observable state is untouched
    Unchanged,
}

/// State owned by one live chart instance
#[derive(Debug, Clone)]
pub struct ChartHandle {
    kind: ChartKind,
    theme: ChartTheme,
    data: ChartData,
    price_lines: Vec<PriceLine>,
    viewport: Option<LogicalRange>,
    initial_zoom_applied: bool,
}

impl ChartHandle {
    fn new(kind: ChartKind, theme: ChartTheme) -> Self {
        let data = match kind {
            ChartKind::Candles | ChartKind::Line => ChartData::Bars(Vec::new()),
            ChartKind::Donut => ChartData::Slices(Vec::new()),
        };
        Self {
            kind,
            theme,
            data,
            price_lines: Vec::new(),
            viewport: None,
            initial_zoom_applied: false,
        }
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn theme(&self) -> ChartTheme {
        self.theme
    }

    pub fn data(&self) -> &ChartData {
        &self.data
    }

    pub fn price_lines(&self) -> &[PriceLine] {
        &self.price_lines
    }

    /// Visible window; `None` means fit-all content.
    pub fn viewport(&self) -> Option<LogicalRange> {
        self.viewport
    }

    pub fn initial_zoom_applied(&self) -> bool {
        self.initial_zoom_applied
    }

    /// Apply new data and overlays in place.
    ///
    /// The viewport is preserved across updates, except on the first
    /// non-empty load where a fixed trailing window of `initial_zoom_bars`
    /// is applied exactly once (fit-all when the series is shorter).
    pub fn update(
        &mut self,
        data: ChartData,
        price_lines: Vec<PriceLine>,
        initial_zoom_bars: usize,
    ) -> UpdateEffect {
        let unchanged = self.data == data && self.price_lines == price_lines;

        if !self.initial_zoom_applied && !data.is_empty() {
            let total = data.len();
            self.viewport = if total > initial_zoom_bars {
                Some(LogicalRange {
                    from: (total - initial_zoom_bars) as f64,
                    to: total as f64,
                })
            } else {
                None
            };
            self.initial_zoom_applied = true;
        } else if unchanged {
            return UpdateEffect::Unchanged;
        }

        self.data = data;
        self.price_lines = price_lines;
        UpdateEffect::Changed
    }

    /// Simulate a user pan/zoom; preserved by subsequent updates.
    pub fn set_viewport(&mut self, range: Option<LogicalRange>) {
        self.viewport = range;
    }

    /// Re-apply theme options in place. Never touches data or viewport.
    pub fn set_theme(&mut self, theme: ChartTheme) {
        self.theme = theme;
    }

    /// Rearm the one-shot initial zoom; the next data load re-applies it.
    pub fn reset_zoom(&mut self) {
        self.initial_zoom_applied = false;
    }
}

// ============================================================================
// CHART REGISTRY
// ============================================================================

/// Maps a render target id to its live chart handle.
///
/// Mutated only from the poll tick and explicit user actions, a single
/// logical thread, so no locking and no reentrant mutation mid-reconcile.
#[derive(Debug, Default)]
pub struct ChartRegistry {
    handles: HashMap<String, ChartHandle>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the handle for `target`, creating it when absent.
    ///
    /// An existing handle is reused in place so viewport state survives; a
    /// genuine kind change (candles <-> line, or either <-> donut) discards
    /// it and starts fresh, including a rearmed initial zoom.
    pub fn get_or_create(
        &mut self,
        target: &str,
        kind: ChartKind,
        theme: ChartTheme,
    ) -> &mut ChartHandle {
        let rebuild = self
            .handles
            .get(target)
            .is_some_and(|handle| handle.kind != kind);
        if rebuild {
            debug!("chart {}: kind changed, recreating handle", target);
            self.handles.remove(target);
        }

        let handle = self
            .handles
            .entry(target.to_string())
            .or_insert_with(|| ChartHandle::new(kind, theme));
        if handle.theme != theme {
            handle.set_theme(theme);
        }
        handle
    }

    pub fn get(&self, target: &str) -> Option<&ChartHandle> {
        self.handles.get(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.handles.contains_key(target)
    }

    /// Destroy the handle for `target`, releasing its instance state.
    /// A later recreate starts from scratch (fresh viewport, zoom rearmed).
    pub fn destroy(&mut self, target: &str) -> bool {
        self.handles.remove(target).is_some()
    }

    /// Rearm the initial zoom on an existing handle.
    pub fn reset_zoom(&mut self, target: &str) {
        if let Some(handle) = self.handles.get_mut(target) {
            handle.reset_zoom();
        }
    }

    /// Re-theme every live handle in place.
    pub fn set_theme_all(&mut self, theme: ChartTheme) {
        for handle in self.handles.values_mut() {
            handle.set_theme(theme);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}
