/// timeline.rs – Incremental reducer from trade events to plot-ready series.
///
/// Trades arrive from two sources that overlap freely: the bulk history fetch
/// and the live event stream. The timeline absorbs both through the same
/// `apply` path, de-duplicating by trade id and keeping the merged result in
/// strict timestamp order regardless of arrival order. Derived buy/sell
/// series are rebuilt lazily so a burst of events costs one rebuild, not one
/// per event.
use std::collections::HashSet;

use crate::models::{SeriesPoint, Trade, TradeSide};

#[derive(Default)]
pub struct TradeTimeline {
    /// Merged trades, ordered by (timestamp, id). Ties on timestamp keep a
    /// deterministic order via the id.
    trades: Vec<Trade>,
    seen: HashSet<i64>,
    buys: Vec<SeriesPoint>,
    sells: Vec<SeriesPoint>,
    dirty: bool,
}

impl TradeTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one trade. Returns `true` if it was new, `false` for a
    /// duplicate id (the existing entry wins; the duplicate is discarded).
    pub fn apply(&mut self, trade: Trade) -> bool {
        if !self.seen.insert(trade.id) {
            return false;
        }
        let key = (trade.timestamp, trade.id);
        let pos = self
            .trades
            .partition_point(|t| (t.timestamp, t.id) < key);
        self.trades.insert(pos, trade);
        self.dirty = true;
        true
    }

    /// Replace the timeline with a freshly fetched history. Replays of the
    /// same fetch converge to the same state.
    pub fn set_history(&mut self, trades: Vec<Trade>) -> usize {
        self.clear();
        self.apply_all(trades)
    }

    /// Merge a batch without discarding what is already known (e.g. a
    /// re-fetch after a long disconnect). Returns how many were new.
    pub fn apply_all(&mut self, trades: impl IntoIterator<Item = Trade>) -> usize {
        let mut added = 0;
        for trade in trades {
            if self.apply(trade) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// All trades, oldest first.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// The `count` most recent trades, newest first.
    pub fn recent(&self, count: usize) -> Vec<&Trade> {
        self.trades.iter().rev().take(count).collect()
    }

    /// Buy-side plot points (epoch-millis x, price y), oldest first.
    pub fn buy_series(&mut self) -> &[SeriesPoint] {
        self.rebuild_if_dirty();
        &self.buys
    }

    /// Sell-side plot points, oldest first.
    pub fn sell_series(&mut self) -> &[SeriesPoint] {
        self.rebuild_if_dirty();
        &self.sells
    }

    /// Inclusive x-axis range of the merged data, None when empty.
    pub fn time_bounds(&self) -> Option<(i64, i64)> {
        let first = self.trades.first()?;
        let last = self.trades.last()?;
        Some((first.timestamp.timestamp_millis(), last.timestamp.timestamp_millis()))
    }

    /// Inclusive y-axis range across both sides, None when empty.
    pub fn price_bounds(&self) -> Option<(f64, f64)> {
        let mut iter = self.trades.iter().map(|t| t.price);
        let first = iter.next()?;
        let (mut lo, mut hi) = (first, first);
        for p in iter {
            if p < lo {
                lo = p;
            }
            if p > hi {
                hi = p;
            }
        }
        Some((lo, hi))
    }

    pub fn clear(&mut self) {
        self.trades.clear();
        self.seen.clear();
        self.buys.clear();
        self.sells.clear();
        self.dirty = false;
    }

    fn rebuild_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        self.buys.clear();
        self.sells.clear();
        for trade in &self.trades {
            let point = SeriesPoint {
                x: trade.timestamp.timestamp_millis(),
                y: trade.price,
            };
            match trade.side {
                TradeSide::BUY => self.buys.push(point),
                TradeSide::SELL => self.sells.push(point),
            }
        }
        self.dirty = false;
    }
}
