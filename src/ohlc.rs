//! Candlestick aggregation for market charts.
//!
//! Every executed trade updates one bar per supported interval, so any chart
//! resolution can be served without resampling.

use crate::models::{OhlcBar, OhlcInterval};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Key for storing OHLC bars: (symbol, interval).
type BarKey = (String, OhlcInterval);

/// Collects trades into candlestick bars, keyed by symbol and interval.
#[derive(Debug, Default)]
pub struct OhlcAggregator {
    bars: DashMap<BarKey, BTreeMap<i64, OhlcBar>>,
}

impl OhlcAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a trade executed at `timestamp_secs` in every interval.
    pub fn record_trade(&self, symbol: &str, timestamp_secs: i64, price: Decimal, amount: Decimal) {
        for interval in OhlcInterval::ALL {
            let bar_timestamp = interval.floor_timestamp(timestamp_secs);
            self.bars
                .entry((symbol.to_string(), interval))
                .or_default()
                .entry(bar_timestamp)
                .and_modify(|bar| bar.update(price, amount))
                .or_insert_with(|| OhlcBar::new(bar_timestamp, price, amount));
        }
    }

    /// Bars of `symbol` at `interval` whose start lies in `[from, to]`,
    /// oldest first. When more than `limit` match, the newest are kept.
    #[must_use]
    pub fn get_bars(
        &self,
        symbol: &str,
        interval: OhlcInterval,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Vec<OhlcBar> {
        let Some(bars) = self.bars.get(&(symbol.to_string(), interval)) else {
            return Vec::new();
        };
        let from = from.unwrap_or(i64::MIN);
        let to = to.unwrap_or(i64::MAX);
        if from > to {
            return Vec::new();
        }

        let mut selected: Vec<OhlcBar> = bars
            .range(from..=to)
            .rev()
            .take(limit)
            .map(|(_, bar)| *bar)
            .collect();
        selected.reverse();
        selected
    }

    /// Most recent bar.
    #[must_use]
    pub fn get_latest_bar(&self, symbol: &str, interval: OhlcInterval) -> Option<OhlcBar> {
        self.bars
            .get(&(symbol.to_string(), interval))?
            .values()
            .next_back()
            .copied()
    }

    /// Drops all bars of a symbol.
    pub fn clear_symbol(&self, symbol: &str) {
        for interval in OhlcInterval::ALL {
            self.bars.remove(&(symbol.to_string(), interval));
        }
    }
}
