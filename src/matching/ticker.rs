//! Rolling 24h trade statistics.

use crate::models::Ticker;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Trades of the last 24 hours for one market.
#[derive(Debug, Default)]
pub struct TickerWindow {
    trades: VecDeque<(DateTime<Utc>, Decimal, Decimal)>,
    last: Option<Decimal>,
}

impl TickerWindow {
    /// Window length.
    pub fn span() -> Duration {
        Duration::hours(24)
    }

    /// Records a trade and drops trades that left the window.
    pub fn record(&mut self, at: DateTime<Utc>, price: Decimal, amount: Decimal) {
        self.trades.push_back((at, price, amount));
        self.last = Some(price);
        self.prune(at);
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Self::span();
        while self.trades.front().is_some_and(|(at, _, _)| *at < cutoff) {
            self.trades.pop_front();
        }
    }

    /// Computes the ticker as of `now`.
    ///
    /// `last` survives an idle window so quiet markets still report a price.
    #[must_use]
    pub fn ticker(
        &self,
        symbol: &str,
        bid: Option<Decimal>,
        ask: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Ticker {
        let cutoff = now - Self::span();
        let mut open = None;
        let mut high: Option<Decimal> = None;
        let mut low: Option<Decimal> = None;
        let mut base_volume = Decimal::ZERO;
        let mut quote_volume = Decimal::ZERO;

        for (_, price, amount) in self.trades.iter().filter(|(at, _, _)| *at >= cutoff) {
            open.get_or_insert(*price);
            high = Some(high.map_or(*price, |h| h.max(*price)));
            low = Some(low.map_or(*price, |l| l.min(*price)));
            base_volume += *amount;
            quote_volume += *price * *amount;
        }

        let change = match (open, self.last) {
            (Some(open), Some(last)) if !open.is_zero() => {
                ((last - open) / open * Decimal::ONE_HUNDRED).round_dp(2)
            }
            _ => Decimal::ZERO,
        };

        Ticker {
            symbol: symbol.to_string(),
            last: self.last,
            open,
            high,
            low,
            bid,
            ask,
            base_volume,
            quote_volume,
            change,
            timestamp: now,
        }
    }
}
