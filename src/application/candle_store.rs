//! C2 CandleStore: bounded per-`(Symbol, Timeframe)` historical OHLCV
//! series used by indicator computations. A pure map driven by explicit
//! `append` calls from the scheduler/shards - never a ticking cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::candle::Candle;
use crate::domain::symbol::Symbol;
use crate::domain::timeframe::Timeframe;

/// A bounded ring of candles in ascending `open_time` order for one
/// `(Symbol, Timeframe)` pair, plus whether warm-up has completed.
struct Series {
    candles: VecDeque<Candle>,
    capacity: usize,
    warmed_up: bool,
}

impl Series {
    fn new(capacity: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity),
            capacity,
            warmed_up: false,
        }
    }

    fn append(&mut self, candle: Candle) {
        if let Some(last) = self.candles.back() {
            if candle.open_time <= last.open_time {
                // Not a genuinely new bucket (duplicate roll, or a
                // warm-up fetch racing a live append) - ignore silently,
                // the series already has this point in time covered.
                return;
            }
        }
        if self.candles.len() == self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    fn last_n(&self, n: usize) -> Vec<Candle> {
        let len = self.candles.len();
        let start = len.saturating_sub(n);
        self.candles.iter().skip(start).copied().collect()
    }
}

/// Shared handle to the candle store. Internally keyed by
/// `(Symbol, Timeframe)`; guarded by a single `RwLock` since candle
/// history mutates far less often than `PriceCache` and readers vastly
/// outnumber writers (every rule evaluation reads; only bucket rolls and
/// warm-up write).
#[derive(Clone)]
pub struct CandleStore {
    inner: Arc<RwLock<HashMap<(Symbol, Timeframe), Series>>>,
    default_capacity: usize,
}

impl CandleStore {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
        }
    }

    pub async fn append(&self, symbol: Symbol, timeframe: Timeframe, candle: Candle) {
        let mut guard = self.inner.write().await;
        guard
            .entry((symbol, timeframe))
            .or_insert_with(|| Series::new(self.default_capacity))
            .append(candle);
    }

    /// Bulk-loads warm-up candles for a series and marks it warmed up.
    /// Candles must already be in ascending `open_time` order.
    pub async fn bulk_load(&self, symbol: Symbol, timeframe: Timeframe, candles: Vec<Candle>) {
        let mut guard = self.inner.write().await;
        let series = guard
            .entry((symbol, timeframe))
            .or_insert_with(|| Series::new(self.default_capacity));
        for candle in candles {
            series.append(candle);
        }
        series.warmed_up = true;
    }

    pub async fn last_n(&self, symbol: &Symbol, timeframe: Timeframe, n: usize) -> Vec<Candle> {
        let guard = self.inner.read().await;
        guard
            .get(&(symbol.clone(), timeframe))
            .map(|series| series.last_n(n))
            .unwrap_or_default()
    }

    pub async fn is_warmed_up(&self, symbol: &Symbol, timeframe: Timeframe) -> bool {
        let guard = self.inner.read().await;
        guard
            .get(&(symbol.clone(), timeframe))
            .map(|series| series.warmed_up)
            .unwrap_or(false)
    }

    /// Marks a series warmed up without bulk-loading candles, e.g. when a
    /// rule needs no historical depth beyond the live current bucket.
    pub async fn mark_warmed_up(&self, symbol: Symbol, timeframe: Timeframe) {
        let mut guard = self.inner.write().await;
        guard
            .entry((symbol, timeframe))
            .or_insert_with(|| Series::new(self.default_capacity))
            .warmed_up = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 60_000,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
        }
    }

    #[tokio::test]
    async fn last_n_returns_fewer_when_buffer_not_full() {
        let store = CandleStore::new(256);
        let symbol = Symbol::new("BTCUSDT");
        store.append(symbol.clone(), Timeframe::OneMin, candle(0)).await;
        store.append(symbol.clone(), Timeframe::OneMin, candle(60_000)).await;
        let out = store.last_n(&symbol, Timeframe::OneMin, 10).await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_beyond_capacity() {
        let store = CandleStore::new(2);
        let symbol = Symbol::new("BTCUSDT");
        for i in 0..5 {
            store
                .append(symbol.clone(), Timeframe::OneMin, candle(i * 60_000))
                .await;
        }
        let out = store.last_n(&symbol, Timeframe::OneMin, 10).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].open_time, 3 * 60_000);
        assert_eq!(out[1].open_time, 4 * 60_000);
    }

    #[tokio::test]
    async fn warmed_up_flag_defaults_false() {
        let store = CandleStore::new(256);
        let symbol = Symbol::new("BTCUSDT");
        assert!(!store.is_warmed_up(&symbol, Timeframe::OneHour).await);
        store.mark_warmed_up(symbol.clone(), Timeframe::OneHour).await;
        assert!(store.is_warmed_up(&symbol, Timeframe::OneHour).await);
    }
}
