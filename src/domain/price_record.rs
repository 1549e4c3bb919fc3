use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::symbol::Symbol;
use crate::domain::timeframe::Timeframe;

/// The in-progress bucket for a single `(Symbol, Timeframe)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentCandle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl CurrentCandle {
    pub fn open_at(open_time: i64, price: Decimal, volume: Decimal) -> Self {
        Self {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    fn extend(&mut self, price: Decimal, volume: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    pub fn to_candle(&self, timeframe: Timeframe) -> Candle {
        Candle {
            open_time: self.open_time,
            close_time: self.open_time + timeframe.to_millis(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }

    pub fn is_sane(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}

/// Authoritative last-known state for a single symbol: last price/volume,
/// rolling 24h stats, and one in-progress candle per active timeframe.
///
/// Invariants: `low <= open,close <= high` on every current candle;
/// `open_time` equals the timeframe's aligned bucket-open time at the
/// moment the bucket was created; `version` strictly increases on every
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub last_volume: Decimal,
    pub last_update_ms: i64,
    pub day_open: Decimal,
    pub day_high: Decimal,
    pub day_low: Decimal,
    pub day_volume: Decimal,
    pub current_candles: HashMap<Timeframe, CurrentCandle>,
    pub version: u64,
}

impl PriceRecord {
    pub fn first_tick(
        symbol: Symbol,
        price: Decimal,
        volume: Decimal,
        ts_ms: i64,
        timeframes: &[Timeframe],
    ) -> Self {
        let mut current_candles = HashMap::with_capacity(timeframes.len());
        for tf in timeframes {
            let open_time = tf.period_start(ts_ms);
            current_candles.insert(*tf, CurrentCandle::open_at(open_time, price, volume));
        }
        Self {
            symbol,
            last_price: price,
            last_volume: volume,
            last_update_ms: ts_ms,
            day_open: price,
            day_high: price,
            day_low: price,
            day_volume: volume,
            current_candles,
            version: 1,
        }
    }

    pub fn percent_change_24h(&self) -> f64 {
        if self.day_open.is_zero() {
            return 0.0;
        }
        ((self.last_price - self.day_open) / self.day_open * Decimal::ONE_HUNDRED)
            .to_string()
            .parse()
            .unwrap_or(0.0)
    }

    /// Applies a tick to every active timeframe's current candle,
    /// returning the set of buckets that rolled over (closed) as a
    /// result. Callers are expected to have already validated `ts_ms`
    /// is not older than any bucket's open time (out-of-order rejection
    /// happens one layer up, in PriceCache, so it can be counted there).
    pub fn apply_tick(
        &mut self,
        price: Decimal,
        volume: Decimal,
        ts_ms: i64,
    ) -> Vec<(Timeframe, Candle)> {
        let mut closed = Vec::new();
        for tf in Timeframe::all() {
            let aligned_open = tf.period_start(ts_ms);
            let entry = self
                .current_candles
                .entry(tf)
                .or_insert_with(|| CurrentCandle::open_at(aligned_open, price, volume));

            if aligned_open == entry.open_time {
                entry.extend(price, volume);
            } else if aligned_open > entry.open_time {
                closed.push((tf, entry.to_candle(tf)));
                *entry = CurrentCandle::open_at(aligned_open, price, volume);
            }
            // aligned_open < entry.open_time is out-of-order for this
            // timeframe; the caller already rejected it against the
            // primary timeframe, so we leave the bucket untouched here.
        }

        self.last_price = price;
        self.last_volume = volume;
        self.last_update_ms = ts_ms;
        self.day_high = self.day_high.max(price);
        self.day_low = self.day_low.min(price);
        self.day_volume += volume;
        self.version += 1;
        closed
    }

    /// Forces a bucket roll for `timeframe` at `new_open_time`, even if no
    /// tick landed in it: the new bucket carries the last price forward
    /// with zero volume. Called by the scheduler on `BucketRoll`.
    pub fn roll_bucket(&mut self, timeframe: Timeframe, new_open_time: i64) -> Option<Candle> {
        let closed = match self.current_candles.get(&timeframe) {
            Some(current) if current.open_time < new_open_time => Some(current.to_candle(timeframe)),
            _ => None,
        };
        if closed.is_some() {
            self.current_candles.insert(
                timeframe,
                CurrentCandle::open_at(new_open_time, self.last_price, Decimal::ZERO),
            );
            self.version += 1;
        }
        closed
    }
}

/// Emitted by `PriceCache::apply` after mutating a `PriceRecord`.
#[derive(Debug, Clone)]
pub struct MutationNotice {
    pub symbol: Symbol,
    pub price_before: Decimal,
    pub price_after: Decimal,
    pub closed_buckets: Vec<(Timeframe, Candle)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn first_tick_opens_every_active_timeframe() {
        let rec = PriceRecord::first_tick(
            Symbol::new("BTCUSDT"),
            dec!(100),
            dec!(1),
            0,
            &[Timeframe::OneMin, Timeframe::OneHour],
        );
        assert_eq!(rec.version, 1);
        assert_eq!(rec.current_candles.len(), 2);
    }

    #[test]
    fn apply_tick_within_bucket_extends_without_closing() {
        let mut rec = PriceRecord::first_tick(
            Symbol::new("BTCUSDT"),
            dec!(100),
            dec!(1),
            0,
            &[Timeframe::OneMin],
        );
        let closed = rec.apply_tick(dec!(101), dec!(1), 30_000);
        assert!(closed.is_empty());
        assert_eq!(rec.version, 2);
        let candle = rec.current_candles[&Timeframe::OneMin];
        assert_eq!(candle.close, dec!(101));
        assert_eq!(candle.high, dec!(101));
    }

    #[test]
    fn apply_tick_crossing_bucket_boundary_closes_previous() {
        let mut rec = PriceRecord::first_tick(
            Symbol::new("BTCUSDT"),
            dec!(100),
            dec!(1),
            0,
            &[Timeframe::OneMin],
        );
        let closed = rec.apply_tick(dec!(105), dec!(2), 60_000);
        assert_eq!(closed.len(), 1);
        let (tf, candle) = &closed[0];
        assert_eq!(*tf, Timeframe::OneMin);
        assert_eq!(candle.close, dec!(100));
        let new_current = rec.current_candles[&Timeframe::OneMin];
        assert_eq!(new_current.open_time, 60_000);
        assert_eq!(new_current.open, dec!(105));
    }

    #[test]
    fn roll_bucket_carries_last_price_forward_with_zero_volume() {
        let mut rec = PriceRecord::first_tick(
            Symbol::new("BTCUSDT"),
            dec!(100),
            dec!(1),
            0,
            &[Timeframe::OneMin],
        );
        let closed = rec.roll_bucket(Timeframe::OneMin, 60_000);
        assert!(closed.is_some());
        let current = rec.current_candles[&Timeframe::OneMin];
        assert_eq!(current.open, dec!(100));
        assert_eq!(current.volume, Decimal::ZERO);
    }
}
