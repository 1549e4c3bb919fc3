use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::timeframe::Timeframe;

/// A closed OHLCV bucket as stored in the historical series.
///
/// Invariant: `low <= min(open, close) <= max(open, close) <= high` and
/// `volume >= 0`. Within a `(Symbol, Timeframe)` series, `close_time` of
/// candle *n* equals `open_time` of candle *n+1*.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(open_time: i64, timeframe: Timeframe, open: Decimal, volume: Decimal) -> Self {
        Self {
            open_time,
            close_time: open_time + timeframe.to_millis(),
            open,
            high: open,
            low: open,
            close: open,
            volume,
        }
    }

    /// Carry-forward candle for a bucket with no ticks: flat OHLC at
    /// `last_price`, zero volume.
    pub fn flat(open_time: i64, timeframe: Timeframe, last_price: Decimal) -> Self {
        Self::new(open_time, timeframe, last_price, Decimal::ZERO)
    }

    pub fn extend(&mut self, price: Decimal, volume: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn is_sane(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_candle_has_flat_ohlc() {
        let c = Candle::new(0, Timeframe::OneMin, dec!(100), dec!(1));
        assert_eq!(c.open, c.high);
        assert_eq!(c.open, c.low);
        assert_eq!(c.open, c.close);
        assert!(c.is_sane());
    }

    #[test]
    fn extend_tracks_high_low_and_accumulates_volume() {
        let mut c = Candle::new(0, Timeframe::OneMin, dec!(100), dec!(1));
        c.extend(dec!(105), dec!(2));
        c.extend(dec!(95), dec!(3));
        c.extend(dec!(102), dec!(1));
        assert_eq!(c.high, dec!(105));
        assert_eq!(c.low, dec!(95));
        assert_eq!(c.close, dec!(102));
        assert_eq!(c.volume, dec!(7));
        assert!(c.is_sane());
    }

    #[test]
    fn flat_candle_has_zero_volume() {
        let c = Candle::flat(0, Timeframe::OneHour, dec!(50));
        assert_eq!(c.volume, Decimal::ZERO);
        assert!(c.is_sane());
    }
}
