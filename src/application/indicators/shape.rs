use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::candle::Candle;
use crate::domain::rule::ShapeKind;

const DOJI_BODY_RATIO: Decimal = dec!(0.001);
const TWO: Decimal = dec!(2);

/// Classifies a candle against every shape kind it satisfies
/// simultaneously (a candle can be both `green` and `longUpperWick`, for
/// instance).
pub fn classify_shape(candle: &Candle) -> HashSet<ShapeKind> {
    let mut shapes = HashSet::new();

    let body = candle.body();
    let range = candle.range();
    let upper_wick = candle.high - candle.open.max(candle.close);
    let lower_wick = candle.open.min(candle.close) - candle.low;

    if candle.close > candle.open {
        shapes.insert(ShapeKind::Green);
        shapes.insert(ShapeKind::AboveOpen);
    } else if candle.close < candle.open {
        shapes.insert(ShapeKind::Red);
        shapes.insert(ShapeKind::BelowOpen);
    }

    if range > Decimal::ZERO && body <= DOJI_BODY_RATIO * range {
        shapes.insert(ShapeKind::Doji);
    }

    if lower_wick >= TWO * body && upper_wick <= body && candle.close >= candle.open {
        shapes.insert(ShapeKind::BullishHammer);
    }
    if upper_wick >= TWO * body && lower_wick <= body && candle.close <= candle.open {
        shapes.insert(ShapeKind::BearishHammer);
    }
    if upper_wick >= TWO * body {
        shapes.insert(ShapeKind::LongUpperWick);
    }
    if lower_wick >= TWO * body {
        shapes.insert(ShapeKind::LongLowerWick);
    }

    shapes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeframe::Timeframe;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            open_time: 0,
            close_time: Timeframe::OneMin.to_millis(),
            open,
            high,
            low,
            close,
            volume: dec!(1),
        }
    }

    #[test]
    fn green_candle_is_above_open() {
        let c = candle(dec!(10), dec!(12), dec!(9), dec!(11));
        let shapes = classify_shape(&c);
        assert!(shapes.contains(&ShapeKind::Green));
        assert!(shapes.contains(&ShapeKind::AboveOpen));
        assert!(!shapes.contains(&ShapeKind::Red));
    }

    #[test]
    fn near_zero_body_is_a_doji() {
        let c = candle(dec!(10), dec!(11), dec!(9), dec!(10.0005));
        assert!(classify_shape(&c).contains(&ShapeKind::Doji));
    }

    #[test]
    fn long_lower_wick_with_small_upper_wick_is_a_bullish_hammer() {
        let c = candle(dec!(10), dec!(10.2), dec!(7), dec!(10.1));
        let shapes = classify_shape(&c);
        assert!(shapes.contains(&ShapeKind::BullishHammer));
        assert!(shapes.contains(&ShapeKind::LongLowerWick));
    }

    #[test]
    fn long_upper_wick_with_small_lower_wick_is_a_bearish_hammer() {
        let c = candle(dec!(10), dec!(13), dec!(9.9), dec!(9.95));
        let shapes = classify_shape(&c);
        assert!(shapes.contains(&ShapeKind::BearishHammer));
        assert!(shapes.contains(&ShapeKind::LongUpperWick));
    }
}
