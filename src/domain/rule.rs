use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::symbol::Symbol;
use crate::domain::timeframe::Timeframe;

pub type RuleId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Above,
    Below,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMode {
    CurrentCandleOpen,
    ReferencePriceAtCreation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    PriceLevel { value: Decimal },
    Percent { value: f64, baseline: BaselineMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    AboveOpen,
    BelowOpen,
    Green,
    Red,
    Doji,
    BullishHammer,
    BearishHammer,
    LongUpperWick,
    LongLowerWick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleShapeSpec {
    pub timeframes: Vec<Timeframe>,
    pub shape: ShapeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorCondition {
    Above { level: f64 },
    Below { level: f64 },
    CrossingUp { level: f64 },
    CrossingDown { level: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RsiSpec {
    pub timeframe: Timeframe,
    pub period: usize,
    pub condition: IndicatorCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmaCrossCondition {
    Above,
    Below,
    CrossingUp,
    CrossingDown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmaSpec {
    pub timeframe: Timeframe,
    pub fast_period: usize,
    pub slow_period: usize,
    pub condition: EmaCrossCondition,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeSpikeSpec {
    pub timeframe: Timeframe,
    pub multiplier: f64,
    pub window: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThrottleSpec {
    pub timeframe: Timeframe,
    pub max_per_bucket: u32,
}

impl Default for ThrottleSpec {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::OneHour,
            max_per_bucket: 1,
        }
    }
}

/// The full predicate set a user configured for one alert rule.
///
/// `reference_price` is only meaningful when `target` is
/// `Percent { baseline: ReferencePriceAtCreation, .. }`; it is pinned at
/// creation and never moves on edit (see DESIGN.md's Open Question log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub target: Target,
    pub reference_price: Option<Decimal>,
    pub candle_shape: Option<CandleShapeSpec>,
    pub rsi: Option<RsiSpec>,
    pub ema: Option<EmaSpec>,
    pub volume_spike: Option<VolumeSpikeSpec>,
    pub min_daily_volume: Option<Decimal>,
    pub throttle: ThrottleSpec,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Every `(Timeframe)` this rule needs warmed-up candle history for,
    /// beyond the always-available current-bucket view in PriceCache.
    ///
    /// `candle_shape` is deliberately absent here: the shape predicate
    /// classifies PriceCache's live current candle, never a CandleStore
    /// history slice, so it has no warm-up dependency to gate on.
    pub fn required_series(&self) -> HashSet<(Timeframe, usize)> {
        let mut set = HashSet::new();
        if let Some(spec) = &self.rsi {
            set.insert((spec.timeframe, spec.period + 2));
        }
        if let Some(spec) = &self.ema {
            let period = spec.slow_period.max(spec.fast_period);
            set.insert((spec.timeframe, period + 2));
        }
        if let Some(spec) = &self.volume_spike {
            set.insert((spec.timeframe, spec.window + 1));
        }
        set
    }
}

/// Observable health of a rule through the optional read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Armed,
    WarmingUp,
    Dormant,
    SuppressedThisBucket,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_rule() -> Rule {
        Rule {
            id: RuleId::nil(),
            symbol: Symbol::new("BTCUSDT"),
            direction: Direction::Above,
            target: Target::PriceLevel { value: dec!(100) },
            reference_price: None,
            candle_shape: None,
            rsi: Some(RsiSpec {
                timeframe: Timeframe::OneHour,
                period: 14,
                condition: IndicatorCondition::CrossingUp { level: 70.0 },
            }),
            ema: None,
            volume_spike: None,
            min_daily_volume: None,
            throttle: ThrottleSpec::default(),
            active: true,
            created_at: Utc::now(),
            last_triggered_at: None,
        }
    }

    #[test]
    fn required_series_includes_rsi_lookback_with_slack() {
        let rule = sample_rule();
        let series = rule.required_series();
        assert!(series.contains(&(Timeframe::OneHour, 16)));
    }

    #[test]
    fn default_throttle_is_one_per_hour() {
        let t = ThrottleSpec::default();
        assert_eq!(t.max_per_bucket, 1);
        assert_eq!(t.timeframe, Timeframe::OneHour);
    }
}
