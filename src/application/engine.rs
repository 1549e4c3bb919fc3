//! C6 EvaluationEngine: the hard center of the system. For each tick,
//! applies it to the price cache, resolves the affected rules, evaluates
//! every configured predicate (AND-combined), and hands admitted firings
//! to the caller for journaling and fan-out via `TriggerBus`.
//!
//! Indicators are always recomputed on demand from `CandleStore` slices -
//! nothing here caches an RSI or EMA value across ticks, per the
//! re-architecture away from mixing "price update" and "indicator
//! recompute" responsibilities.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::application::alert_index::AlertIndex;
use crate::application::cache::PriceCache;
use crate::application::candle_store::CandleStore;
use crate::application::indicators::{classify_shape, ema, rsi_series, volume_spike_ratio};
use crate::application::throttle::{Admission, ThrottleGate};
use crate::domain::errors::AlertError;
use crate::domain::rule::{
    BaselineMode, CandleShapeSpec, Direction, EmaCrossCondition, EmaSpec, IndicatorCondition, Rule,
    RsiSpec, Target, VolumeSpikeSpec,
};
use crate::domain::tick::TickEvent;
use crate::domain::trigger::{PredicateSnapshot, TriggerDecision};
use crate::infrastructure::observability::Metrics;

/// Holds handles to every component a tick's evaluation touches. Cheap to
/// clone; every clone shares the same underlying cache shards and index.
#[derive(Clone)]
pub struct EvaluationEngine {
    cache: PriceCache,
    candles: CandleStore,
    index: AlertIndex,
    metrics: Metrics,
}

impl EvaluationEngine {
    pub fn new(cache: PriceCache, candles: CandleStore, index: AlertIndex, metrics: Metrics) -> Self {
        Self { cache, candles, index, metrics }
    }

    /// Applies one tick end-to-end and returns every `TriggerDecision`
    /// admitted by `throttle`. Throttle state mutation happens here, on
    /// the same per-shard sequence that evaluates the rule, so admission
    /// is atomic with respect to the predicate check that produced it.
    pub async fn evaluate(
        &self,
        tick: TickEvent,
        throttle: &mut ThrottleGate,
    ) -> Result<Vec<TriggerDecision>, AlertError> {
        let _guard = self.metrics.tick_evaluation_seconds.start_timer();
        let notice = self.cache.apply(tick.clone()).await?;
        if !notice.closed_buckets.is_empty() {
            debug!(symbol = %tick.symbol, closed = notice.closed_buckets.len(), "tick closed buckets");
        }

        let snap = self.index.snapshot();
        let rules = snap.rules_for(&tick.symbol);
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let mut decisions = Vec::with_capacity(rules.len());
        for rule in rules {
            if !rule.active {
                continue;
            }
            // A rule held dormant for an unseen symbol is armed again the
            // first time that symbol produces a tick - which is exactly
            // this call, since `rules_for` only returns rules for
            // `tick.symbol`.
            if snap.is_dormant(&rule.id) {
                self.index.apply(crate::application::alert_index::IndexMutation::SetDormant {
                    rule_id: rule.id,
                    dormant: false,
                });
            }
            match self.evaluate_rule(&rule, &tick).await {
                Ok(Some(predicate_snapshot)) => {
                    let (admission, bucket_open) = throttle.try_fire(
                        rule.id,
                        rule.throttle.timeframe,
                        rule.throttle.max_per_bucket,
                        tick.ts_ms,
                    );
                    match admission {
                        Admission::Admitted => decisions.push(TriggerDecision {
                            rule_id: rule.id,
                            symbol: tick.symbol.clone(),
                            fired_at: chrono::Utc::now(),
                            price_at_firing: tick.price,
                            bucket_open_time: bucket_open,
                            throttle_timeframe: rule.throttle.timeframe,
                            predicate_snapshot,
                        }),
                        Admission::Suppressed => self.metrics.throttle_suppressed_total.inc(),
                    }
                }
                Ok(None) => {}
                Err(AlertError::WarmingUp { .. }) => {
                    self.metrics.warming_up_skips_total.inc();
                }
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "predicate evaluation error");
                }
            }
        }
        Ok(decisions)
    }

    /// Evaluates every configured predicate on `rule`, AND-combined.
    /// `Ok(None)` means "evaluated, did not fire"; `Err(WarmingUp)` means
    /// a dependent series has not finished warm-up and the rule is
    /// skipped entirely this tick.
    async fn evaluate_rule(
        &self,
        rule: &Rule,
        tick: &TickEvent,
    ) -> Result<Option<PredicateSnapshot>, AlertError> {
        for (timeframe, depth) in rule.required_series() {
            if !self.candles.is_warmed_up(&rule.symbol, timeframe).await {
                let have = self.candles.last_n(&rule.symbol, timeframe, depth).await.len();
                return Err(AlertError::WarmingUp {
                    symbol: rule.symbol.to_string(),
                    timeframe: timeframe.to_binance_string().to_string(),
                    have,
                    need: depth,
                });
            }
        }

        let mut snapshot = PredicateSnapshot {
            price: Some(tick.price),
            ..PredicateSnapshot::default()
        };

        if !self.target_predicate(rule, tick, &mut snapshot).await {
            return Ok(None);
        }
        if let Some(spec) = &rule.candle_shape {
            if !self.candle_shape_predicate(rule, spec, &mut snapshot).await {
                return Ok(None);
            }
        }
        if let Some(spec) = &rule.rsi {
            if !self.rsi_predicate(rule, spec, &mut snapshot).await {
                return Ok(None);
            }
        }
        if let Some(spec) = &rule.ema {
            if !self.ema_predicate(rule, spec, &mut snapshot).await {
                return Ok(None);
            }
        }
        if let Some(spec) = &rule.volume_spike {
            if !self.volume_spike_predicate(rule, spec, &mut snapshot).await {
                return Ok(None);
            }
        }
        if let Some(threshold) = rule.min_daily_volume {
            let day_volume = self
                .cache
                .get(&rule.symbol)
                .await
                .map(|record| record.day_volume)
                .unwrap_or_default();
            if day_volume < threshold {
                return Ok(None);
            }
        }

        Ok(Some(snapshot))
    }

    /// `baseline=CurrentCandleOpen` resolves against the rule's own
    /// throttle timeframe: the domain model ties one working timeframe to
    /// each rule (its throttle bucket), and nothing else on `Rule`
    /// names a second timeframe for the percent baseline (see DESIGN.md).
    async fn target_predicate(&self, rule: &Rule, tick: &TickEvent, snapshot: &mut PredicateSnapshot) -> bool {
        match &rule.target {
            Target::PriceLevel { value } => match rule.direction {
                Direction::Above => tick.price >= *value,
                Direction::Below => tick.price <= *value,
                Direction::Either => true,
            },
            Target::Percent { value, baseline } => {
                let baseline_price = match baseline {
                    BaselineMode::CurrentCandleOpen => {
                        match self.cache.get_candle(&rule.symbol, rule.throttle.timeframe).await {
                            Some(candle) => candle.open,
                            None => return false,
                        }
                    }
                    BaselineMode::ReferencePriceAtCreation => match rule.reference_price {
                        Some(price) => price,
                        None => return false,
                    },
                };
                if baseline_price.is_zero() {
                    return false;
                }
                let signed_change =
                    decimal_to_f64((tick.price - baseline_price) / baseline_price * Decimal::ONE_HUNDRED);
                snapshot.percent_change = Some(signed_change);
                match rule.direction {
                    Direction::Above => signed_change >= *value,
                    Direction::Below => signed_change <= -*value,
                    Direction::Either => signed_change.abs() >= *value,
                }
            }
        }
    }

    /// All configured timeframes must show the shape simultaneously.
    async fn candle_shape_predicate(
        &self,
        rule: &Rule,
        spec: &CandleShapeSpec,
        snapshot: &mut PredicateSnapshot,
    ) -> bool {
        for timeframe in &spec.timeframes {
            let candle = match self.cache.get_candle(&rule.symbol, *timeframe).await {
                Some(candle) => candle,
                None => return false,
            };
            if *timeframe == rule.throttle.timeframe {
                snapshot.candle_open = Some(candle.open);
                snapshot.candle_high = Some(candle.high);
                snapshot.candle_low = Some(candle.low);
                snapshot.candle_close = Some(candle.close);
            }
            if !classify_shape(&candle).contains(&spec.shape) {
                return false;
            }
        }
        true
    }

    async fn rsi_predicate(&self, rule: &Rule, spec: &RsiSpec, snapshot: &mut PredicateSnapshot) -> bool {
        // `Above`/`Below` only ever read `curr`, so `period + 1` closes
        // suffice; the crossing conditions also read `prev` and need one
        // more close than that.
        let needs_prev = matches!(
            spec.condition,
            IndicatorCondition::CrossingUp { .. } | IndicatorCondition::CrossingDown { .. }
        );
        let depth = if needs_prev { spec.period + 2 } else { spec.period + 1 };
        let candles = self.candles.last_n(&rule.symbol, spec.timeframe, depth).await;
        let closes: Vec<f64> = candles.iter().map(|c| decimal_to_f64(c.close)).collect();
        let (prev, curr) = rsi_series(&closes, spec.period);
        let curr = match curr {
            Some(value) => value,
            None => return false,
        };
        snapshot.rsi = Some(curr);
        match spec.condition {
            IndicatorCondition::Above { level } => curr > level,
            IndicatorCondition::Below { level } => curr < level,
            IndicatorCondition::CrossingUp { level } => prev.is_some_and(|p| p < level && curr >= level),
            IndicatorCondition::CrossingDown { level } => prev.is_some_and(|p| p > level && curr <= level),
        }
    }

    async fn ema_predicate(&self, rule: &Rule, spec: &EmaSpec, snapshot: &mut PredicateSnapshot) -> bool {
        let period = spec.slow_period.max(spec.fast_period);
        let candles = self.candles.last_n(&rule.symbol, spec.timeframe, period + 2).await;
        let closes: Vec<f64> = candles.iter().map(|c| decimal_to_f64(c.close)).collect();

        let (prev_fast, curr_fast) = prev_and_current(&closes, spec.fast_period, |slice, period| ema(slice, period));
        let (prev_slow, curr_slow) = prev_and_current(&closes, spec.slow_period, |slice, period| ema(slice, period));
        let (curr_fast, curr_slow) = match (curr_fast, curr_slow) {
            (Some(fast), Some(slow)) => (fast, slow),
            _ => return false,
        };
        snapshot.ema_fast = Some(curr_fast);
        snapshot.ema_slow = Some(curr_slow);

        match spec.condition {
            EmaCrossCondition::Above => curr_fast > curr_slow,
            EmaCrossCondition::Below => curr_fast < curr_slow,
            EmaCrossCondition::CrossingUp => prev_fast
                .zip(prev_slow)
                .is_some_and(|(pf, ps)| pf <= ps && curr_fast > curr_slow),
            EmaCrossCondition::CrossingDown => prev_fast
                .zip(prev_slow)
                .is_some_and(|(pf, ps)| pf >= ps && curr_fast < curr_slow),
        }
    }

    async fn volume_spike_predicate(
        &self,
        rule: &Rule,
        spec: &VolumeSpikeSpec,
        snapshot: &mut PredicateSnapshot,
    ) -> bool {
        let current_candle = match self.cache.get_candle(&rule.symbol, spec.timeframe).await {
            Some(candle) => candle,
            None => return false,
        };
        let history = self.candles.last_n(&rule.symbol, spec.timeframe, spec.window).await;
        let volumes: Vec<f64> = history.iter().map(|c| decimal_to_f64(c.volume)).collect();
        let current_volume = decimal_to_f64(current_candle.volume);

        let ratio = match volume_spike_ratio(current_volume, &volumes, spec.window) {
            Some(ratio) => ratio,
            None => return false,
        };
        snapshot.volume_spike_ratio = Some(ratio);
        ratio >= spec.multiplier
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

/// Runs `indicator` twice over a trailing window of `period + 2` closes:
/// once over the oldest `period + 1` of them (the "previous" reading, as
/// of the candle before the most recent close) and once over the newest
/// `period + 1` (the "current" reading). `None` for either half means
/// there isn't enough history yet.
fn prev_and_current(
    closes: &[f64],
    period: usize,
    indicator: impl Fn(&[f64], usize) -> Option<f64>,
) -> (Option<f64>, Option<f64>) {
    let need = period + 2;
    if period == 0 || closes.len() < need {
        return (None, None);
    }
    let window = &closes[closes.len() - need..];
    let curr = indicator(&window[1..], period);
    let prev = indicator(&window[..need - 1], period);
    (prev, curr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::domain::rule::{RuleId, ThrottleSpec};
    use crate::domain::symbol::Symbol;
    use crate::domain::timeframe::Timeframe;

    fn base_rule(symbol: &str) -> Rule {
        Rule {
            id: RuleId::new_v4(),
            symbol: Symbol::new(symbol),
            direction: Direction::Above,
            target: Target::PriceLevel { value: dec!(100) },
            reference_price: None,
            candle_shape: None,
            rsi: None,
            ema: None,
            volume_spike: None,
            min_daily_volume: None,
            throttle: ThrottleSpec { timeframe: Timeframe::OneHour, max_per_bucket: 1 },
            active: true,
            created_at: chrono::Utc::now(),
            last_triggered_at: None,
        }
    }

    fn engine() -> (EvaluationEngine, AlertIndex) {
        let metrics = Metrics::new().unwrap();
        let cache = PriceCache::spawn(1, Timeframe::all().to_vec(), metrics.clone());
        let candles = CandleStore::new(256);
        let index = AlertIndex::new();
        (EvaluationEngine::new(cache, candles, index.clone(), metrics), index)
    }

    fn tick(symbol: &str, price: rust_decimal::Decimal, ts_ms: i64) -> TickEvent {
        TickEvent {
            symbol: Symbol::new(symbol),
            price,
            volume: dec!(1),
            ts_ms,
            day_open: None,
            day_high: None,
            day_low: None,
            day_volume: None,
            resync: false,
        }
    }

    #[tokio::test]
    async fn s1_single_price_crossing_fires_exactly_once() {
        let (engine, index) = engine();
        let rule = base_rule("XY");
        let rule_id = rule.id;
        index.apply(crate::application::alert_index::IndexMutation::Upsert(rule));
        let mut throttle = ThrottleGate::new();

        let prices = [dec!(99), dec!(99.5), dec!(100.0), dec!(101), dec!(102)];
        let mut fired = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let ts = i as i64 * 60_000;
            let decisions = engine.evaluate(tick("XY", *price, ts), &mut throttle).await.unwrap();
            fired.extend(decisions);
        }

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_id, rule_id);
        assert_eq!(fired[0].price_at_firing, dec!(100.0));
    }

    #[tokio::test]
    async fn throttle_suppresses_a_second_firing_in_the_same_bucket() {
        let (engine, index) = engine();
        let mut rule = base_rule("XY");
        rule.throttle = ThrottleSpec { timeframe: Timeframe::OneHour, max_per_bucket: 1 };
        index.apply(crate::application::alert_index::IndexMutation::Upsert(rule));
        let mut throttle = ThrottleGate::new();

        let first = engine.evaluate(tick("XY", dec!(101), 0), &mut throttle).await.unwrap();
        let second = engine.evaluate(tick("XY", dec!(102), 60_000), &mut throttle).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
    }

    #[tokio::test]
    async fn min_daily_volume_gate_blocks_firing_below_threshold() {
        let (engine, index) = engine();
        let mut rule = base_rule("XY");
        rule.min_daily_volume = Some(dec!(1000));
        index.apply(crate::application::alert_index::IndexMutation::Upsert(rule));
        let mut throttle = ThrottleGate::new();

        // day_volume accrues 1 per tick (tick volume is 1) - far under 1000.
        let decisions = engine.evaluate(tick("XY", dec!(101), 0), &mut throttle).await.unwrap();
        assert!(decisions.is_empty());
    }

    #[tokio::test]
    async fn rsi_predicate_undefined_without_enough_history_does_not_fire() {
        let (engine, index) = engine();
        let mut rule = base_rule("XY");
        rule.rsi = Some(RsiSpec {
            timeframe: Timeframe::OneHour,
            period: 14,
            condition: IndicatorCondition::Above { level: 50.0 },
        });
        index.apply(crate::application::alert_index::IndexMutation::Upsert(rule.clone()));
        // is_warmed_up is false until explicitly marked, so this is expected
        // to be reported through `warming_up` (WarmingUp error swallowed by
        // `evaluate`), not treated as a hard failure.
        let mut throttle = ThrottleGate::new();
        let decisions = engine.evaluate(tick("XY", dec!(101), 0), &mut throttle).await.unwrap();
        assert!(decisions.is_empty());
    }

    #[tokio::test]
    async fn a_dormant_rule_is_rearmed_by_its_symbols_first_tick() {
        let (engine, index) = engine();
        let rule = base_rule("XY");
        let rule_id = rule.id;
        index.apply(crate::application::alert_index::IndexMutation::Upsert(rule));
        index.apply(crate::application::alert_index::IndexMutation::SetDormant {
            rule_id,
            dormant: true,
        });
        assert!(index.snapshot().is_dormant(&rule_id));

        let mut throttle = ThrottleGate::new();
        let decisions = engine.evaluate(tick("XY", dec!(101), 0), &mut throttle).await.unwrap();

        assert!(!index.snapshot().is_dormant(&rule_id));
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn prev_and_current_needs_period_plus_two_closes() {
        let closes = vec![1.0, 2.0, 3.0];
        let (prev, curr) = prev_and_current(&closes, 1, ema);
        assert!(prev.is_some());
        assert!(curr.is_some());
        let (prev_short, curr_short) = prev_and_current(&closes[..2], 1, ema);
        assert!(prev_short.is_none());
        assert!(curr_short.is_none());
    }
}
