use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::rule::RuleId;
use crate::domain::symbol::Symbol;
use crate::domain::timeframe::Timeframe;

/// Key under which the throttle gate counts firings:
/// `(ruleId, throttleTimeframe, bucketOpenTime)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub rule_id: RuleId,
    pub throttle_timeframe: Timeframe,
    pub bucket_open_time: i64,
}

/// The numeric evidence captured at the moment a rule's predicates were
/// found true, attached to the trigger for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredicateSnapshot {
    pub price: Option<Decimal>,
    pub percent_change: Option<f64>,
    pub rsi: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub volume_spike_ratio: Option<f64>,
    pub candle_open: Option<Decimal>,
    pub candle_high: Option<Decimal>,
    pub candle_low: Option<Decimal>,
    pub candle_close: Option<Decimal>,
}

/// What the evaluation engine emits to the throttle gate before a trigger
/// becomes durable; it is not yet stamped with a stable id.
#[derive(Debug, Clone)]
pub struct TriggerDecision {
    pub rule_id: RuleId,
    pub symbol: Symbol,
    pub fired_at: DateTime<Utc>,
    pub price_at_firing: Decimal,
    pub bucket_open_time: i64,
    pub throttle_timeframe: Timeframe,
    pub predicate_snapshot: PredicateSnapshot,
}

/// An immutable, durable record of a rule firing. `id` is derived from
/// `(rule_id, throttle_timeframe, bucket_open_time, seq)` so that replaying
/// the same firing twice produces the same id (journal idempotency).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: uuid::Uuid,
    pub rule_id: RuleId,
    pub symbol: Symbol,
    pub fired_at: DateTime<Utc>,
    pub price_at_firing: Decimal,
    pub bucket_open_time: i64,
    pub throttle_timeframe: Timeframe,
    pub predicate_snapshot: PredicateSnapshot,
}

impl TriggerEvent {
    pub fn from_decision(decision: TriggerDecision, seq: u32) -> Self {
        let id = Self::derive_id(
            decision.rule_id,
            decision.throttle_timeframe,
            decision.bucket_open_time,
            seq,
        );
        Self {
            id,
            rule_id: decision.rule_id,
            symbol: decision.symbol,
            fired_at: decision.fired_at,
            price_at_firing: decision.price_at_firing,
            bucket_open_time: decision.bucket_open_time,
            throttle_timeframe: decision.throttle_timeframe,
            predicate_snapshot: decision.predicate_snapshot,
        }
    }

    fn derive_id(rule_id: RuleId, timeframe: Timeframe, bucket_open_time: i64, seq: u32) -> uuid::Uuid {
        let namespace = uuid::Uuid::NAMESPACE_OID;
        let name = format!("{rule_id}:{}:{bucket_open_time}:{seq}", timeframe.to_binance_string());
        uuid::Uuid::new_v5(&namespace, name.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn decision() -> TriggerDecision {
        TriggerDecision {
            rule_id: RuleId::nil(),
            symbol: Symbol::new("BTCUSDT"),
            fired_at: Utc::now(),
            price_at_firing: dec!(100),
            bucket_open_time: 0,
            throttle_timeframe: Timeframe::OneHour,
            predicate_snapshot: PredicateSnapshot::default(),
        }
    }

    #[test]
    fn same_inputs_derive_the_same_id() {
        let a = TriggerEvent::from_decision(decision(), 0);
        let b = TriggerEvent::from_decision(decision(), 0);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_seq_derives_a_different_id() {
        let a = TriggerEvent::from_decision(decision(), 0);
        let b = TriggerEvent::from_decision(decision(), 1);
        assert_ne!(a.id, b.id);
    }
}
