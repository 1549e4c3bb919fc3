use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::symbol::Symbol;

/// One price update from the upstream exchange feed.
///
/// `resync` is set on the first tick delivered for each symbol after an
/// ingestion reconnect, so downstream components can treat it as a
/// catch-up rather than a genuinely new data point (C1 still applies it
/// normally; C7 is unaffected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    pub symbol: Symbol,
    pub price: Decimal,
    pub volume: Decimal,
    pub ts_ms: i64,
    pub day_open: Option<Decimal>,
    pub day_high: Option<Decimal>,
    pub day_low: Option<Decimal>,
    pub day_volume: Option<Decimal>,
    pub resync: bool,
}
