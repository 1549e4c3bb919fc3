//! Core domain types for the alert engine: symbols, timeframes, candles,
//! rules and triggers. No I/O, no async - everything here is plain data
//! plus the invariants that the rest of the crate leans on.

pub mod candle;
pub mod errors;
pub mod price_record;
pub mod rule;
pub mod symbol;
pub mod tick;
pub mod timeframe;
pub mod trigger;

pub use candle::Candle;
pub use errors::AlertError;
pub use price_record::{CurrentCandle, MutationNotice, PriceRecord};
pub use rule::{Rule, RuleId, RuleStatus};
pub use symbol::Symbol;
pub use tick::TickEvent;
pub use timeframe::Timeframe;
pub use trigger::{ThrottleKey, TriggerDecision, TriggerEvent};
