use thiserror::Error;

/// Domain error taxonomy for the alert engine.
///
/// One variant per row of the error-handling design: everything here is
/// local to a tick, a rule, or a subsystem and is logged-and-continued by
/// its caller, except [`AlertError::Configuration`], which is fatal at
/// startup.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("transient upstream failure: {reason}")]
    TransientUpstream { reason: String },

    #[error("insufficient history for {symbol} {timeframe}: have {have}, need {need}")]
    WarmingUp {
        symbol: String,
        timeframe: String,
        have: usize,
        need: usize,
    },

    #[error("out-of-order tick for {symbol}: ts {ts} < bucket open {bucket_open}")]
    OutOfOrderTick {
        symbol: String,
        ts: i64,
        bucket_open: i64,
    },

    #[error("rule {rule_id} references unknown symbol {symbol}; marked dormant")]
    IndexInconsistency { rule_id: String, symbol: String },

    #[error("journal I/O failure: {reason}")]
    JournalIo { reason: String },

    #[error("predicate evaluation error: {reason}")]
    PredicateEvaluation { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warming_up_formats_symbol_and_counts() {
        let err = AlertError::WarmingUp {
            symbol: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            have: 5,
            need: 15,
        };
        let msg = err.to_string();
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("5"));
        assert!(msg.contains("15"));
    }

    #[test]
    fn index_inconsistency_names_the_rule() {
        let err = AlertError::IndexInconsistency {
            rule_id: "r-1".to_string(),
            symbol: "ETHUSDT".to_string(),
        };
        assert!(err.to_string().contains("dormant"));
    }
}
