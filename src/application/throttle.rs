//! C7 ThrottleGate: enforces "at most N triggers per rule per bucket of
//! the rule's throttle timeframe", keyed by
//! `(ruleId, throttleTimeframe, bucketOpenTime)`. Counters are dropped
//! wholesale on `BucketRoll`, so a new bucket always allows firing again
//! with no per-rule bookkeeping required from the caller.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::rule::RuleId;
use crate::domain::timeframe::Timeframe;
use crate::domain::trigger::ThrottleKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Suppressed,
}

/// Owns the throttle counters. Not `Send`-shared directly - a single task
/// owns this and serializes access the same way the `PriceCache` shards
/// do, since every counter mutation must be atomic with respect to the
/// admit decision (compare-and-increment).
#[derive(Default)]
pub struct ThrottleGate {
    counters: HashMap<ThrottleKey, u32>,
}

impl ThrottleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aligns `now_ms` to `timeframe`'s bucket, increments the counter for
    /// `(rule_id, timeframe, bucket_open)`, and admits iff the
    /// post-increment count is within `max_per_bucket`.
    pub fn try_fire(
        &mut self,
        rule_id: RuleId,
        timeframe: Timeframe,
        max_per_bucket: u32,
        now_ms: i64,
    ) -> (Admission, i64) {
        let bucket_open = timeframe.period_start(now_ms);
        let key = ThrottleKey {
            rule_id,
            throttle_timeframe: timeframe,
            bucket_open_time: bucket_open,
        };
        let count = self.counters.entry(key).or_insert(0);
        *count += 1;
        let admission = if *count <= max_per_bucket {
            Admission::Admitted
        } else {
            debug!(%rule_id, bucket_open, count = *count, max = max_per_bucket, "throttle suppressed");
            Admission::Suppressed
        };
        (admission, bucket_open)
    }

    /// Drops every counter whose timeframe matches and whose bucket is
    /// strictly older than `new_open_time`. Called on `BucketRoll`.
    pub fn roll_bucket(&mut self, timeframe: Timeframe, new_open_time: i64) {
        self.counters
            .retain(|key, _| key.throttle_timeframe != timeframe || key.bucket_open_time >= new_open_time);
    }

    pub fn active_counters(&self) -> usize {
        self.counters.len()
    }
}
