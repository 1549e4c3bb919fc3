//! Last-write-wins staging buffer between the upstream connection and the
//! per-shard dispatch loop: if consumers cannot keep up, the oldest
//! ticks are dropped in favor of the newest for the same symbol. A plain
//! `HashMap` keyed by symbol already has this property - inserting over
//! an unconsumed entry simply replaces it - so no explicit capacity or
//! eviction policy is needed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Notify;

use crate::domain::symbol::Symbol;
use crate::domain::tick::TickEvent;
use crate::infrastructure::observability::Metrics;

#[derive(Clone)]
pub struct LatestTickBuffer {
    pending: Arc<StdMutex<HashMap<Symbol, TickEvent>>>,
    notify: Arc<Notify>,
}

impl LatestTickBuffer {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(StdMutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Publishes a tick, overwriting any not-yet-drained tick for the same
    /// symbol. Counts the overwrite as a drop, since the older value never
    /// reaches a consumer.
    pub fn publish(&self, tick: TickEvent, metrics: &Metrics) {
        let mut pending = self.pending.lock().expect("ingestion buffer lock poisoned");
        if pending.insert(tick.symbol.clone(), tick).is_some() {
            metrics.ticks_dropped_total.inc();
        }
        drop(pending);
        self.notify.notify_one();
    }

    /// Waits for at least one pending tick, then drains everything
    /// currently buffered. Ticks for different symbols may arrive in any
    /// order; within a symbol only the latest survives until drained.
    pub async fn drain(&self) -> Vec<TickEvent> {
        loop {
            {
                let mut pending = self.pending.lock().expect("ingestion buffer lock poisoned");
                if !pending.is_empty() {
                    return pending.drain().map(|(_, tick)| tick).collect();
                }
            }
            self.notify.notified().await;
        }
    }
}

impl Default for LatestTickBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

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
    async fn second_publish_for_the_same_symbol_overwrites_the_first() {
        let buffer = LatestTickBuffer::new();
        let metrics = Metrics::new().unwrap();
        buffer.publish(tick("BTCUSDT", dec!(100), 0), &metrics);
        buffer.publish(tick("BTCUSDT", dec!(101), 1000), &metrics);

        let drained = buffer.drain().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].price, dec!(101));
    }

    #[tokio::test]
    async fn different_symbols_both_survive_a_drain() {
        let buffer = LatestTickBuffer::new();
        let metrics = Metrics::new().unwrap();
        buffer.publish(tick("BTCUSDT", dec!(100), 0), &metrics);
        buffer.publish(tick("ETHUSDT", dec!(10), 0), &metrics);

        let drained = buffer.drain().await;
        assert_eq!(drained.len(), 2);
    }
}
