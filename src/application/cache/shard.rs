use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::candle::Candle;
use crate::domain::errors::AlertError;
use crate::domain::price_record::{MutationNotice, PriceRecord};
use crate::domain::symbol::Symbol;
use crate::domain::tick::TickEvent;
use crate::domain::timeframe::Timeframe;
use crate::infrastructure::observability::Metrics;

/// One message routed to exactly one shard worker. All mutation of a
/// symbol's `PriceRecord` happens on whichever shard owns it, per the
/// sharded single-writer model.
pub enum ShardMessage {
    Tick {
        tick: TickEvent,
        reply: oneshot::Sender<Result<MutationNotice, AlertError>>,
    },
    BucketRoll {
        timeframe: Timeframe,
        new_open_time: i64,
        closed_tx: mpsc::Sender<(Symbol, Timeframe, Candle)>,
    },
    Get {
        symbol: Symbol,
        reply: oneshot::Sender<Option<PriceRecord>>,
    },
}

/// A single symbol-partition worker: owns a disjoint subset of
/// `Symbol -> PriceRecord` and processes its inbox strictly in order, so
/// a `BucketRoll` is always applied before the next tick that would land
/// in the new bucket.
pub struct Shard {
    records: HashMap<Symbol, PriceRecord>,
    active_timeframes: Vec<Timeframe>,
    metrics: Metrics,
}

impl Shard {
    pub fn new(active_timeframes: Vec<Timeframe>, metrics: Metrics) -> Self {
        Self {
            records: HashMap::new(),
            active_timeframes,
            metrics,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<ShardMessage>) {
        while let Some(msg) = inbox.recv().await {
            match msg {
                ShardMessage::Tick { tick, reply } => {
                    let result = self.apply_tick(tick);
                    let _ = reply.send(result);
                }
                ShardMessage::BucketRoll {
                    timeframe,
                    new_open_time,
                    closed_tx,
                } => {
                    self.roll_bucket(timeframe, new_open_time, &closed_tx).await;
                }
                ShardMessage::Get { symbol, reply } => {
                    let _ = reply.send(self.records.get(&symbol).cloned());
                }
            }
        }
    }

    fn apply_tick(&mut self, tick: TickEvent) -> Result<MutationNotice, AlertError> {
        let record = self.records.entry(tick.symbol.clone()).or_insert_with(|| {
            PriceRecord::first_tick(
                tick.symbol.clone(),
                tick.price,
                tick.volume,
                tick.ts_ms,
                &self.active_timeframes,
            )
        });

        // OneMin's bucket always has the latest open_time of any active
        // timeframe (the finest granularity resets most often), so a tick
        // too old for it is too old for every coarser bucket as well -
        // checking it alone covers the "older than any bucket" rule.
        if let Some(current) = record.current_candles.get(&Timeframe::OneMin) {
            if tick.ts_ms < current.open_time {
                self.metrics.out_of_order_dropped_total.inc();
                warn!(symbol = %tick.symbol, ts = tick.ts_ms, bucket_open = current.open_time, "dropping out-of-order tick");
                return Err(AlertError::OutOfOrderTick {
                    symbol: tick.symbol.to_string(),
                    ts: tick.ts_ms,
                    bucket_open: current.open_time,
                });
            }
        }

        let price_before = record.last_price;
        let closed_buckets = record.apply_tick(tick.price, tick.volume, tick.ts_ms);
        self.metrics.ticks_processed_total.inc();
        debug!(symbol = %tick.symbol, price = %tick.price, closed = closed_buckets.len(), "applied tick");

        Ok(MutationNotice {
            symbol: tick.symbol,
            price_before,
            price_after: record.last_price,
            closed_buckets,
        })
    }

    async fn roll_bucket(
        &mut self,
        timeframe: Timeframe,
        new_open_time: i64,
        closed_tx: &mpsc::Sender<(Symbol, Timeframe, Candle)>,
    ) {
        for record in self.records.values_mut() {
            if let Some(candle) = record.roll_bucket(timeframe, new_open_time) {
                let symbol = record.symbol.clone();
                if closed_tx
                    .send((symbol, timeframe, candle))
                    .await
                    .is_err()
                {
                    // CandleStore writer has gone away; nothing more to do
                    // for this shard's roll.
                    return;
                }
            }
        }
    }

}

/// Hashes a symbol to a shard index in `[0, shard_count)`.
pub fn shard_for(symbol: &Symbol, shard_count: usize) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    symbol.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_for_is_stable_for_the_same_symbol() {
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(shard_for(&symbol, 8), shard_for(&symbol, 8));
    }

    #[test]
    fn shard_for_stays_in_range() {
        let symbol = Symbol::new("ETHUSDT");
        assert!(shard_for(&symbol, 4) < 4);
    }
}
