//! C1 PriceCache: canonical in-memory `Symbol -> PriceRecord` mapping,
//! sharded across single-writer worker tasks so that exactly one task ever
//! mutates a given symbol's record.

mod shard;

pub use shard::shard_for;

use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::domain::candle::Candle;
use crate::domain::errors::AlertError;
use crate::domain::price_record::{MutationNotice, PriceRecord};
use crate::domain::symbol::Symbol;
use crate::domain::tick::TickEvent;
use crate::domain::timeframe::Timeframe;
use crate::infrastructure::observability::Metrics;
use shard::{Shard, ShardMessage};

const SHARD_INBOX_CAPACITY: usize = 4096;

/// Handle to the sharded PriceCache. Cheap to clone; every clone shares
/// the same underlying shard worker tasks.
#[derive(Clone)]
pub struct PriceCache {
    senders: Vec<mpsc::Sender<ShardMessage>>,
}

impl PriceCache {
    /// Spawns `shard_count` worker tasks, one per shard, each owning a
    /// disjoint partition of symbols.
    pub fn spawn(shard_count: usize, active_timeframes: Vec<Timeframe>, metrics: Metrics) -> Self {
        let shard_count = shard_count.max(1);
        let mut senders = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let (tx, rx) = mpsc::channel(SHARD_INBOX_CAPACITY);
            let shard = Shard::new(active_timeframes.clone(), metrics.clone());
            tokio::spawn(shard.run(rx));
            senders.push(tx);
        }
        Self { senders }
    }

    fn sender_for(&self, symbol: &Symbol) -> &mpsc::Sender<ShardMessage> {
        let idx = shard_for(symbol, self.senders.len());
        &self.senders[idx]
    }

    /// Applies a tick, routed to the shard that owns `tick.symbol`.
    pub async fn apply(&self, tick: TickEvent) -> Result<MutationNotice, AlertError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sender = self.sender_for(&tick.symbol);
        sender
            .send(ShardMessage::Tick { tick, reply: reply_tx })
            .await
            .map_err(|_| AlertError::TransientUpstream {
                reason: "price cache shard unavailable".to_string(),
            })?;
        reply_rx.await.map_err(|_| AlertError::TransientUpstream {
            reason: "price cache shard dropped reply".to_string(),
        })?
    }

    /// Snapshot read of the full record for a symbol.
    pub async fn get(&self, symbol: &Symbol) -> Option<PriceRecord> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sender = self.sender_for(symbol);
        if sender
            .send(ShardMessage::Get {
                symbol: symbol.clone(),
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    /// Snapshot of a symbol's current bucket for one timeframe.
    pub async fn get_candle(&self, symbol: &Symbol, timeframe: Timeframe) -> Option<Candle> {
        let record = self.get(symbol).await?;
        record
            .current_candles
            .get(&timeframe)
            .map(|c| c.to_candle(timeframe))
    }

    /// Broadcasts a bucket roll to every shard, collecting the candles
    /// that closed as a result onto `closed_tx` for CandleStore to append.
    pub async fn roll_bucket(
        &self,
        timeframe: Timeframe,
        new_open_time: i64,
        closed_tx: mpsc::Sender<(Symbol, Timeframe, Candle)>,
    ) {
        for sender in &self.senders {
            if sender
                .send(ShardMessage::BucketRoll {
                    timeframe,
                    new_open_time,
                    closed_tx: closed_tx.clone(),
                })
                .await
                .is_err()
            {
                error!("price cache shard unavailable during bucket roll");
            }
        }
    }
}
