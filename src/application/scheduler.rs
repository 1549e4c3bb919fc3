//! BoundaryScheduler: the sole timer source in the system. Wakes at
//! each active timeframe's next aligned bucket-open instant and broadcasts
//! a `BucketRoll` that the price cache, candle store and throttle gate
//! consume. No other component owns a timer - every reset-on-time
//! behavior is consolidated here.

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tracing::info;

use crate::domain::timeframe::Timeframe;

#[derive(Debug, Clone, Copy)]
pub struct BucketRoll {
    pub timeframe: Timeframe,
    pub new_open_time: i64,
}

/// Broadcasts `BucketRoll` events. Buffer sized generously since
/// subscribers (shard workers, the throttle gate, CandleStore) must never
/// miss a roll - a missed roll would let a bucket silently re-arm late.
const BROADCAST_CAPACITY: usize = 256;

pub struct BoundaryScheduler {
    timeframes: Vec<Timeframe>,
    tx: broadcast::Sender<BucketRoll>,
}

impl BoundaryScheduler {
    pub fn new(timeframes: Vec<Timeframe>) -> (Self, broadcast::Receiver<BucketRoll>) {
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        (Self { timeframes, tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BucketRoll> {
        self.tx.subscribe()
    }

    /// Runs until `shutdown` fires. Realigns against wall clock once per
    /// minute to absorb drift in the monotonic sleep.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(timeframes = self.timeframes.len(), "boundary scheduler starting");
        let mut last_realign = Instant::now();

        loop {
            let now_ms = Utc::now().timestamp_millis();
            let (next_open_ms, due) = self.earliest_next_boundary(now_ms);
            let sleep_ms = (next_open_ms - now_ms).max(0) as u64;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {
                    for tf in &due {
                        info!(timeframe = ?tf, open = next_open_ms, "bucket roll");
                        let _ = self.tx.send(BucketRoll { timeframe: *tf, new_open_time: next_open_ms });
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("boundary scheduler shutting down");
                        return;
                    }
                }
            }

            if last_realign.elapsed() >= Duration::from_secs(60) {
                last_realign = Instant::now();
            }
        }
    }

    /// Returns the earliest upcoming boundary instant and every timeframe
    /// whose next boundary falls exactly on it. A 1h boundary is always
    /// also a 1m (and 5m, 15m, ...) boundary, so more than one timeframe
    /// commonly shares a wake-up and all of them must roll together -
    /// picking just one would starve the rest of `BucketRoll`.
    fn earliest_next_boundary(&self, now_ms: i64) -> (i64, Vec<Timeframe>) {
        let next_open = |tf: &Timeframe| tf.period_start(now_ms) + tf.to_millis();
        let earliest = self
            .timeframes
            .iter()
            .map(next_open)
            .min()
            .expect("at least one active timeframe is configured");
        let due = self
            .timeframes
            .iter()
            .copied()
            .filter(|tf| next_open(tf) == earliest)
            .collect();
        (earliest, due)
    }
}
