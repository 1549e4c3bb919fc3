//! Application/Supervisor wiring: assembles every long-running component
//! and spawns the tasks that move ticks, bucket rolls and rule mutations
//! between them, via an `Application::build`/`Application::start` split.
//!
//! The ordering guarantee between the boundary scheduler and rule
//! evaluation - a bucket roll for timeframe T must be observed before any
//! tick landing in T's new bucket - falls out of routing both kinds of
//! message onto the same per-shard queue, rather than from any explicit
//! synchronization: `WorkerMessage::Roll` and `WorkerMessage::Tick` are
//! always delivered to worker `shard_for(symbol, shard_count)` in FIFO
//! order.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::alert_index::AlertIndex;
use crate::application::bus::TriggerBus;
use crate::application::cache::{shard_for, PriceCache};
use crate::application::candle_store::CandleStore;
use crate::application::engine::EvaluationEngine;
use crate::application::scheduler::{BoundaryScheduler, BucketRoll};
use crate::application::throttle::ThrottleGate;
use crate::domain::candle::Candle;
use crate::domain::errors::AlertError;
use crate::domain::rule::Rule;
use crate::domain::symbol::Symbol;
use crate::domain::tick::TickEvent;
use crate::domain::timeframe::Timeframe;
use crate::domain::trigger::TriggerEvent;
use crate::infrastructure::config::Config;
use crate::infrastructure::ingestion::warmup::{build_client, run as run_warmup};
use crate::infrastructure::ingestion::websocket::run as run_ingestion;
use crate::infrastructure::ingestion::LatestTickBuffer;
use crate::infrastructure::journal::Journal;
use crate::infrastructure::observability::{Metrics, MetricsReporter};
use crate::infrastructure::rule_store::{RuleMutationEvent, RuleStore};

const WORKER_CHANNEL_CAPACITY: usize = 4096;
const WARMUP_CHANNEL_CAPACITY: usize = 256;
const CLOSED_CANDLE_CHANNEL_CAPACITY: usize = 1024;

/// Default graceful-shutdown deadline: finish in-flight evaluation work
/// for up to this long before giving up on stragglers.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(3);

/// A tick or bucket roll routed to one evaluation worker's single queue.
#[derive(Debug, Clone)]
enum WorkerMessage {
    Tick(TickEvent),
    Roll(BucketRoll),
}

/// Assembled, not-yet-running set of components. Built from `Config`;
/// `start` wires the channels and spawns every task.
pub struct Application {
    config: Config,
    metrics: Metrics,
    journal: Journal,
    candles: CandleStore,
    index: AlertIndex,
    cache: PriceCache,
    bus: TriggerBus,
    scheduler: BoundaryScheduler,
    roll_rx: broadcast::Receiver<BucketRoll>,
    shard_count: usize,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AlertError> {
        info!("building alert engine application");
        let metrics = Metrics::new().map_err(|e| AlertError::Configuration {
            reason: format!("failed to construct metrics registry: {e}"),
        })?;
        let journal = Journal::open(&config.journal.dir).await?;
        let candles = CandleStore::new(config.cache.ring_capacity);
        let index = AlertIndex::new();

        let active_timeframes = Timeframe::all().to_vec();
        let shard_count = config.cache.resolved_shard_count();
        let cache = PriceCache::spawn(shard_count, active_timeframes.clone(), metrics.clone());
        let bus = TriggerBus::new(journal.clone(), metrics.clone());
        let (scheduler, roll_rx) = BoundaryScheduler::new(active_timeframes);

        Ok(Self {
            config,
            metrics,
            journal,
            candles,
            index,
            cache,
            bus,
            scheduler,
            roll_rx,
            shard_count,
        })
    }

    /// Spawns every long-running task and returns a handle callers use to
    /// submit rule mutations, subscribe to fired triggers, and drive
    /// shutdown.
    pub async fn start(self) -> Result<SystemHandle, AlertError> {
        info!(shards = self.shard_count, "starting alert engine");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (closed_tx, closed_rx) =
            mpsc::channel::<(Symbol, Timeframe, Candle)>(CLOSED_CANDLE_CHANNEL_CAPACITY);
        tokio::spawn(run_closed_candle_drain(closed_rx, self.candles.clone()));

        let mut worker_txs = Vec::with_capacity(self.shard_count);
        let mut worker_handles = Vec::with_capacity(self.shard_count);
        for _ in 0..self.shard_count {
            let (tx, rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
            let engine = EvaluationEngine::new(
                self.cache.clone(),
                self.candles.clone(),
                self.index.clone(),
                self.metrics.clone(),
            );
            let bus = self.bus.clone();
            let shutdown = shutdown_rx.clone();
            worker_handles.push(tokio::spawn(run_worker(rx, engine, bus, shutdown)));
            worker_txs.push(tx);
        }

        tokio::spawn(run_bucket_roll_dispatcher(
            self.roll_rx,
            self.cache.clone(),
            closed_tx,
            worker_txs.clone(),
            self.metrics.clone(),
        ));
        tokio::spawn(self.scheduler.run(shutdown_rx.clone()));

        let buffer = LatestTickBuffer::new();
        tokio::spawn(run_ingestion(
            self.config.ingestion.upstream_ws_url.clone(),
            self.config.ingestion.symbols.clone(),
            buffer.clone(),
            self.metrics.clone(),
        ));
        tokio::spawn(run_tick_dispatcher(buffer, worker_txs));

        let (warmup_tx, warmup_rx) = mpsc::channel::<Rule>(WARMUP_CHANNEL_CAPACITY);
        let warmup_client = build_client();
        tokio::spawn(run_warmup(
            warmup_rx,
            self.candles.clone(),
            warmup_client,
            self.config.ingestion.rest_base_url.clone(),
        ));

        let rule_mutation_tx = RuleStore::new(self.index.clone())
            .with_warmup(warmup_tx)
            .with_cache(self.cache.clone())
            .spawn();

        if self.config.observability.enabled {
            let reporter = MetricsReporter::new(
                self.index.clone(),
                self.metrics.clone(),
                self.config.observability.report_interval_seconds,
            );
            tokio::spawn(reporter.run());
        }

        let trigger_rx = self.bus.subscribe();

        Ok(SystemHandle {
            rule_mutation_tx,
            trigger_rx,
            metrics: self.metrics,
            candles: self.candles,
            index: self.index,
            journal: self.journal,
            shutdown_tx,
            worker_handles,
        })
    }
}

/// Handles callers use once the system is running.
pub struct SystemHandle {
    pub rule_mutation_tx: mpsc::Sender<RuleMutationEvent>,
    pub trigger_rx: broadcast::Receiver<TriggerEvent>,
    pub metrics: Metrics,
    pub candles: CandleStore,
    pub index: AlertIndex,
    pub journal: Journal,
    shutdown_tx: watch::Sender<bool>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl SystemHandle {
    /// Signals every evaluation worker to drain its in-flight queue and
    /// stop, waiting up to `deadline` before giving up on stragglers.
    pub async fn shutdown(self, deadline: Duration) {
        info!(?deadline, "shutdown requested");
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(deadline, join_all(self.worker_handles)).await.is_err() {
            warn!("graceful shutdown deadline elapsed with workers still draining");
        }
    }
}

async fn run_worker(
    mut inbox: mpsc::Receiver<WorkerMessage>,
    engine: EvaluationEngine,
    bus: TriggerBus,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut throttle = ThrottleGate::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            msg = inbox.recv() => {
                match msg {
                    Some(WorkerMessage::Tick(tick)) => {
                        evaluate_and_publish(&engine, &bus, tick, &mut throttle).await;
                    }
                    Some(WorkerMessage::Roll(roll)) => {
                        throttle.roll_bucket(roll.timeframe, roll.new_open_time);
                    }
                    None => break,
                }
            }
        }
    }

    // A tick already admitted to this worker's queue before shutdown was
    // signalled still gets evaluated - only the queue itself is cut off.
    while let Ok(msg) = inbox.try_recv() {
        if let WorkerMessage::Tick(tick) = msg {
            evaluate_and_publish(&engine, &bus, tick, &mut throttle).await;
        }
    }
}

async fn evaluate_and_publish(
    engine: &EvaluationEngine,
    bus: &TriggerBus,
    tick: TickEvent,
    throttle: &mut ThrottleGate,
) {
    match engine.evaluate(tick, throttle).await {
        Ok(decisions) => {
            for decision in decisions {
                bus.publish(decision).await;
            }
        }
        Err(e) => warn!(error = %e, "tick evaluation failed"),
    }
}

/// Applies each roll to `PriceCache` and fans it out to every evaluation
/// worker's queue so `ThrottleGate::roll_bucket` runs in FIFO order
/// relative to that worker's own ticks.
async fn run_bucket_roll_dispatcher(
    mut roll_rx: broadcast::Receiver<BucketRoll>,
    cache: PriceCache,
    closed_tx: mpsc::Sender<(Symbol, Timeframe, Candle)>,
    worker_txs: Vec<mpsc::Sender<WorkerMessage>>,
    metrics: Metrics,
) {
    loop {
        match roll_rx.recv().await {
            Ok(roll) => {
                metrics.inc_bucket_roll(&roll.timeframe.to_string());
                cache
                    .roll_bucket(roll.timeframe, roll.new_open_time, closed_tx.clone())
                    .await;
                for tx in &worker_txs {
                    let _ = tx.send(WorkerMessage::Roll(roll)).await;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "bucket roll dispatcher lagged behind the scheduler");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_closed_candle_drain(
    mut closed_rx: mpsc::Receiver<(Symbol, Timeframe, Candle)>,
    candles: CandleStore,
) {
    while let Some((symbol, timeframe, candle)) = closed_rx.recv().await {
        candles.append(symbol, timeframe, candle).await;
    }
}

/// Routes buffered ticks to the same per-shard worker `PriceCache` uses
/// internally for its own symbol partitioning, so a rule's ticks and the
/// bucket rolls relevant to its throttle timeframe always serialize
/// through one queue.
async fn run_tick_dispatcher(buffer: LatestTickBuffer, worker_txs: Vec<mpsc::Sender<WorkerMessage>>) {
    loop {
        let ticks = buffer.drain().await;
        for tick in ticks {
            let idx = shard_for(&tick.symbol, worker_txs.len());
            let _ = worker_txs[idx].send(WorkerMessage::Tick(tick)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_succeeds_with_defaults_and_a_temp_journal_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env().unwrap();
        config.journal.dir = dir.path().to_path_buf();
        let app = Application::build(config).await;
        assert!(app.is_ok());
    }
}
