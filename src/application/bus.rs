//! C9 TriggerBus: accepts `TriggerDecision`s admitted by the throttle
//! gate, stamps a stable id, persists to the journal, and fans out to
//! in-process subscribers and an external pub/sub channel named
//! `triggers`. The journal entry is the ground truth; in-process delivery
//! is best-effort.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::domain::trigger::{TriggerDecision, TriggerEvent};
use crate::infrastructure::journal::Journal;
use crate::infrastructure::observability::Metrics;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct TriggerBus {
    tx: broadcast::Sender<TriggerEvent>,
    journal: Journal,
    metrics: Metrics,
    seq: Arc<AtomicU32>,
}

impl TriggerBus {
    pub fn new(journal: Journal, metrics: Metrics) -> Self {
        let (tx, _rx) = broadcast::channel(SUBSCRIBER_QUEUE_CAPACITY);
        Self {
            tx,
            journal,
            metrics,
            seq: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.tx.subscribe()
    }

    /// Stamps, journals and fans out one trigger. The journal write is
    /// awaited - a trigger is not "real" until it is durable - but
    /// broadcast delivery to subscribers never blocks on a slow consumer.
    pub async fn publish(&self, decision: TriggerDecision) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = TriggerEvent::from_decision(decision, seq);

        match self.journal.append(&event).await {
            Ok(()) => {
                self.metrics.triggers_fired_total.inc();
                info!(id = %event.id, rule_id = %event.rule_id, symbol = %event.symbol, "trigger fired");
            }
            Err(e) => {
                self.metrics.journal_fsync_failures_total.inc();
                error!(error = %e, id = %event.id, "failed to journal trigger");
            }
        }

        // Drop-oldest semantics fall out of `broadcast`'s own lagging
        // receiver behavior; slow subscribers simply miss old events and
        // pick up the stream again.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    use crate::domain::rule::RuleId;
    use crate::domain::symbol::Symbol;
    use crate::domain::timeframe::Timeframe;
    use crate::domain::trigger::PredicateSnapshot;

    fn decision() -> TriggerDecision {
        TriggerDecision {
            rule_id: RuleId::new_v4(),
            symbol: Symbol::new("BTCUSDT"),
            fired_at: Utc::now(),
            price_at_firing: dec!(100),
            bucket_open_time: 0,
            throttle_timeframe: Timeframe::OneHour,
            predicate_snapshot: PredicateSnapshot::default(),
        }
    }

    #[tokio::test]
    async fn publish_delivers_to_subscribers() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).await.unwrap();
        let metrics = Metrics::new().unwrap();
        let bus = TriggerBus::new(journal, metrics);
        let mut rx = bus.subscribe();

        bus.publish(decision()).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.symbol, Symbol::new("BTCUSDT"));
    }
}
