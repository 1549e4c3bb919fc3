//! Ambient adapter for the external rule store's "rule mutation events"
//! feed: turns the inbound wire envelope into
//! `AlertIndex::apply` calls on the index's single writer task. The
//! persistence and CRUD surface behind this feed are out of scope - this
//! module only speaks the wire contract the core depends on.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::alert_index::{AlertIndex, IndexMutation};
use crate::application::cache::PriceCache;
use crate::domain::rule::{Rule, RuleId};

/// Wire envelope for one rule-mutation event: `{action, rule?, ruleId?,
/// rules?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RuleMutationEvent {
    Upsert { rule: Rule },
    Remove { rule_id: RuleId },
    BulkLoad { rules: Vec<Rule> },
}

const INBOX_CAPACITY: usize = 256;

/// Owns the FIFO channel the external rule store publishes mutation
/// events onto, and the task that drains it into `AlertIndex`. Every
/// upserted or bulk-loaded rule is also forwarded to an optional
/// warm-up coordinator so a freshly armed rule's indicator series start
/// fetching immediately rather than waiting for the next tick.
pub struct RuleStore {
    index: AlertIndex,
    warmup_tx: Option<mpsc::Sender<Rule>>,
    cache: Option<PriceCache>,
}

impl RuleStore {
    pub fn new(index: AlertIndex) -> Self {
        Self { index, warmup_tx: None, cache: None }
    }

    pub fn with_warmup(mut self, warmup_tx: mpsc::Sender<Rule>) -> Self {
        self.warmup_tx = Some(warmup_tx);
        self
    }

    /// Supplies `PriceCache` so newly upserted rules referencing a symbol
    /// PriceCache has never seen a tick for are held dormant instead of
    /// evaluated against a record that doesn't exist yet.
    pub fn with_cache(mut self, cache: PriceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Spawns the writer task and returns a sender callers (an inbound
    /// HTTP handler, a message-bus subscriber) use to submit events. FIFO
    /// ordering from the external store is preserved because this is an
    /// ordinary mpsc channel drained by a single task.
    pub fn spawn(self) -> mpsc::Sender<RuleMutationEvent> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        tokio::spawn(self.run(rx));
        tx
    }

    async fn run(self, mut inbox: mpsc::Receiver<RuleMutationEvent>) {
        while let Some(event) = inbox.recv().await {
            match event {
                RuleMutationEvent::Upsert { rule } => {
                    info!(rule_id = %rule.id, symbol = %rule.symbol, "rule upserted");
                    self.request_warmup(&rule).await;
                    let rule_id = rule.id;
                    self.index.apply(IndexMutation::Upsert(rule.clone()));
                    self.sync_dormancy(rule_id, &rule).await;
                }
                RuleMutationEvent::Remove { rule_id } => {
                    info!(%rule_id, "rule removed");
                    self.index.apply(IndexMutation::Remove(rule_id));
                }
                RuleMutationEvent::BulkLoad { rules } => {
                    info!(count = rules.len(), "rule store bulk load");
                    for rule in &rules {
                        self.request_warmup(rule).await;
                    }
                    let to_sync: Vec<(RuleId, Rule)> =
                        rules.iter().map(|r| (r.id, r.clone())).collect();
                    self.index.apply(IndexMutation::BulkLoad(rules));
                    for (rule_id, rule) in &to_sync {
                        self.sync_dormancy(*rule_id, rule).await;
                    }
                }
            }
        }
        warn!("rule store inbox closed; index will no longer receive updates");
    }

    async fn request_warmup(&self, rule: &Rule) {
        if let Some(tx) = &self.warmup_tx {
            let _ = tx.send(rule.clone()).await;
        }
    }

    /// Marks `rule_id` dormant iff PriceCache has never recorded a tick
    /// for its symbol. The engine clears the flag the first time a tick
    /// for that symbol arrives.
    async fn sync_dormancy(&self, rule_id: RuleId, rule: &Rule) {
        if let Some(cache) = &self.cache {
            if cache.get(&rule.symbol).await.is_none() {
                self.index.apply(IndexMutation::SetDormant { rule_id, dormant: true });
            }
        }
    }
}
