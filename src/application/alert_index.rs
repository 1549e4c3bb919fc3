//! C4 AlertIndex: secondary index `Symbol -> Set<RuleId>` plus
//! `RuleId -> Rule` snapshot, refreshed on rule mutation events.
//!
//! Reads go lock-free against an immutable snapshot; a single writer task
//! rotates the snapshot via `std::sync::RwLock<Arc<AlertIndexSnapshot>>`,
//! swapped wholesale instead of mutated in place. No `arc-swap` dependency
//! is introduced here; `std::sync::RwLock` already gives cheap, lock-free
//! reads of an immutable `Arc` clone.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use tracing::{info, warn};

use crate::domain::rule::{Rule, RuleId};
use crate::domain::symbol::Symbol;

#[derive(Debug, Clone, Default)]
pub struct AlertIndexSnapshot {
    by_symbol: HashMap<Symbol, HashSet<RuleId>>,
    by_id: HashMap<RuleId, Rule>,
    /// Rules whose symbol has never been observed by PriceCache; held
    /// `dormant` (not deleted) until the symbol appears.
    dormant: HashSet<RuleId>,
}

impl AlertIndexSnapshot {
    pub fn rules_for(&self, symbol: &Symbol) -> Vec<Rule> {
        self.by_symbol
            .get(symbol)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.by_id.get(id)
    }

    pub fn is_dormant(&self, id: &RuleId) -> bool {
        self.dormant.contains(id)
    }

    pub fn dormant_count(&self) -> usize {
        self.dormant.len()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// One rule-mutation event from the external rule store (see
/// `RuleStore`, which adapts the external wire contract into these
/// calls).
pub enum IndexMutation {
    Upsert(Rule),
    Remove(RuleId),
    BulkLoad(Vec<Rule>),
    /// Marks a rule dormant/armed based on whether its symbol has been
    /// observed in PriceCache. Called by the engine when it notices a
    /// rule referencing an unknown symbol.
    SetDormant { rule_id: RuleId, dormant: bool },
}

/// Single-writer index. All mutations are serialized through
/// `AlertIndex::apply`; readers call `AlertIndex::snapshot` and get a
/// cheap `Arc` clone that never changes underneath them.
#[derive(Clone)]
pub struct AlertIndex {
    inner: Arc<StdRwLock<Arc<AlertIndexSnapshot>>>,
}

impl AlertIndex {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StdRwLock::new(Arc::new(AlertIndexSnapshot::default()))),
        }
    }

    pub fn snapshot(&self) -> Arc<AlertIndexSnapshot> {
        self.inner.read().expect("alert index lock poisoned").clone()
    }

    /// Applies a mutation by cloning the current snapshot, mutating the
    /// clone, and swapping it in wholesale. Only the single writer task
    /// calls this.
    pub fn apply(&self, mutation: IndexMutation) {
        let current = self.snapshot();
        let mut next = (*current).clone();
        match mutation {
            IndexMutation::Upsert(rule) => {
                if let Some(old) = next.by_id.get(&rule.id) {
                    if old.symbol != rule.symbol {
                        if let Some(set) = next.by_symbol.get_mut(&old.symbol) {
                            set.remove(&rule.id);
                        }
                    }
                }
                next.by_symbol
                    .entry(rule.symbol.clone())
                    .or_default()
                    .insert(rule.id);
                next.dormant.remove(&rule.id);
                next.by_id.insert(rule.id, rule);
            }
            IndexMutation::Remove(rule_id) => {
                if let Some(rule) = next.by_id.remove(&rule_id) {
                    if let Some(set) = next.by_symbol.get_mut(&rule.symbol) {
                        set.remove(&rule_id);
                    }
                }
                next.dormant.remove(&rule_id);
            }
            IndexMutation::BulkLoad(rules) => {
                next = AlertIndexSnapshot::default();
                for rule in rules {
                    next.by_symbol
                        .entry(rule.symbol.clone())
                        .or_default()
                        .insert(rule.id);
                    next.by_id.insert(rule.id, rule);
                }
                info!(count = next.by_id.len(), "alert index bulk-loaded");
            }
            IndexMutation::SetDormant { rule_id, dormant } => {
                if next.by_id.contains_key(&rule_id) {
                    if dormant {
                        next.dormant.insert(rule_id);
                        warn!(%rule_id, "rule marked dormant: symbol not yet observed");
                    } else {
                        next.dormant.remove(&rule_id);
                    }
                }
            }
        }
        *self.inner.write().expect("alert index lock poisoned") = Arc::new(next);
    }
}

impl Default for AlertIndex {
    fn default() -> Self {
        Self::new()
    }
}
