//! Rule store
//!
//! Ordered, in-memory collection of rules for one pipeline run. Insertion
//! order is the tie-break for equal priorities. Performance counters are
//! owned here and only change through [`RuleStore::record_outcome`].

use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;

use super::matcher::MerchantMatcher;
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{MatchResult, Rule, RuleId, RuleStats, Transaction};

/// Ordered rule collection with a single counter-update entry point
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl RuleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from rules in their persisted order
    pub fn from_rules(rules: Vec<Rule>) -> CategorizeResult<Self> {
        let store = Self::new();
        for rule in rules {
            store.add(rule)?;
        }
        Ok(store)
    }

    /// Append a rule; ids must be unique
    pub fn add(&self, rule: Rule) -> CategorizeResult<()> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(CategorizeError::Duplicate {
                entity_type: "Rule",
                identifier: rule.id.to_string(),
            });
        }
        rules.push(rule);
        Ok(())
    }

    /// Snapshot of all rules in insertion order
    pub fn all(&self) -> Vec<Rule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get a rule by id
    pub fn get(&self, id: RuleId) -> Option<Rule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rules matching the transaction, priority descending.
    ///
    /// The sort is stable, so equal priorities keep insertion order.
    pub fn find_matching(&self, txn: &Transaction) -> Vec<Rule> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Rule> = rules
            .iter()
            .filter(|rule| MerchantMatcher::matches(rule, txn))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));
        matching
    }

    /// The first rule from [`find_matching`](Self::find_matching)
    pub fn find_best(&self, txn: &Transaction) -> Option<Rule> {
        self.find_matching(txn).into_iter().next()
    }

    /// Best categorizing rule plus labels from matching label-only rules
    pub fn match_transaction(&self, txn: &Transaction) -> MatchResult {
        let mut result = MatchResult::none();

        for rule in self.find_matching(txn) {
            if rule.is_label_only() {
                for label in rule.labels() {
                    if !result.labels.contains(&label) {
                        result.labels.push(label);
                    }
                }
            } else if result.rule.is_none() {
                result.confidence = Some(rule.confidence());
                result.rule = Some(rule);
            }
        }

        result
    }

    /// Record a routing outcome for a rule.
    ///
    /// A regular event counts a match (and an application when `applied`).
    /// An override event counts a user correction of an earlier application.
    pub fn record_outcome(
        &self,
        rule_id: RuleId,
        applied: bool,
        overridden: bool,
    ) -> CategorizeResult<RuleStats> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| CategorizeError::rule_not_found(rule_id.to_string()))?;

        let stats = rule.stats_mut();
        if overridden {
            stats.override_count += 1;
        } else {
            stats.match_count += 1;
            if applied {
                stats.applied_count += 1;
            }
            stats.last_used = Some(Utc::now());
        }

        debug!(
            rule = %rule_id,
            applied,
            overridden,
            accuracy = stats.accuracy(),
            "Recorded rule outcome"
        );

        Ok(stats.clone())
    }

    /// Derived accuracy of a rule
    pub fn accuracy(&self, rule_id: RuleId) -> Option<f64> {
        self.get(rule_id).map(|r| r.accuracy())
    }
}
