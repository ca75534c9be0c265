//! Rule service
//!
//! Rule management on top of the rule store: adding rules, looking them up
//! by id or name, and recording user corrections. Every change is saved and
//! audit-logged.

use tracing::info;

use super::rule_store::RuleStore;
use crate::audit::EntityType;
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{Rule, RuleId, RuleRecord};
use crate::storage::Storage;

/// Service for rule management
pub struct RuleService<'a> {
    storage: &'a Storage,
    store: &'a RuleStore,
}

impl<'a> RuleService<'a> {
    /// Create a new rule service over a loaded store
    pub fn new(storage: &'a Storage, store: &'a RuleStore) -> Self {
        Self { storage, store }
    }

    /// Validate, add and persist a rule
    pub fn add(&self, record: RuleRecord) -> CategorizeResult<Rule> {
        let rule = record.build()?;

        if self
            .store
            .all()
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(&rule.name))
        {
            return Err(CategorizeError::Duplicate {
                entity_type: "Rule",
                identifier: rule.name.clone(),
            });
        }

        self.store.add(rule.clone())?;
        self.storage.rules.save(self.store)?;

        self.storage.log_create(
            EntityType::Rule,
            rule.id.to_string(),
            Some(rule.name.clone()),
            &rule.to_record(),
        )?;

        info!(rule = %rule.id, name = %rule.name, "Added rule");
        Ok(rule)
    }

    /// Add several rules at once, skipping names that already exist
    pub fn add_all(&self, rules: Vec<Rule>) -> CategorizeResult<Vec<Rule>> {
        let mut added = Vec::new();
        for rule in rules {
            match self.add(rule.to_record()) {
                Ok(rule) => added.push(rule),
                Err(CategorizeError::Duplicate { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Find a rule by full id, short display id, or name (case-insensitive)
    pub fn find(&self, identifier: &str) -> Option<Rule> {
        let identifier = identifier.trim();

        if let Ok(id) = identifier.parse::<RuleId>() {
            if let Some(rule) = self.store.get(id) {
                return Some(rule);
            }
        }

        self.store.all().into_iter().find(|r| {
            r.id.to_string() == identifier || r.name.eq_ignore_ascii_case(identifier)
        })
    }

    /// Find a rule or fail with NotFound
    pub fn require(&self, identifier: &str) -> CategorizeResult<Rule> {
        self.find(identifier)
            .ok_or_else(|| CategorizeError::rule_not_found(identifier))
    }

    /// All rules in insertion order
    pub fn list(&self) -> Vec<Rule> {
        self.store.all()
    }

    /// Record that the user corrected a category this rule applied
    ///
    /// Raises the override count, which lowers the rule's derived accuracy.
    pub fn record_override(&self, rule_id: RuleId) -> CategorizeResult<Rule> {
        let before = self
            .store
            .get(rule_id)
            .ok_or_else(|| CategorizeError::rule_not_found(rule_id.to_string()))?;

        self.store.record_outcome(rule_id, false, true)?;
        self.storage.rules.save(self.store)?;

        let after = self
            .store
            .get(rule_id)
            .ok_or_else(|| CategorizeError::rule_not_found(rule_id.to_string()))?;

        self.storage.log_update(
            EntityType::Rule,
            rule_id.to_string(),
            Some(after.name.clone()),
            &before.to_record(),
            &after.to_record(),
        )?;

        info!(rule = %rule_id, accuracy = after.accuracy(), "Recorded override");
        Ok(after)
    }
}
