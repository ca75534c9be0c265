//! Rule repository
//!
//! Persists the rule list as an ordered list of rule records. Order matters:
//! it is the insertion order that breaks priority ties during matching.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CategorizeResult;
use crate::models::{Rule, RuleRecord};
use crate::services::RuleStore;

use super::file_io::{read_data, write_data_atomic};

/// Repository for rule persistence
pub struct RuleRepository {
    path: PathBuf,
}

impl RuleRepository {
    /// Create a new rule repository; JSON unless `path` ends in .yaml/.yml
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate every rule; a missing file is an empty list
    pub fn load_rules(&self) -> CategorizeResult<Vec<Rule>> {
        let records: Vec<RuleRecord> = read_data(&self.path)?;
        let rules = records
            .into_iter()
            .map(Rule::try_from)
            .collect::<CategorizeResult<Vec<_>>>()?;

        debug!(path = %self.path.display(), count = rules.len(), "Loaded rules");
        Ok(rules)
    }

    /// Load rules into a fresh store
    pub fn load(&self) -> CategorizeResult<RuleStore> {
        RuleStore::from_rules(self.load_rules()?)
    }

    /// Save rules in the given order
    pub fn save_rules(&self, rules: &[Rule]) -> CategorizeResult<()> {
        let records: Vec<RuleRecord> = rules.iter().map(Rule::to_record).collect();
        write_data_atomic(&self.path, &records)?;
        debug!(path = %self.path.display(), count = records.len(), "Saved rules");
        Ok(())
    }

    /// Save the store's rules, counters included
    pub fn save(&self, store: &RuleStore) -> CategorizeResult<()> {
        self.save_rules(&store.all())
    }
}
