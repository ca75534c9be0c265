//! Storage layer
//!
//! Rule files and category catalogs on disk, with atomic writes and the
//! audit log alongside.

pub mod file_io;
pub mod rules;

pub use file_io::{read_data, read_data_required, write_data_atomic, DataFormat};
pub use rules::RuleRepository;

use std::path::Path;

use serde::Serialize;

use crate::audit::{generate_diff, AuditEntry, AuditLogger, EntityType};
use crate::config::paths::CategorizerPaths;
use crate::error::CategorizeResult;
use crate::models::{Category, CategoryCatalog};

/// Main storage coordinator
pub struct Storage {
    paths: CategorizerPaths,
    pub rules: RuleRepository,
    audit: AuditLogger,
}

impl Storage {
    /// Create a new Storage instance, creating the base directory if needed
    pub fn new(paths: CategorizerPaths) -> CategorizeResult<Self> {
        paths.ensure_directories()?;

        Ok(Self {
            rules: RuleRepository::new(paths.rules_file()),
            audit: AuditLogger::new(paths.audit_log()),
            paths,
        })
    }

    /// Use a different rule file than the configured one
    pub fn with_rules_file(mut self, path: impl AsRef<Path>) -> Self {
        self.rules = RuleRepository::new(path.as_ref().to_path_buf());
        self
    }

    pub fn paths(&self) -> &CategorizerPaths {
        &self.paths
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Log a create operation
    pub fn log_create<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        entity: &T,
    ) -> CategorizeResult<()> {
        let entry = AuditEntry::create(entity_type, entity_id, entity_name, entity);
        self.audit.log(&entry)
    }

    /// Log an update operation with a generated diff
    pub fn log_update<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: &T,
        after: &T,
    ) -> CategorizeResult<()> {
        let diff = match (serde_json::to_value(before), serde_json::to_value(after)) {
            (Ok(b), Ok(a)) => generate_diff(&b, &a),
            _ => None,
        };
        let entry = AuditEntry::update(entity_type, entity_id, entity_name, before, after, diff);
        self.audit.log(&entry)
    }
}

/// Load a category catalog (a JSON or YAML list of `{id, name}` entries)
pub fn load_catalog(path: impl AsRef<Path>) -> CategorizeResult<CategoryCatalog> {
    let categories: Vec<Category> = read_data_required(path)?;
    Ok(CategoryCatalog::new(categories))
}
