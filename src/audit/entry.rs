//! Audit entry data structures
//!
//! Defines the operations and entities that are audited and the entry
//! format itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CategorizationOutcome;

/// Types of operations that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Entity was created
    Create,
    /// Entity was updated
    Update,
    /// A category was applied to a transaction
    Categorize,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Categorize => write!(f, "CATEGORIZE"),
        }
    }
}

/// Types of entities that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Rule,
    Transaction,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Rule => write!(f, "Rule"),
            EntityType::Transaction => write!(f, "Transaction"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// Type of operation performed
    pub operation: Operation,

    /// Type of entity affected
    pub entity_type: EntityType,

    /// ID of the affected entity
    pub entity_id: String,

    /// Human-readable description of the entity (e.g., rule name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,

    /// JSON representation of the entity before the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,

    /// JSON representation of the entity after the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,

    /// Human-readable diff summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
}

impl AuditEntry {
    /// Create a new audit entry for a create operation
    pub fn create<T: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        entity: &T,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: Operation::Create,
            entity_type,
            entity_id: entity_id.into(),
            entity_name,
            before: None,
            after: serde_json::to_value(entity).ok(),
            diff_summary: None,
        }
    }

    /// Create a new audit entry for an update operation
    pub fn update<T: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: &T,
        after: &T,
        diff_summary: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: Operation::Update,
            entity_type,
            entity_id: entity_id.into(),
            entity_name,
            before: serde_json::to_value(before).ok(),
            after: serde_json::to_value(after).ok(),
            diff_summary,
        }
    }

    /// Create an entry recording an applied categorization
    pub fn categorize(payee: &str, outcome: &CategorizationOutcome) -> Self {
        let summary = match (&outcome.category_id, outcome.provenance) {
            (Some(category), Some(provenance)) => Some(format!(
                "category -> {} ({}, confidence {})",
                category,
                provenance,
                outcome.confidence.unwrap_or(0)
            )),
            _ => None,
        };

        Self {
            timestamp: Utc::now(),
            operation: Operation::Categorize,
            entity_type: EntityType::Transaction,
            entity_id: outcome.transaction_id.to_string(),
            entity_name: Some(payee.to_string()),
            before: None,
            after: serde_json::to_value(outcome).ok(),
            diff_summary: summary,
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.entity_type,
            self.entity_id
        );

        if let Some(name) = &self.entity_name {
            output.push_str(&format!(" ({})", name));
        }

        if let Some(diff) = &self.diff_summary {
            output.push_str(&format!("\n  Changes: {}", diff));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryId, Provenance, TransactionId};
    use serde_json::json;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Update.to_string(), "UPDATE");
        assert_eq!(Operation::Categorize.to_string(), "CATEGORIZE");
    }

    #[test]
    fn test_create_entry() {
        let data = json!({"name": "Woolworths", "pattern": "WOOLWORTHS.*"});
        let entry = AuditEntry::create(
            EntityType::Rule,
            "rule-12345678",
            Some("Woolworths".to_string()),
            &data,
        );

        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.entity_type, EntityType::Rule);
        assert!(entry.before.is_none());
        assert!(entry.after.is_some());
    }

    #[test]
    fn test_update_entry() {
        let before = json!({"override_count": 0});
        let after = json!({"override_count": 1});

        let entry = AuditEntry::update(
            EntityType::Rule,
            "rule-12345678",
            None,
            &before,
            &after,
            Some("override_count: 0 -> 1".to_string()),
        );

        assert_eq!(entry.operation, Operation::Update);
        assert!(entry.before.is_some());
        assert_eq!(entry.diff_summary.as_deref(), Some("override_count: 0 -> 1"));
    }

    #[test]
    fn test_categorize_entry() {
        let outcome = CategorizationOutcome::applied(
            TransactionId::from("501"),
            CategoryId::from("groceries"),
            95,
            Provenance::Rule,
        );
        let entry = AuditEntry::categorize("WOOLWORTHS EPPING", &outcome);

        assert_eq!(entry.operation, Operation::Categorize);
        assert_eq!(entry.entity_id, "501");
        assert_eq!(
            entry.diff_summary.as_deref(),
            Some("category -> groceries (rule, confidence 95)")
        );

        let formatted = entry.format_human_readable();
        assert!(formatted.contains("CATEGORIZE Transaction 501 (WOOLWORTHS EPPING)"));
    }

    #[test]
    fn test_serialization() {
        let entry = AuditEntry::create(EntityType::Rule, "rule-1", None, &json!({"name": "x"}));
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.operation, Operation::Create);
        assert_eq!(deserialized.entity_type, EntityType::Rule);
    }
}
