//! Category catalog
//!
//! The catalog is a read-only list of valid categories supplied by the host
//! for each run. Oracle answers are resolved against it by id or by name.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::CategoryId;

/// A spending category the engine may assign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Identifier used when writing back to the transaction source
    pub id: CategoryId,

    /// Display name
    pub name: String,

    /// Optional group name ("Bills", "Needs", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Category {
    /// Create a new category
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: None,
        }
    }

    /// Create a new category within a group
    pub fn in_group(
        id: impl Into<CategoryId>,
        name: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            group: Some(group.into()),
            ..Self::new(id, name)
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}: {}", group, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The set of categories available for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    /// Create a catalog from a list of categories
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// All categories in catalog order
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Get a category by id
    pub fn get(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == id)
    }

    /// Resolve free text to a category, by exact id first, then by
    /// case-insensitive name
    pub fn resolve(&self, text: &str) -> Option<&Category> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.categories
            .iter()
            .find(|c| c.id.as_str() == text)
            .or_else(|| {
                self.categories
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(text))
            })
    }

    /// Display name for an id, falling back to the id itself
    pub fn name_of(&self, id: &CategoryId) -> String {
        self.get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::new(vec![
            Category::in_group("cat-groceries", "Groceries", "Needs"),
            Category::new("cat-dining", "Dining Out"),
        ])
    }

    #[test]
    fn test_resolve_by_id() {
        let catalog = catalog();
        let cat = catalog.resolve("cat-dining").unwrap();
        assert_eq!(cat.name, "Dining Out");
    }

    #[test]
    fn test_resolve_by_name_case_insensitive() {
        let catalog = catalog();
        let cat = catalog.resolve("  groceries ").unwrap();
        assert_eq!(cat.id, CategoryId::from("cat-groceries"));
    }

    #[test]
    fn test_resolve_unknown() {
        let catalog = catalog();
        assert!(catalog.resolve("Travel").is_none());
        assert!(catalog.resolve("").is_none());
    }

    #[test]
    fn test_display() {
        let catalog = catalog();
        assert_eq!(catalog.categories()[0].to_string(), "Needs: Groceries");
        assert_eq!(catalog.name_of(&CategoryId::from("missing")), "missing");
    }

    #[test]
    fn test_deserialize_as_list() {
        let json = r#"[{"id":"a","name":"A"},{"id":"b","name":"B","group":"G"}]"#;
        let catalog: CategoryCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.categories()[1].group.as_deref(), Some("G"));
    }
}
