//! Custom error types for the categorization engine
//!
//! This module defines the error hierarchy using thiserror. Oracle-layer
//! variants are expected at runtime and are recovered per batch by the
//! pipeline; everything else propagates to the caller.

use thiserror::Error;

/// The main error type for categorization operations
#[derive(Error, Debug)]
pub enum CategorizeError {
    /// A rule failed validation at construction time
    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// The oracle did not answer within the caller-supplied timeout
    #[error("Oracle timed out after {0} ms")]
    OracleTimeout(u64),

    /// The oracle answered with something that cannot be used
    #[error("Malformed oracle response: {0}")]
    OracleMalformedResponse(String),

    /// The injected oracle transport failed
    #[error("Oracle transport error: {0}")]
    OracleTransport(String),

    /// Rule persistence could not be reached
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(String),

    /// Validation errors for input data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Duplicate entity errors
    #[error("{entity_type} already exists: {identifier}")]
    Duplicate {
        entity_type: &'static str,
        identifier: String,
    },

    /// Import errors
    #[error("Import error: {0}")]
    Import(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CategorizeError {
    /// Create an invalid-rule error
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Create a "not found" error for rules
    pub fn rule_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Rule",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for categories
    pub fn category_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Category",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidRule { .. })
    }

    /// Errors that fail a single oracle batch rather than the whole run
    pub fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            Self::OracleTimeout(_) | Self::OracleMalformedResponse(_) | Self::OracleTransport(_)
        )
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for CategorizeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CategorizeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for CategorizeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

/// Result type alias for categorization operations
pub type CategorizeResult<T> = Result<T, CategorizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CategorizeError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = CategorizeError::rule_not_found("rule-1234abcd");
        assert_eq!(err.to_string(), "Rule not found: rule-1234abcd");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_rule_error() {
        let err = CategorizeError::invalid_rule("Groceries", "confidence 140 exceeds 100");
        assert_eq!(
            err.to_string(),
            "Invalid rule 'Groceries': confidence 140 exceeds 100"
        );
        assert!(err.is_validation());
        assert!(!err.is_oracle_failure());
    }

    #[test]
    fn test_oracle_failures() {
        assert!(CategorizeError::OracleTimeout(500).is_oracle_failure());
        assert!(CategorizeError::OracleTransport("refused".into()).is_oracle_failure());
        assert!(CategorizeError::OracleMalformedResponse("empty".into()).is_oracle_failure());
        assert!(!CategorizeError::PersistenceUnavailable("disk".into()).is_oracle_failure());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CategorizeError = io_err.into();
        assert!(matches!(err, CategorizeError::Io(_)));
    }
}
