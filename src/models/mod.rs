//! Core data models for the categorization engine
//!
//! This module contains the structures the pipeline works on: transactions,
//! rules, the category catalog, the operating mode and per-transaction
//! outcomes.

pub mod category;
pub mod ids;
pub mod mode;
pub mod money;
pub mod outcome;
pub mod rule;
pub mod transaction;

pub use category::{Category, CategoryCatalog};
pub use ids::{AccountId, BatchToken, CategoryId, RuleId, TransactionId};
pub use mode::OperatingMode;
pub use money::Money;
pub use outcome::{CategorizationOutcome, MatchResult, OutcomeState, Provenance};
pub use rule::{Rule, RuleKind, RuleRecord, RuleStats};
pub use transaction::Transaction;
