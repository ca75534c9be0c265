//! Audit logging for the categorization engine
//!
//! Records rule creation, rule corrections and every applied categorization
//! in an append-only, line-delimited JSON log.
//!
//! # Example
//!
//! ```rust,ignore
//! use categorizer::audit::{AuditEntry, AuditLogger};
//!
//! let logger = AuditLogger::new(paths.audit_log());
//! logger.log(&AuditEntry::categorize(&txn.payee, &outcome))?;
//! ```

mod diff;
mod entry;
mod logger;

pub use diff::generate_diff;
pub use entry::{AuditEntry, EntityType, Operation};
pub use logger::AuditLogger;
