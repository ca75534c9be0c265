//! Display formatting for terminal output
//!
//! Plain-text tables for rules, run outcomes and run summaries.

pub mod rule;
pub mod run;

pub use rule::{format_rule_details, format_rule_list};
pub use run::{format_outcome_table, format_summary};
