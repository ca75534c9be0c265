//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod rules;
pub mod run;

pub use rules::{handle_rule_command, RuleCommands};
pub use run::{handle_run_command, RunArgs};
