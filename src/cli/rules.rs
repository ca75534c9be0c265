//! Rule CLI commands
//!
//! Listing, inspecting and authoring rules, recording corrections, and
//! turning oracle answers from a saved run into suggested rules.

use std::path::PathBuf;

use clap::Subcommand;

use super::run::SavedRun;
use crate::config::settings::Settings;
use crate::display::{format_rule_details, format_rule_list};
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{AccountId, Money, RuleKind, RuleRecord};
use crate::services::{RuleService, RuleSuggester};
use crate::storage::{load_catalog, read_data_required, Storage};

const HISTORY_LIMIT: usize = 10;

/// Rule subcommands
#[derive(Subcommand)]
pub enum RuleCommands {
    /// List all rules
    List,

    /// Show rule details
    Show {
        /// Rule name or ID
        rule: String,
        /// Category catalog for resolving category names
        #[arg(short, long)]
        categories: Option<PathBuf>,
    },

    /// Add a new rule
    Add {
        /// Rule name
        name: String,
        /// Payee pattern (regex, anchored at the start of the payee)
        pattern: String,
        /// Category ID to assign (omit for a label-only rule)
        #[arg(short, long)]
        category: Option<String>,
        /// Confidence 0-100
        #[arg(long, default_value = "90")]
        confidence: u8,
        /// Priority for tie-breaking (higher wins)
        #[arg(short, long, default_value = "0")]
        priority: i32,
        /// Rule origin
        #[arg(long, value_enum, default_value = "local")]
        kind: RuleKind,
        /// Minimum absolute amount, inclusive (e.g. "10" or "50.00")
        #[arg(long)]
        min: Option<String>,
        /// Maximum absolute amount, inclusive
        #[arg(long)]
        max: Option<String>,
        /// Restrict to these accounts (repeatable)
        #[arg(short, long)]
        account: Vec<String>,
        /// Payee pattern that vetoes the rule (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
        /// Always wait for approval before applying
        #[arg(long)]
        requires_approval: bool,
        /// Tag or label (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
        /// Category catalog to check the category against
        #[arg(long)]
        categories: Option<PathBuf>,
    },

    /// Record that a category applied by this rule was corrected
    Override {
        /// Rule name or ID
        rule: String,
    },

    /// Suggest rules from oracle answers in a saved run
    #[command(name = "suggest-from")]
    SuggestFrom {
        /// Run output written by `run --output`
        report: PathBuf,
        /// List the suggestions without saving them
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_amount(label: &str, value: Option<String>) -> CategorizeResult<Option<Money>> {
    value
        .map(|v| {
            Money::parse(&v)
                .map_err(|e| CategorizeError::Validation(format!("Invalid {} amount: {}", label, e)))
        })
        .transpose()
}

/// Handle a rule command
pub fn handle_rule_command(
    storage: &Storage,
    settings: &Settings,
    cmd: RuleCommands,
) -> CategorizeResult<()> {
    let store = storage.rules.load()?;
    let service = RuleService::new(storage, &store);

    match cmd {
        RuleCommands::List => {
            print!("{}", format_rule_list(&service.list()));
        }

        RuleCommands::Show { rule, categories } => {
            let rule = service.require(&rule)?;
            let catalog = categories.map(load_catalog).transpose()?;
            print!("{}", format_rule_details(&rule, catalog.as_ref()));

            let rule_id = rule.id.to_string();
            let history: Vec<_> = storage
                .audit()
                .read_all()?
                .into_iter()
                .filter(|entry| entry.entity_id == rule_id)
                .collect();
            if !history.is_empty() {
                println!();
                println!("History:");
                for entry in history.iter().rev().take(HISTORY_LIMIT).rev() {
                    println!("  {}", entry.format_human_readable());
                }
            }
        }

        RuleCommands::Add {
            name,
            pattern,
            category,
            confidence,
            priority,
            kind,
            min,
            max,
            account,
            exclude,
            requires_approval,
            tag,
            categories,
        } => {
            let category = match (category, categories) {
                (Some(category), Some(path)) => {
                    let catalog = load_catalog(path)?;
                    let resolved = catalog
                        .resolve(&category)
                        .ok_or_else(|| CategorizeError::category_not_found(category.as_str()))?;
                    Some(resolved.id.to_string())
                }
                (category, _) => category,
            };

            let mut record = RuleRecord::new(name, pattern)
                .kind(kind)
                .confidence(confidence)
                .priority(priority)
                .amount_range(parse_amount("minimum", min)?, parse_amount("maximum", max)?)
                .requires_approval(requires_approval);
            if let Some(category) = category {
                record = record.category(category);
            }
            if !account.is_empty() {
                record = record.accounts(account.into_iter().map(AccountId::from).collect());
            }
            for pattern in exclude {
                record = record.exclude(pattern);
            }
            for tag in tag {
                record = record.tag(tag);
            }

            let rule = service.add(record)?;
            println!("Created rule: {}", rule.name);
            println!("  Pattern: {}", rule.pattern());
            println!("  ID: {}", rule.id);
        }

        RuleCommands::Override { rule } => {
            let rule = service.require(&rule)?;
            let rule = service.record_override(rule.id)?;
            println!(
                "Recorded override for '{}' (accuracy now {:.1}%)",
                rule.name,
                rule.accuracy()
            );
        }

        RuleCommands::SuggestFrom { report, dry_run } => {
            let saved: SavedRun = read_data_required(&report)?;
            let suggestions = RuleSuggester::suggest(
                saved
                    .outcomes
                    .iter()
                    .map(|line| (line.payee.as_str(), &line.outcome)),
                &service.list(),
                settings.suggestion_confidence,
            );

            if suggestions.is_empty() {
                println!("No new rules to suggest.");
                return Ok(());
            }

            if dry_run {
                print!("{}", format_rule_list(&suggestions));
                return Ok(());
            }

            let added = service.add_all(suggestions)?;
            println!("Added {} suggested rule(s):", added.len());
            for rule in &added {
                println!("  {}", rule);
            }
        }
    }

    Ok(())
}
