//! Run command
//!
//! Imports transactions, categorizes them against the stored rules and the
//! configured oracle command, and reports the outcome. Applied categories are
//! collected in memory and reported; `--output` saves them as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::settings::Settings;
use crate::display::{format_outcome_table, format_summary};
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{CategorizationOutcome, OperatingMode};
use crate::services::{
    CategorizationPipeline, CommandTransport, MemorySink, PipelineOptions, RunSummary,
    TransactionImporter,
};
use crate::storage::{load_catalog, write_data_atomic, Storage};

/// Arguments for a categorization run
#[derive(Args)]
pub struct RunArgs {
    /// Transactions to categorize (CSV or JSON)
    pub transactions: PathBuf,

    /// Category catalog (JSON or YAML list of {id, name})
    #[arg(short, long)]
    pub categories: PathBuf,

    /// Operating mode (defaults to the configured mode)
    #[arg(short, long, value_enum)]
    pub mode: Option<OperatingMode>,

    /// Oracle command line; reads a request on stdin and answers on stdout
    #[arg(long, env = "CATEGORIZER_ORACLE")]
    pub oracle: Option<String>,

    /// Decide everything but write nothing back
    #[arg(long)]
    pub dry_run: bool,

    /// Per-batch oracle timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Write outcomes as JSON to this file; the input file is never modified
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show one line per transaction
    #[arg(long)]
    pub details: bool,

    /// Leave transactions that already carry a category untouched
    #[arg(long)]
    pub skip_categorized: bool,
}

/// One outcome together with the payee it was decided for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeLine {
    pub payee: String,
    #[serde(flatten)]
    pub outcome: CategorizationOutcome,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    summary: &'a RunSummary,
    outcomes: Vec<OutcomeLine>,
}

/// A run output file read back for rule suggestion
#[derive(Debug, Deserialize)]
pub struct SavedRun {
    pub outcomes: Vec<OutcomeLine>,
}

/// Handle the run command
pub fn handle_run_command(
    storage: &Storage,
    settings: &Settings,
    args: RunArgs,
) -> CategorizeResult<()> {
    let mut import = TransactionImporter::from_path(&args.transactions)?;
    if !import.errors.is_empty() {
        println!("Skipped {} unreadable row(s):", import.errors.len());
        for (row, reason) in &import.errors {
            println!("  row {}: {}", row, reason);
        }
    }
    if args.skip_categorized {
        let before = import.transactions.len();
        import.transactions.retain(|txn| !txn.is_categorized());
        let skipped = before - import.transactions.len();
        if skipped > 0 {
            println!("Skipping {} already categorized transaction(s)", skipped);
        }
    }
    let catalog = load_catalog(&args.categories)?;
    let store = storage.rules.load()?;

    let mut options = PipelineOptions::from_settings(settings);
    if let Some(mode) = args.mode {
        options = options.with_mode(mode);
    }
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if args.dry_run {
        options = options.with_dry_run(true);
    }
    let dry_run = options.dry_run;

    let command = args
        .oracle
        .or_else(|| settings.oracle.command.clone())
        .ok_or_else(|| {
            CategorizeError::Config(
                "No oracle command configured; pass --oracle or set oracle.command".into(),
            )
        })?;
    let transport = Arc::new(CommandTransport::parse(&command)?.with_timeout(options.timeout));

    let sink = MemorySink::new();
    let pipeline = CategorizationPipeline::new(&store, transport, options)
        .with_sink(&sink)
        .with_audit(storage.audit());
    let report = pipeline.run(&import.transactions, &catalog)?;

    info!(
        recorded = sink.applied().len(),
        "Categories recorded; use --output to keep them"
    );
    if dry_run {
        info!("Dry run, rule counters not saved");
    } else {
        storage.rules.save(&store)?;
    }

    if args.details {
        print!(
            "{}",
            format_outcome_table(&import.transactions, &report.outcomes, &catalog)
        );
        println!();
    }
    print!("{}", format_summary(&report.summary));

    if let Some(path) = args.output {
        let outcomes = import
            .transactions
            .iter()
            .zip(&report.outcomes)
            .map(|(txn, outcome)| OutcomeLine {
                payee: txn.payee.clone(),
                outcome: outcome.clone(),
            })
            .collect();
        write_data_atomic(
            &path,
            &RunOutput {
                summary: &report.summary,
                outcomes,
            },
        )?;
        println!();
        println!("Outcomes written to {}", path.display());
    }

    if report.summary.failed_batches > 0 {
        warn!(
            failed = report.summary.failed_batches,
            "Some oracle batches failed; their transactions are left uncategorized"
        );
    }

    Ok(())
}
