use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use categorizer::cli::{handle_rule_command, handle_run_command, RuleCommands, RunArgs};
use categorizer::config::{paths::CategorizerPaths, settings::Settings};
use categorizer::storage::Storage;

#[derive(Parser)]
#[command(
    name = "categorize",
    version,
    about = "Rule-first transaction categorization with oracle validation",
    long_about = "Categorizes bank transactions with user rules first. Depending on the \
                  operating mode, rule matches are applied, validated by an external \
                  oracle, or held for approval; transactions no rule covers are sent \
                  to the oracle in batches."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Rule file to use instead of the configured one (.json or .yaml)
    #[arg(long, global = true, env = "CATEGORIZER_RULES")]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rule management commands
    #[command(subcommand)]
    Rules(RuleCommands),

    /// Categorize a file of transactions
    Run(RunArgs),

    /// Show current configuration and paths
    Config,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = CategorizerPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;
    let mut storage = Storage::new(paths.clone())?;
    if let Some(rules) = &cli.rules {
        storage = storage.with_rules_file(rules);
    }

    match cli.command {
        Some(Commands::Rules(cmd)) => {
            handle_rule_command(&storage, &settings, cmd)?;
        }
        Some(Commands::Run(args)) => {
            handle_run_command(&storage, &settings, args)?;
        }
        Some(Commands::Config) => {
            println!("Categorizer Configuration");
            println!("=========================");
            println!("Data directory: {}", paths.base_dir().display());
            println!("Settings file:  {}", paths.settings_file().display());
            println!("Rules file:     {}", storage.rules.path().display());
            println!("Audit log:      {}", paths.audit_log().display());
            println!();
            println!(
                "Settings saved: {}",
                if paths.is_initialized() { "yes" } else { "no (using defaults)" }
            );
            println!("Settings:");
            println!("  Mode:           {}", settings.mode);
            println!(
                "  Oracle command: {}",
                settings.oracle.command.as_deref().unwrap_or("(not set)")
            );
            println!("  Oracle timeout: {}s", settings.oracle.timeout_secs);
            println!("  Max in flight:  {}", settings.oracle.max_concurrent_batches);
            println!("  Dry run:        {}", settings.dry_run);
            match settings.accuracy.threshold {
                Some(threshold) => println!(
                    "  Accuracy floor: {}% after {} applications",
                    threshold, settings.accuracy.min_evidence
                ),
                None => println!("  Accuracy floor: off"),
            }
        }
        None => {
            println!("categorize - rule-first transaction categorization");
            println!();
            println!("Run 'categorize --help' for usage information.");
        }
    }

    Ok(())
}
