//! Run output formatting

use crate::models::{CategorizationOutcome, CategoryCatalog, OutcomeState, Transaction};
use crate::services::RunSummary;

/// Format the run summary
pub fn format_summary(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str("Run summary\n");

    let rows = [
        ("Auto-applied", summary.auto_applied),
        ("Validated (confirmed)", summary.validated_confirmed),
        ("Validated (replaced)", summary.validated_rejected),
        ("Oracle fallback", summary.oracle_fallback),
        ("Deferred", summary.deferred),
        ("Awaiting approval", summary.awaiting_approval),
        ("Oracle failed", summary.oracle_failed),
    ];
    for (label, count) in rows {
        output.push_str(&format!("  {:<22} {:>6}\n", label, count));
    }
    output.push_str(&format!("  {:<22} {:>6}\n", "Total", summary.total()));

    output.push('\n');
    output.push_str(&format!("  Rule matches:    {}\n", summary.rule_matched));
    if summary.failed_batches > 0 {
        output.push_str(&format!("  Failed batches:  {}\n", summary.failed_batches));
    }
    if summary.dropped_entries > 0 {
        output.push_str(&format!("  Dropped entries: {}\n", summary.dropped_entries));
    }
    if summary.cancelled_batches > 0 {
        output.push_str(&format!("  Cancelled:       {}\n", summary.cancelled_batches));
    }
    if summary.sink_errors > 0 {
        output.push_str(&format!("  Write errors:    {}\n", summary.sink_errors));
    }

    output
}

/// Format one line per outcome, in input order
pub fn format_outcome_table(
    transactions: &[Transaction],
    outcomes: &[CategorizationOutcome],
    catalog: &CategoryCatalog,
) -> String {
    if outcomes.is_empty() {
        return "No transactions.\n".to_string();
    }

    let mut output = format!(
        "{:<10}  {:<28}  {:>10}  {:<18}  {:<20}  {:>4}  {}\n",
        "Date", "Payee", "Amount", "State", "Category", "Conf", "Source"
    );
    output.push_str(&format!("{}\n", "-".repeat(output.trim_end().len())));

    for (txn, outcome) in transactions.iter().zip(outcomes) {
        let category = outcome
            .category_id
            .as_ref()
            .map(|id| catalog.name_of(id))
            .unwrap_or_else(|| "-".to_string());
        let confidence = outcome
            .confidence
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let source = match (outcome.state, outcome.provenance) {
            (OutcomeState::OracleFailed, _) => outcome.error.clone().unwrap_or_default(),
            (_, Some(provenance)) => provenance.to_string(),
            (_, None) => String::new(),
        };
        let payee: String = txn.payee.chars().take(28).collect();

        output.push_str(&format!(
            "{:<10}  {:<28}  {:>10}  {:<18}  {:<20}  {:>4}  {}\n",
            txn.date.format("%Y-%m-%d"),
            payee,
            txn.amount.to_string(),
            outcome.state.to_string(),
            category,
            confidence,
            source
        ));
    }

    output
}
