//! Rule display formatting

use crate::models::{CategoryCatalog, Rule};

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

/// Format rules as a table, in matching order
pub fn format_rule_list(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return "No rules found.\n\nRun 'categorize rules add' to create one.".to_string();
    }

    let name_width = rules
        .iter()
        .map(|r| r.name.chars().count().min(30))
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = format!(
        "{:<13}  {:<name_width$}  {:<24}  {:<16}  {:>4}  {:>4}  {:>8}\n",
        "ID",
        "Name",
        "Pattern",
        "Category",
        "Conf",
        "Prio",
        "Accuracy",
        name_width = name_width
    );
    output.push_str(&format!("{}\n", "-".repeat(output.trim_end().len())));

    let mut sorted: Vec<&Rule> = rules.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

    for rule in sorted {
        let category = rule
            .category_id
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "(labels)".to_string());

        output.push_str(&format!(
            "{:<13}  {:<name_width$}  {:<24}  {:<16}  {:>4}  {:>4}  {:>7.1}%\n",
            rule.id.to_string(),
            truncate(&rule.name, 30),
            truncate(rule.pattern(), 24),
            truncate(&category, 16),
            rule.confidence(),
            rule.priority,
            rule.accuracy(),
            name_width = name_width
        ));
    }

    output
}

/// Format full details of one rule
pub fn format_rule_details(rule: &Rule, catalog: Option<&CategoryCatalog>) -> String {
    let mut output = String::new();

    output.push_str(&format!("Rule: {}\n", rule.name));
    output.push_str(&format!("  ID:         {}\n", rule.id));
    output.push_str(&format!("  Kind:       {}\n", rule.kind));
    output.push_str(&format!("  Pattern:    {}\n", rule.pattern()));

    for exclusion in rule.exclusions() {
        output.push_str(&format!("  Excludes:   {}\n", exclusion));
    }

    match &rule.category_id {
        Some(id) => {
            let name = catalog.map(|c| c.name_of(id)).unwrap_or_else(|| id.to_string());
            output.push_str(&format!("  Category:   {}\n", name));
        }
        None => output.push_str("  Category:   (label-only)\n"),
    }

    if rule.amount_min().is_some() || rule.amount_max().is_some() {
        let min = rule
            .amount_min()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".into());
        let max = rule
            .amount_max()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".into());
        output.push_str(&format!("  Amount:     {} .. {}\n", min, max));
    }

    if let Some(accounts) = rule.account_ids() {
        let accounts: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
        output.push_str(&format!("  Accounts:   {}\n", accounts.join(", ")));
    }

    output.push_str(&format!("  Confidence: {}\n", rule.confidence()));
    output.push_str(&format!("  Priority:   {}\n", rule.priority));
    if rule.requires_approval {
        output.push_str("  Approval:   required\n");
    }
    if !rule.tags.is_empty() {
        output.push_str(&format!("  Tags:       {}\n", rule.tags.join(", ")));
    }

    let stats = rule.stats();
    output.push('\n');
    output.push_str(&format!(
        "  Matched {} / applied {} / overridden {} (accuracy {:.1}%)\n",
        stats.match_count,
        stats.applied_count,
        stats.override_count,
        rule.accuracy()
    ));
    if let Some(last_used) = stats.last_used {
        output.push_str(&format!(
            "  Last used:  {}\n",
            last_used.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    output
}
