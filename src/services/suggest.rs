//! Rule suggestions
//!
//! Turns oracle classifications into candidate session rules so that the
//! next run can decide the same merchants locally. A suggestion matches the
//! payee's leading token as a prefix and targets the oracle's category.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::matcher::MerchantMatcher;
use crate::models::{CategorizationOutcome, Provenance, Rule, RuleKind, RuleRecord};

/// Builds session rules from oracle outcomes
pub struct RuleSuggester;

impl RuleSuggester {
    /// Suggest rules from `(payee, outcome)` pairs
    ///
    /// Only applied oracle classifications are considered. Payees already
    /// covered by a categorizing rule in `existing` are skipped and the
    /// result holds at most one rule per pattern.
    pub fn suggest<'a>(
        outcomes: impl IntoIterator<Item = (&'a str, &'a CategorizationOutcome)>,
        existing: &[Rule],
        confidence: u8,
    ) -> Vec<Rule> {
        let mut seen: HashSet<String> = existing.iter().map(|r| r.pattern().to_string()).collect();
        let mut suggestions: Vec<Rule> = Vec::new();

        for (payee, outcome) in outcomes {
            if !outcome.is_applied() || outcome.provenance != Some(Provenance::Oracle) {
                continue;
            }
            let Some(category) = outcome.category_id.clone() else {
                continue;
            };

            let covered = existing
                .iter()
                .chain(suggestions.iter())
                .any(|rule| !rule.is_label_only() && MerchantMatcher::matches_payee(rule, payee));
            if covered {
                continue;
            }

            let Some(token) = leading_token(payee) else {
                continue;
            };
            let pattern = format!("{}.*", regex::escape(token));
            if !seen.insert(pattern.clone()) {
                continue;
            }

            let record = RuleRecord::new(token, pattern)
                .category(category)
                .kind(RuleKind::Session)
                .confidence(confidence)
                .tag("suggested");

            match record.build() {
                Ok(rule) => {
                    debug!(rule = %rule, "Suggested rule");
                    suggestions.push(rule);
                }
                Err(e) => warn!(payee, error = %e, "Could not build suggested rule"),
            }
        }

        suggestions
    }
}

/// First whitespace-separated word of the payee
fn leading_token(payee: &str) -> Option<&str> {
    payee.split_whitespace().next().filter(|t| !t.is_empty())
}
