//! Match results and categorization outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CategoryId, RuleId, TransactionId};
use super::rule::Rule;

/// Result of evaluating the rule set against one transaction
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Highest-priority matching rule that has a target category
    pub rule: Option<Rule>,

    /// Confidence of that rule at match time
    pub confidence: Option<u8>,

    /// Labels contributed by matching label-only rules
    pub labels: Vec<String>,
}

impl MatchResult {
    /// A result with no deciding rule
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_match(&self) -> bool {
        self.rule.is_some()
    }
}

/// Where the final category came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// A rule decided, possibly confirmed by the oracle
    Rule,
    /// The oracle classified a transaction no rule covered
    Oracle,
    /// The oracle rejected a rule's suggestion and replaced it
    OracleAfterValidation,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule => write!(f, "rule"),
            Self::Oracle => write!(f, "oracle"),
            Self::OracleAfterValidation => write!(f, "oracle-after-validation"),
        }
    }
}

/// Terminal state of one transaction in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeState {
    Applied,
    Deferred,
    AwaitingApproval,
    /// The oracle batch carrying this transaction failed
    OracleFailed,
}

impl fmt::Display for OutcomeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Deferred => write!(f, "deferred"),
            Self::AwaitingApproval => write!(f, "awaiting approval"),
            Self::OracleFailed => write!(f, "oracle failed"),
        }
    }
}

/// Final categorization of one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationOutcome {
    pub transaction_id: TransactionId,
    pub state: OutcomeState,
    pub category_id: Option<CategoryId>,
    pub confidence: Option<u8>,
    pub provenance: Option<Provenance>,
    /// Rule that drove or was validated for this outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    pub auto_applied: bool,
    pub pending_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Error recorded when the oracle batch failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategorizationOutcome {
    fn base(transaction_id: TransactionId, state: OutcomeState) -> Self {
        Self {
            transaction_id,
            state,
            category_id: None,
            confidence: None,
            provenance: None,
            rule_id: None,
            auto_applied: false,
            pending_approval: false,
            rationale: None,
            labels: Vec::new(),
            error: None,
        }
    }

    /// An applied categorization
    pub fn applied(
        transaction_id: TransactionId,
        category_id: CategoryId,
        confidence: u8,
        provenance: Provenance,
    ) -> Self {
        Self {
            category_id: Some(category_id),
            confidence: Some(confidence),
            provenance: Some(provenance),
            auto_applied: true,
            ..Self::base(transaction_id, OutcomeState::Applied)
        }
    }

    /// Left uncategorized for a later pass or a human
    pub fn deferred(transaction_id: TransactionId) -> Self {
        Self::base(transaction_id, OutcomeState::Deferred)
    }

    /// A rule suggestion waiting on explicit user approval
    pub fn awaiting_approval(
        transaction_id: TransactionId,
        category_id: Option<CategoryId>,
        confidence: u8,
    ) -> Self {
        Self {
            category_id,
            confidence: Some(confidence),
            provenance: Some(Provenance::Rule),
            pending_approval: true,
            ..Self::base(transaction_id, OutcomeState::AwaitingApproval)
        }
    }

    /// The oracle batch failed; nothing was guessed
    pub fn oracle_failed(transaction_id: TransactionId, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(transaction_id, OutcomeState::OracleFailed)
        }
    }

    pub fn with_rule(mut self, rule_id: RuleId) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    pub fn with_rationale(mut self, rationale: Option<String>) -> Self {
        self.rationale = rationale;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn is_applied(&self) -> bool {
        self.state == OutcomeState::Applied
    }
}
