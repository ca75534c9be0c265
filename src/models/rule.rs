//! Categorization rule model
//!
//! A rule is a payee pattern plus optional amount and account constraints,
//! with an author-declared confidence and a priority for tie-breaking.
//! Patterns are compiled once when the rule is built or deserialized, so a
//! rule that exists is always matchable.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, CategoryId, RuleId};
use super::money::Money;
use crate::error::{CategorizeError, CategorizeResult};

/// Where a rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Authored by the user
    #[default]
    Local,
    /// Shipped with the platform
    Platform,
    /// Suggested from oracle output during a session
    Session,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Platform => write!(f, "platform"),
            Self::Session => write!(f, "session"),
        }
    }
}

/// Performance counters for a rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    /// Times the rule was the deciding match for a transaction
    #[serde(default)]
    pub match_count: u64,

    /// Times the rule's category was actually applied
    #[serde(default)]
    pub applied_count: u64,

    /// Times a user corrected an applied categorization
    #[serde(default)]
    pub override_count: u64,

    /// Last time the rule matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

impl RuleStats {
    /// Derived accuracy as a percentage.
    ///
    /// `(applied - overrides) / applied`, or 100 when nothing has been
    /// applied yet.
    pub fn accuracy(&self) -> f64 {
        if self.applied_count == 0 {
            return 100.0;
        }
        let good = self.applied_count.saturating_sub(self.override_count);
        good as f64 / self.applied_count as f64 * 100.0
    }
}

/// Persisted shape of a rule; also used to build new rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default)]
    pub id: RuleId,
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<Vec<AccountId>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: u8,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stats: RuleStats,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_confidence() -> u8 {
    80
}

impl RuleRecord {
    /// Start a new rule record with defaults
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: RuleId::new(),
            name: name.into(),
            pattern: pattern.into(),
            category_id: None,
            kind: RuleKind::default(),
            amount_min: None,
            amount_max: None,
            account_ids: None,
            exclusions: Vec::new(),
            confidence: default_confidence(),
            priority: 0,
            requires_approval: false,
            tags: Vec::new(),
            stats: RuleStats::default(),
            created_at: Utc::now(),
        }
    }

    pub fn category(mut self, category_id: impl Into<CategoryId>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn kind(mut self, kind: RuleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn amount_range(mut self, min: Option<Money>, max: Option<Money>) -> Self {
        self.amount_min = min;
        self.amount_max = max;
        self
    }

    pub fn accounts(mut self, accounts: Vec<AccountId>) -> Self {
        self.account_ids = Some(accounts);
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclusions.push(pattern.into());
        self
    }

    pub fn requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Validate and compile into a usable rule
    pub fn build(self) -> CategorizeResult<Rule> {
        Rule::try_from(self)
    }
}

/// A validated rule with compiled patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub kind: RuleKind,
    pub priority: i32,
    pub requires_approval: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pattern: String,
    exclusions: Vec<String>,
    confidence: u8,
    amount_min: Option<Money>,
    amount_max: Option<Money>,
    account_ids: Option<Vec<AccountId>>,
    stats: RuleStats,
    compiled: Regex,
    compiled_exclusions: Vec<Regex>,
}

/// Compile a pattern so that it matches at the start of the payee only
fn compile_prefix(rule_name: &str, pattern: &str) -> CategorizeResult<Regex> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
        CategorizeError::invalid_rule(rule_name, format!("bad pattern '{}': {}", pattern, e))
    })
}

impl TryFrom<RuleRecord> for Rule {
    type Error = CategorizeError;

    fn try_from(record: RuleRecord) -> Result<Self, Self::Error> {
        let name = record.name.trim().to_string();
        if name.is_empty() {
            return Err(CategorizeError::invalid_rule(
                record.id.to_string(),
                "name cannot be empty",
            ));
        }

        if record.pattern.trim().is_empty() {
            return Err(CategorizeError::invalid_rule(&name, "pattern cannot be empty"));
        }

        if record.confidence > 100 {
            return Err(CategorizeError::invalid_rule(
                &name,
                format!("confidence {} exceeds 100", record.confidence),
            ));
        }

        for bound in [record.amount_min, record.amount_max].into_iter().flatten() {
            if bound.is_negative() {
                return Err(CategorizeError::invalid_rule(
                    &name,
                    format!("amount bound {} must not be negative", bound),
                ));
            }
        }

        if let (Some(min), Some(max)) = (record.amount_min, record.amount_max) {
            if min > max {
                return Err(CategorizeError::invalid_rule(
                    &name,
                    format!("amount_min {} is greater than amount_max {}", min, max),
                ));
            }
        }

        let compiled = compile_prefix(&name, &record.pattern)?;
        let compiled_exclusions = record
            .exclusions
            .iter()
            .map(|p| compile_prefix(&name, p))
            .collect::<CategorizeResult<Vec<_>>>()?;

        // An empty allow-list is treated as no restriction
        let account_ids = record.account_ids.filter(|ids| !ids.is_empty());

        Ok(Self {
            id: record.id,
            name,
            category_id: record.category_id,
            kind: record.kind,
            priority: record.priority,
            requires_approval: record.requires_approval,
            tags: record.tags,
            created_at: record.created_at,
            pattern: record.pattern,
            exclusions: record.exclusions,
            confidence: record.confidence,
            amount_min: record.amount_min,
            amount_max: record.amount_max,
            account_ids,
            stats: record.stats,
            compiled,
            compiled_exclusions,
        })
    }
}

impl From<Rule> for RuleRecord {
    fn from(rule: Rule) -> Self {
        Self {
            id: rule.id,
            name: rule.name,
            pattern: rule.pattern,
            category_id: rule.category_id,
            kind: rule.kind,
            amount_min: rule.amount_min,
            amount_max: rule.amount_max,
            account_ids: rule.account_ids,
            exclusions: rule.exclusions,
            confidence: rule.confidence,
            priority: rule.priority,
            requires_approval: rule.requires_approval,
            tags: rule.tags,
            stats: rule.stats,
            created_at: rule.created_at,
        }
    }
}

impl Rule {
    /// Source text of the payee pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Source text of the exclusion patterns
    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    /// Author-declared confidence (0-100)
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn amount_min(&self) -> Option<Money> {
        self.amount_min
    }

    pub fn amount_max(&self) -> Option<Money> {
        self.amount_max
    }

    pub fn account_ids(&self) -> Option<&[AccountId]> {
        self.account_ids.as_deref()
    }

    pub fn stats(&self) -> &RuleStats {
        &self.stats
    }

    /// Counters are only mutated through the rule store
    pub(crate) fn stats_mut(&mut self) -> &mut RuleStats {
        &mut self.stats
    }

    pub(crate) fn compiled_pattern(&self) -> &Regex {
        &self.compiled
    }

    pub(crate) fn compiled_exclusions(&self) -> &[Regex] {
        &self.compiled_exclusions
    }

    /// A rule without a target category only contributes labels
    pub fn is_label_only(&self) -> bool {
        self.category_id.is_none()
    }

    /// Labels contributed when this rule matches: its tags, or its name
    pub fn labels(&self) -> Vec<String> {
        if self.tags.is_empty() {
            vec![self.name.clone()]
        } else {
            self.tags.clone()
        }
    }

    /// Derived accuracy percentage
    pub fn accuracy(&self) -> f64 {
        self.stats.accuracy()
    }

    /// Convert back to the persisted record shape
    pub fn to_record(&self) -> RuleRecord {
        RuleRecord::from(self.clone())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.pattern)
    }
}
