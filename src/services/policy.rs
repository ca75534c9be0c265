//! Mode policy
//!
//! Maps a matched rule (or its absence) and the operating mode to a routing
//! decision using fixed confidence bands:
//!
//! | Mode         | Auto-apply | Validate   | Skip  |
//! |--------------|------------|------------|-------|
//! | conservative | never      | never      | never |
//! | smart        | >= 90      | [70, 90)   | < 70  |
//! | aggressive   | >= 80      | [50, 80)   | < 50  |
//!
//! Conservative mode turns every rule match into an approval request.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{OperatingMode, Rule};

/// What to do with a transaction after rule matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    /// Apply the rule's category without asking anyone
    AutoApply,
    /// Ask the oracle to confirm or replace the rule's category
    Validate,
    /// No rule matched; ask the oracle for a cold classification
    Escalate,
    /// Confidence too low to act on
    Skip,
    /// Hold for explicit user approval
    AwaitApproval,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoApply => write!(f, "auto-apply"),
            Self::Validate => write!(f, "validate"),
            Self::Escalate => write!(f, "escalate"),
            Self::Skip => write!(f, "skip"),
            Self::AwaitApproval => write!(f, "await-approval"),
        }
    }
}

/// Confidence band boundaries for one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bands {
    /// Lowest confidence that auto-applies
    pub auto_apply: u8,
    /// Lowest confidence that is validated rather than skipped
    pub validate: u8,
}

/// Routing policy
pub struct ModePolicy;

impl ModePolicy {
    /// Confidence bands for a mode; conservative has none
    pub const fn bands(mode: OperatingMode) -> Option<Bands> {
        match mode {
            OperatingMode::Conservative => None,
            OperatingMode::Smart => Some(Bands {
                auto_apply: 90,
                validate: 70,
            }),
            OperatingMode::Aggressive => Some(Bands {
                auto_apply: 80,
                validate: 50,
            }),
        }
    }

    /// Route a transaction given its best rule match
    pub fn classify(rule: Option<&Rule>, mode: OperatingMode) -> Decision {
        let Some(rule) = rule else {
            return Decision::Escalate;
        };

        if rule.requires_approval {
            return match mode {
                OperatingMode::Conservative => Decision::AwaitApproval,
                OperatingMode::Smart | OperatingMode::Aggressive => Decision::Validate,
            };
        }

        Self::classify_confidence(rule.confidence(), mode)
    }

    /// Apply the mode's confidence bands to a matched rule's confidence
    pub fn classify_confidence(confidence: u8, mode: OperatingMode) -> Decision {
        match Self::bands(mode) {
            None => Decision::AwaitApproval,
            Some(bands) if confidence >= bands.auto_apply => Decision::AutoApply,
            Some(bands) if confidence >= bands.validate => Decision::Validate,
            Some(_) => Decision::Skip,
        }
    }

    /// Demote an auto-apply decision to validation when the rule's track
    /// record has fallen below `threshold` percent accuracy.
    ///
    /// Rules with fewer than `min_evidence` applications are left alone.
    pub fn demote_for_accuracy(
        decision: Decision,
        rule: &Rule,
        threshold: Option<u8>,
        min_evidence: u64,
    ) -> Decision {
        match (decision, threshold) {
            (Decision::AutoApply, Some(threshold))
                if rule.stats().applied_count >= min_evidence
                    && rule.accuracy() < f64::from(threshold) =>
            {
                Decision::Validate
            }
            _ => decision,
        }
    }

    /// Lowest confidence a validated match may carry after confirmation
    pub fn validation_floor(mode: OperatingMode) -> u8 {
        Self::bands(mode).map(|b| b.validate).unwrap_or(0)
    }
}
