//! User settings
//!
//! Operating mode, oracle limits and rule feedback preferences, persisted as
//! JSON next to the rule file.

use serde::{Deserialize, Serialize};

use super::paths::CategorizerPaths;
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::OperatingMode;

/// Accuracy feedback preferences
///
/// Rules whose derived accuracy falls below `threshold` after at least
/// `min_evidence` applications stop auto-applying and are validated instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccuracyFeedback {
    /// Percentage below which auto-apply is demoted; `None` disables feedback
    #[serde(default)]
    pub threshold: Option<u8>,

    #[serde(default = "default_min_evidence")]
    pub min_evidence: u64,
}

impl Default for AccuracyFeedback {
    fn default() -> Self {
        Self {
            threshold: Some(60),
            min_evidence: default_min_evidence(),
        }
    }
}

/// Oracle call limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleSettings {
    /// Shell-style command used to reach the oracle, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Per-batch timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Batches in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_batches: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_timeout_secs(),
            max_concurrent_batches: default_max_concurrent(),
        }
    }
}

/// User settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Operating mode used when a run does not override it
    #[serde(default)]
    pub mode: OperatingMode,

    #[serde(default)]
    pub oracle: OracleSettings,

    /// Never write categories back unless a run asks to
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub accuracy: AccuracyFeedback,

    /// Confidence given to rules suggested from oracle answers
    #[serde(default = "default_suggestion_confidence")]
    pub suggestion_confidence: u8,
}

fn default_schema_version() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    4
}

fn default_min_evidence() -> u64 {
    5
}

fn default_suggestion_confidence() -> u8 {
    75
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            mode: OperatingMode::default(),
            oracle: OracleSettings::default(),
            dry_run: false,
            accuracy: AccuracyFeedback::default(),
            suggestion_confidence: default_suggestion_confidence(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &CategorizerPaths) -> CategorizeResult<Self> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            // Don't save yet - let caller decide when to persist
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| CategorizeError::Io(format!("Failed to read settings file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
            CategorizeError::Config(format!("Failed to parse settings file: {}", e))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &CategorizerPaths) -> CategorizeResult<()> {
        self.validate()?;
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| CategorizeError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| CategorizeError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> CategorizeResult<()> {
        if self.oracle.timeout_secs == 0 {
            return Err(CategorizeError::Config("oracle.timeout_secs must be positive".into()));
        }
        if self.oracle.max_concurrent_batches == 0 {
            return Err(CategorizeError::Config(
                "oracle.max_concurrent_batches must be positive".into(),
            ));
        }
        if self.accuracy.threshold.is_some_and(|t| t > 100) {
            return Err(CategorizeError::Config("accuracy.threshold exceeds 100".into()));
        }
        if self.suggestion_confidence > 100 {
            return Err(CategorizeError::Config("suggestion_confidence exceeds 100".into()));
        }
        Ok(())
    }
}
