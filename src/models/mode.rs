//! Operating mode
//!
//! The mode controls auto-apply thresholds and oracle batch sizing. It is a
//! closed set: every consumer matches on it exhaustively.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How eagerly rule matches are applied without confirmation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Every rule match waits for explicit user approval
    Conservative,
    /// High-confidence matches apply, medium ones are validated
    #[default]
    Smart,
    /// Lower thresholds and larger batches
    Aggressive,
}

impl OperatingMode {
    /// All modes in increasing order of eagerness
    pub fn all() -> [OperatingMode; 3] {
        [Self::Conservative, Self::Smart, Self::Aggressive]
    }

    /// Maximum number of items per oracle batch
    pub const fn batch_size(&self) -> usize {
        match self {
            Self::Conservative => 20,
            Self::Smart => 50,
            Self::Aggressive => 100,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Smart => write!(f, "smart"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "smart" => Ok(Self::Smart),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!("Unknown operating mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_sizes() {
        assert_eq!(OperatingMode::Conservative.batch_size(), 20);
        assert_eq!(OperatingMode::Smart.batch_size(), 50);
        assert_eq!(OperatingMode::Aggressive.batch_size(), 100);
    }

    #[test]
    fn test_parse_and_display() {
        for mode in OperatingMode::all() {
            assert_eq!(mode.to_string().parse::<OperatingMode>().unwrap(), mode);
        }
        assert_eq!("SMART".parse::<OperatingMode>().unwrap(), OperatingMode::Smart);
        assert!("reckless".parse::<OperatingMode>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&OperatingMode::Aggressive).unwrap();
        assert_eq!(json, "\"aggressive\"");
        assert_eq!(OperatingMode::default(), OperatingMode::Smart);
    }
}
