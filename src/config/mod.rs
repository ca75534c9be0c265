//! Configuration module
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution
//! - User settings persistence (mode, oracle limits, accuracy feedback)

pub mod paths;
pub mod settings;

pub use paths::CategorizerPaths;
pub use settings::Settings;
