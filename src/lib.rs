//! Hybrid transaction categorization
//!
//! Categorizes bank transactions with a rules-first pipeline: user rules
//! decide what they can, an operating mode decides which rule matches are
//! applied outright and which are sent to an oracle for validation, and
//! everything no rule covers is classified by the oracle in batches.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Rules, transactions, categories and outcomes
//! - `storage`: Rule files and category catalogs on disk
//! - `services`: Matching, batching, the oracle protocol and the pipeline
//! - `audit`: Audit logging system
//! - `cli`: Command handlers
//! - `display`: Terminal formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use categorizer::services::{CategorizationPipeline, CommandTransport, PipelineOptions};
//!
//! let store = storage.rules.load()?;
//! let transport = Arc::new(CommandTransport::parse("my-oracle --json")?);
//! let report = CategorizationPipeline::new(&store, transport, PipelineOptions::from_settings(&settings))
//!     .with_audit(storage.audit())
//!     .run(&transactions, &catalog)?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use error::{CategorizeError, CategorizeResult};
