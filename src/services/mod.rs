//! Service layer
//!
//! The categorization engine proper (matching, routing, batching, the oracle
//! protocol and the pipeline that ties them together) plus rule management
//! and transaction import for the command-line host.

pub mod batch;
pub mod dispatch;
pub mod import;
pub mod matcher;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod rule_store;
pub mod rules;
pub mod suggest;
pub mod transport;

pub use batch::{Batch, BatchPlanner};
pub use dispatch::{CancelFlag, DispatchReport, Dispatcher};
pub use import::{ImportReport, TransactionImporter};
pub use matcher::MerchantMatcher;
pub use oracle::{OracleProtocol, OracleRequest, OrdinalTable, ValidationItem};
pub use pipeline::{
    CategorizationPipeline, MemorySink, PipelineOptions, RunReport, RunSummary, TransactionSink,
};
pub use policy::{Decision, ModePolicy};
pub use rule_store::RuleStore;
pub use rules::RuleService;
pub use suggest::RuleSuggester;
pub use transport::{CommandTransport, OracleTransport};
