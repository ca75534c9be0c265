//! Categorization pipeline
//!
//! Runs one batch of transactions through rule matching, mode routing and
//! the oracle, producing exactly one outcome per input transaction:
//!
//! ```text
//! match rules ─┬─ no rule ─────────────> cold classification queue
//!              └─ rule ─> ModePolicy ─┬─ auto-apply ──> applied (rule)
//!                                     ├─ validate ────> validation queue
//!                                     ├─ skip ────────> deferred
//!                                     └─ await ───────> awaiting approval
//! ```
//!
//! Both queues are planned into batches, dispatched concurrently and merged
//! back by batch token. A failed batch only fails its own transactions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::batch::{Batch, BatchPlanner};
use super::dispatch::{CancelFlag, DispatchReport, Dispatcher};
use super::oracle::{
    Classification, OracleProtocol, OrdinalTable, ValidationItem, ValidationVerdict, Verdict,
};
use super::policy::{Decision, ModePolicy};
use super::rule_store::RuleStore;
use super::transport::OracleTransport;
use crate::audit::{AuditEntry, AuditLogger};
use crate::config::Settings;
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{
    BatchToken, CategorizationOutcome, CategoryCatalog, CategoryId, MatchResult, OperatingMode,
    Provenance, RuleId, Transaction, TransactionId,
};

/// Receives categories for applied transactions
pub trait TransactionSink {
    fn apply_category(
        &self,
        transaction_id: &TransactionId,
        category_id: &CategoryId,
    ) -> CategorizeResult<()>;
}

/// Sink that collects applied categories in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    applied: Mutex<Vec<(TransactionId, CategoryId)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applied categories in the order they were written
    pub fn applied(&self) -> Vec<(TransactionId, CategoryId)> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TransactionSink for MemorySink {
    fn apply_category(
        &self,
        transaction_id: &TransactionId,
        category_id: &CategoryId,
    ) -> CategorizeResult<()> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((transaction_id.clone(), category_id.clone()));
        Ok(())
    }
}

/// Run parameters, fixed for the lifetime of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub mode: OperatingMode,
    /// Bound on each oracle call
    pub timeout: Duration,
    /// Batches in flight at once
    pub max_in_flight: usize,
    /// Decide everything but write nothing through the sink or audit log
    pub dry_run: bool,
    /// Auto-apply is demoted to validation below this accuracy
    pub accuracy_threshold: Option<u8>,
    pub min_evidence: u64,
}

impl PipelineOptions {
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            mode,
            timeout: Duration::from_secs(30),
            max_in_flight: 4,
            dry_run: false,
            accuracy_threshold: None,
            min_evidence: 0,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.mode,
            timeout: Duration::from_secs(settings.oracle.timeout_secs),
            max_in_flight: settings.oracle.max_concurrent_batches,
            dry_run: settings.dry_run,
            accuracy_threshold: settings.accuracy.threshold,
            min_evidence: settings.accuracy.min_evidence,
        }
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_accuracy_feedback(mut self, threshold: Option<u8>, min_evidence: u64) -> Self {
        self.accuracy_threshold = threshold;
        self.min_evidence = min_evidence;
        self
    }
}

/// Per-run counts
///
/// The first seven buckets partition the input; the rest are reported
/// alongside them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub auto_applied: usize,
    pub validated_confirmed: usize,
    pub validated_rejected: usize,
    pub oracle_fallback: usize,
    pub deferred: usize,
    pub awaiting_approval: usize,
    pub oracle_failed: usize,

    /// Transactions that had a categorizing rule match
    pub rule_matched: usize,
    pub failed_batches: usize,
    /// Oracle entries discarded during parsing
    pub dropped_entries: usize,
    pub cancelled_batches: usize,
    pub sink_errors: usize,
}

impl RunSummary {
    /// Sum of the partitioning buckets; always equals the input size
    pub fn total(&self) -> usize {
        self.auto_applied
            + self.validated_confirmed
            + self.validated_rejected
            + self.oracle_fallback
            + self.deferred
            + self.awaiting_approval
            + self.oracle_failed
    }

    /// Transactions that ended with a category applied
    pub fn applied(&self) -> usize {
        self.auto_applied + self.validated_confirmed + self.validated_rejected + self.oracle_fallback
    }

    fn tally(&mut self, bucket: Bucket) {
        match bucket {
            Bucket::AutoApplied => self.auto_applied += 1,
            Bucket::ValidatedConfirmed => self.validated_confirmed += 1,
            Bucket::ValidatedRejected => self.validated_rejected += 1,
            Bucket::OracleFallback => self.oracle_fallback += 1,
            Bucket::Deferred => self.deferred += 1,
            Bucket::AwaitingApproval => self.awaiting_approval += 1,
            Bucket::OracleFailed => self.oracle_failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    AutoApplied,
    ValidatedConfirmed,
    ValidatedRejected,
    OracleFallback,
    Deferred,
    AwaitingApproval,
    OracleFailed,
}

/// Outcomes in input order plus the run summary
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<CategorizationOutcome>,
    pub summary: RunSummary,
}

/// A planned batch waiting for its oracle answer
enum PendingBatch {
    Cold(Batch<Transaction>),
    Validate(Batch<ValidationItem>),
}

/// Mutable state of one run
#[derive(Default)]
struct RunState {
    outcomes: HashMap<TransactionId, CategorizationOutcome>,
    summary: RunSummary,
    /// Labels of escalated transactions, reattached after classification
    labels: HashMap<TransactionId, Vec<String>>,
}

impl RunState {
    fn settle(&mut self, outcome: CategorizationOutcome, bucket: Bucket) {
        self.summary.tally(bucket);
        self.outcomes.insert(outcome.transaction_id.clone(), outcome);
    }

    fn take_labels(&mut self, id: &TransactionId) -> Vec<String> {
        self.labels.remove(id).unwrap_or_default()
    }
}

/// Orchestrates rule matching, routing and oracle batches for a run
pub struct CategorizationPipeline<'a> {
    store: &'a RuleStore,
    transport: Arc<dyn OracleTransport>,
    options: PipelineOptions,
    cancel: CancelFlag,
    sink: Option<&'a dyn TransactionSink>,
    audit: Option<&'a AuditLogger>,
}

impl<'a> CategorizationPipeline<'a> {
    pub fn new(
        store: &'a RuleStore,
        transport: Arc<dyn OracleTransport>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            transport,
            options,
            cancel: CancelFlag::new(),
            sink: None,
            audit: None,
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn TransactionSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_audit(mut self, audit: &'a AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Handle that stops the run from dispatching further batches
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Categorize `transactions` against `catalog`
    ///
    /// Returns one outcome per transaction, in input order. Oracle failures
    /// are reported per transaction; only invalid input fails the run.
    pub fn run(
        &self,
        transactions: &[Transaction],
        catalog: &CategoryCatalog,
    ) -> CategorizeResult<RunReport> {
        check_unique_ids(transactions)?;

        let mode = self.options.mode;
        info!(%mode, count = transactions.len(), dry_run = self.options.dry_run, "Starting categorization run");

        let mut state = RunState::default();
        let mut to_validate = Vec::new();
        let mut to_escalate = Vec::new();

        for txn in transactions {
            let MatchResult {
                rule,
                confidence,
                labels,
            } = self.store.match_transaction(txn);

            let Some((rule, category)) =
                rule.and_then(|rule| rule.category_id.clone().map(|category| (rule, category)))
            else {
                debug!(txn = %txn.id, "No rule matched, escalating");
                if !labels.is_empty() {
                    state.labels.insert(txn.id.clone(), labels);
                }
                to_escalate.push(txn.clone());
                continue;
            };

            state.summary.rule_matched += 1;
            let confidence = confidence.unwrap_or_else(|| rule.confidence());
            let decision = ModePolicy::demote_for_accuracy(
                ModePolicy::classify(Some(&rule), mode),
                &rule,
                self.options.accuracy_threshold,
                self.options.min_evidence,
            );
            debug!(txn = %txn.id, rule = %rule.id, confidence, %decision, "Routed transaction");

            match decision {
                Decision::AutoApply => {
                    self.record(rule.id, true);
                    let outcome = CategorizationOutcome::applied(
                        txn.id.clone(),
                        category,
                        confidence,
                        Provenance::Rule,
                    )
                    .with_rule(rule.id)
                    .with_labels(labels);
                    state.settle(outcome, Bucket::AutoApplied);
                }
                Decision::Validate => to_validate.push(ValidationItem {
                    transaction: txn.clone(),
                    rule_id: rule.id,
                    category_id: category,
                    confidence,
                    labels,
                }),
                Decision::Skip => {
                    self.record(rule.id, false);
                    let outcome = CategorizationOutcome::deferred(txn.id.clone())
                        .with_rule(rule.id)
                        .with_labels(labels);
                    state.settle(outcome, Bucket::Deferred);
                }
                Decision::AwaitApproval => {
                    self.record(rule.id, false);
                    let outcome = CategorizationOutcome::awaiting_approval(
                        txn.id.clone(),
                        Some(category),
                        confidence,
                    )
                    .with_rule(rule.id)
                    .with_labels(labels);
                    state.settle(outcome, Bucket::AwaitingApproval);
                }
                Decision::Escalate => to_escalate.push(txn.clone()),
            }
        }

        self.run_oracle(to_validate, to_escalate, catalog, &mut state);

        let mut outcomes = Vec::with_capacity(transactions.len());
        for txn in transactions {
            let outcome = match state.outcomes.remove(&txn.id) {
                Some(outcome) => outcome,
                None => {
                    warn!(txn = %txn.id, "Transaction left without an outcome, deferring");
                    state.summary.tally(Bucket::Deferred);
                    CategorizationOutcome::deferred(txn.id.clone())
                }
            };
            outcomes.push(outcome);
        }

        self.write_back(transactions, &mut outcomes, &mut state.summary);

        let summary = state.summary;
        info!(
            total = summary.total(),
            applied = summary.applied(),
            deferred = summary.deferred,
            awaiting_approval = summary.awaiting_approval,
            oracle_failed = summary.oracle_failed,
            failed_batches = summary.failed_batches,
            "Categorization run finished"
        );

        Ok(RunReport { outcomes, summary })
    }

    fn record(&self, rule_id: RuleId, applied: bool) {
        if let Err(e) = self.store.record_outcome(rule_id, applied, false) {
            warn!(rule = %rule_id, error = %e, "Failed to record rule outcome");
        }
    }

    fn run_oracle(
        &self,
        to_validate: Vec<ValidationItem>,
        to_escalate: Vec<Transaction>,
        catalog: &CategoryCatalog,
        state: &mut RunState,
    ) {
        let mode = self.options.mode;
        let mut requests = Vec::new();
        let mut pending = HashMap::new();

        for batch in BatchPlanner::plan(to_validate, mode) {
            match OracleProtocol::build_validation_request(&batch, catalog) {
                Ok(request) => {
                    requests.push(request);
                    pending.insert(batch.token, PendingBatch::Validate(batch));
                }
                Err(e) => self.fail_batch(PendingBatch::Validate(batch), &e, state),
            }
        }

        for batch in BatchPlanner::plan(to_escalate, mode) {
            match OracleProtocol::build_classification_request(&batch, catalog) {
                Ok(request) => {
                    requests.push(request);
                    pending.insert(batch.token, PendingBatch::Cold(batch));
                }
                Err(e) => self.fail_batch(PendingBatch::Cold(batch), &e, state),
            }
        }

        if requests.is_empty() {
            return;
        }

        debug!(batches = requests.len(), "Dispatching oracle batches");
        let DispatchReport {
            mut responses,
            cancelled,
        } = Dispatcher::new(Arc::clone(&self.transport), self.options.timeout)
            .with_max_in_flight(self.options.max_in_flight)
            .with_cancel_flag(self.cancel.clone())
            .dispatch(&requests);
        let cancelled: HashSet<BatchToken> = cancelled.into_iter().collect();

        for request in &requests {
            let token = request.token();
            let Some(batch) = pending.remove(&token) else {
                continue;
            };

            if cancelled.contains(&token) {
                state.summary.cancelled_batches += 1;
                self.cancel_batch(batch, state);
                continue;
            }

            let text = match responses.remove(&token) {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    self.fail_batch(batch, &e, state);
                    continue;
                }
                None => {
                    let e = CategorizeError::OracleTransport("no response recorded".into());
                    self.fail_batch(batch, &e, state);
                    continue;
                }
            };

            match batch {
                PendingBatch::Cold(batch) => {
                    self.merge_classifications(batch, &text, &request.table, catalog, state)
                }
                PendingBatch::Validate(batch) => {
                    self.merge_verdicts(batch, &text, &request.table, catalog, state)
                }
            }
        }
    }

    fn merge_classifications(
        &self,
        batch: Batch<Transaction>,
        text: &str,
        table: &OrdinalTable,
        catalog: &CategoryCatalog,
        state: &mut RunState,
    ) {
        let parsed = match OracleProtocol::parse_classification_response(text, table, catalog) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail_batch(PendingBatch::Cold(batch), &e, state),
        };
        state.summary.dropped_entries += parsed.dropped;
        let mut results = parsed.results;

        for txn in batch.items {
            let labels = state.take_labels(&txn.id);
            match results.remove(&txn.id) {
                Some(Classification {
                    category_id: Some(category),
                    confidence,
                    rationale,
                }) => {
                    let outcome = CategorizationOutcome::applied(
                        txn.id,
                        category,
                        confidence,
                        Provenance::Oracle,
                    )
                    .with_rationale(rationale)
                    .with_labels(labels);
                    state.settle(outcome, Bucket::OracleFallback);
                }
                Some(Classification {
                    category_id: None,
                    rationale,
                    ..
                }) => {
                    let outcome = CategorizationOutcome::deferred(txn.id)
                        .with_rationale(rationale)
                        .with_labels(labels);
                    state.settle(outcome, Bucket::Deferred);
                }
                None => {
                    let outcome =
                        CategorizationOutcome::oracle_failed(txn.id, "no usable oracle entry")
                            .with_labels(labels);
                    state.settle(outcome, Bucket::OracleFailed);
                }
            }
        }
    }

    fn merge_verdicts(
        &self,
        batch: Batch<ValidationItem>,
        text: &str,
        table: &OrdinalTable,
        catalog: &CategoryCatalog,
        state: &mut RunState,
    ) {
        let parsed = match OracleProtocol::parse_validation_response(text, table, catalog) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail_batch(PendingBatch::Validate(batch), &e, state),
        };
        state.summary.dropped_entries += parsed.dropped;
        let mut results = parsed.results;
        let floor = ModePolicy::validation_floor(self.options.mode);

        for item in batch.items {
            let id = item.transaction.id;
            match results.remove(&id) {
                Some(ValidationVerdict {
                    verdict: Verdict::Confirm { confidence },
                    rationale,
                }) => {
                    self.record(item.rule_id, true);
                    let outcome = CategorizationOutcome::applied(
                        id,
                        item.category_id,
                        confidence.max(floor),
                        Provenance::Rule,
                    )
                    .with_rule(item.rule_id)
                    .with_rationale(rationale)
                    .with_labels(item.labels);
                    state.settle(outcome, Bucket::ValidatedConfirmed);
                }
                Some(ValidationVerdict {
                    verdict:
                        Verdict::Reject {
                            category_id,
                            confidence,
                        },
                    rationale,
                }) => {
                    self.record(item.rule_id, false);
                    let outcome = CategorizationOutcome::applied(
                        id,
                        category_id,
                        confidence,
                        Provenance::OracleAfterValidation,
                    )
                    .with_rule(item.rule_id)
                    .with_rationale(rationale)
                    .with_labels(item.labels);
                    state.settle(outcome, Bucket::ValidatedRejected);
                }
                None => {
                    let outcome = CategorizationOutcome::oracle_failed(id, "no usable oracle entry")
                        .with_rule(item.rule_id)
                        .with_labels(item.labels);
                    state.settle(outcome, Bucket::OracleFailed);
                }
            }
        }
    }

    /// Fail every transaction of a batch; rule counters are left untouched
    fn fail_batch(&self, batch: PendingBatch, error: &CategorizeError, state: &mut RunState) {
        state.summary.failed_batches += 1;
        let message = error.to_string();

        match batch {
            PendingBatch::Cold(batch) => {
                warn!(batch = %batch.token, size = batch.len(), error = %message, "Classification batch failed");
                for txn in batch.items {
                    let labels = state.take_labels(&txn.id);
                    let outcome = CategorizationOutcome::oracle_failed(txn.id, message.clone())
                        .with_labels(labels);
                    state.settle(outcome, Bucket::OracleFailed);
                }
            }
            PendingBatch::Validate(batch) => {
                warn!(batch = %batch.token, size = batch.len(), error = %message, "Validation batch failed");
                for item in batch.items {
                    let outcome =
                        CategorizationOutcome::oracle_failed(item.transaction.id, message.clone())
                            .with_rule(item.rule_id)
                            .with_labels(item.labels);
                    state.settle(outcome, Bucket::OracleFailed);
                }
            }
        }
    }

    fn cancel_batch(&self, batch: PendingBatch, state: &mut RunState) {
        let cancelled = |id: TransactionId, labels: Vec<String>| CategorizationOutcome {
            error: Some("cancelled before dispatch".to_string()),
            ..CategorizationOutcome::deferred(id).with_labels(labels)
        };

        match batch {
            PendingBatch::Cold(batch) => {
                info!(batch = %batch.token, size = batch.len(), "Classification batch cancelled");
                for txn in batch.items {
                    let labels = state.take_labels(&txn.id);
                    state.settle(cancelled(txn.id, labels), Bucket::Deferred);
                }
            }
            PendingBatch::Validate(batch) => {
                info!(batch = %batch.token, size = batch.len(), "Validation batch cancelled");
                for item in batch.items {
                    let outcome = cancelled(item.transaction.id, item.labels).with_rule(item.rule_id);
                    state.settle(outcome, Bucket::Deferred);
                }
            }
        }
    }

    /// Push applied categories through the sink and into the audit log
    fn write_back(
        &self,
        transactions: &[Transaction],
        outcomes: &mut [CategorizationOutcome],
        summary: &mut RunSummary,
    ) {
        if self.options.dry_run {
            debug!("Dry run, skipping write-back");
            return;
        }

        let mut entries = Vec::new();
        for (txn, outcome) in transactions.iter().zip(outcomes.iter_mut()) {
            let Some(category) = outcome.category_id.clone().filter(|_| outcome.is_applied())
            else {
                continue;
            };

            if let Some(sink) = self.sink {
                if let Err(e) = sink.apply_category(&outcome.transaction_id, &category) {
                    warn!(txn = %outcome.transaction_id, error = %e, "Sink rejected category");
                    summary.sink_errors += 1;
                    outcome.error = Some(e.to_string());
                    continue;
                }
            }

            entries.push(AuditEntry::categorize(&txn.payee, outcome));
        }

        if let Some(audit) = self.audit {
            if let Err(e) = audit.log_batch(&entries) {
                warn!(error = %e, "Failed to write audit entries");
            }
        }
    }
}

fn check_unique_ids(transactions: &[Transaction]) -> CategorizeResult<()> {
    let mut seen = HashSet::with_capacity(transactions.len());
    for txn in transactions {
        if !seen.insert(&txn.id) {
            return Err(CategorizeError::Validation(format!(
                "duplicate transaction id '{}' in input",
                txn.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Money, OutcomeState, RuleRecord};
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::new(vec![
            Category::new("groceries", "Groceries"),
            Category::new("dining", "Dining Out"),
            Category::new("fuel", "Fuel"),
        ])
    }

    fn txn(id: &str, payee: &str) -> Transaction {
        Transaction::new(
            id,
            payee,
            Money::from_cents(-4250),
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
        )
    }

    fn store_with(rules: Vec<RuleRecord>) -> RuleStore {
        RuleStore::from_rules(rules.into_iter().map(|r| r.build().unwrap()).collect()).unwrap()
    }

    fn woolworths(confidence: u8) -> RuleRecord {
        RuleRecord::new("Woolworths", "WOOLWORTHS.*")
            .category("groceries")
            .confidence(confidence)
    }

    /// Transport that answers every request with `answer` and counts calls
    fn scripted(
        answer: impl Fn(&Value) -> CategorizeResult<String> + Send + Sync + 'static,
    ) -> (Arc<dyn OracleTransport>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport: Arc<dyn OracleTransport> =
            Arc::new(move |request: &str| -> CategorizeResult<String> {
                counter.fetch_add(1, Ordering::SeqCst);
                let value: Value = serde_json::from_str(request).unwrap();
                answer(&value)
            });
        (transport, calls)
    }

    /// Build a response with one entry per transaction in the request
    fn each(request: &Value, entry: impl Fn(u64) -> Value) -> String {
        let entries: Vec<Value> = request["transactions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| entry(t["ordinal"].as_u64().unwrap()))
            .collect();
        Value::Array(entries).to_string()
    }

    fn never_called() -> (Arc<dyn OracleTransport>, Arc<AtomicUsize>) {
        scripted(|_| Err(CategorizeError::OracleTransport("unexpected call".into())))
    }

    #[test]
    fn test_high_confidence_rule_auto_applies() {
        let store = store_with(vec![woolworths(95)]);
        let (transport, calls) = never_called();
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline
            .run(&[txn("1", "WOOLWORTHS 1234 SYDNEY")], &catalog())
            .unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, OutcomeState::Applied);
        assert_eq!(outcome.category_id, Some(CategoryId::from("groceries")));
        assert_eq!(outcome.provenance, Some(Provenance::Rule));
        assert!(outcome.auto_applied);
        assert_eq!(report.summary.auto_applied, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let rule = &store.all()[0];
        assert_eq!(rule.stats().applied_count, 1);
        assert_eq!(rule.stats().match_count, 1);
    }

    #[test]
    fn test_confirmed_validation_applies_with_adjusted_confidence() {
        let store = store_with(vec![woolworths(75)]);
        let rule_id = store.all()[0].id;
        let (transport, calls) = scripted(|request| {
            assert_eq!(request["kind"], "validate");
            Ok(each(request, |ordinal| {
                json!({"ordinal": ordinal, "verdict": "CONFIRM", "confidence": 92})
            }))
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline.run(&[txn("1", "WOOLWORTHS METRO")], &catalog()).unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, OutcomeState::Applied);
        assert_eq!(outcome.provenance, Some(Provenance::Rule));
        assert_eq!(outcome.confidence, Some(92));
        assert_eq!(outcome.rule_id, Some(rule_id));
        assert_eq!(report.summary.validated_confirmed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(rule_id).unwrap().stats().applied_count, 1);
    }

    #[test]
    fn test_confirm_below_band_floor_is_raised() {
        let store = store_with(vec![woolworths(75)]);
        let (transport, _) = scripted(|request| {
            Ok(each(request, |ordinal| {
                json!({"ordinal": ordinal, "verdict": "CONFIRM", "confidence": 40})
            }))
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline.run(&[txn("1", "WOOLWORTHS")], &catalog()).unwrap();
        assert_eq!(report.outcomes[0].confidence, Some(70));
    }

    #[test]
    fn test_no_rule_aggressive_sends_single_cold_batch() {
        let store = RuleStore::new();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&sizes);
        let (transport, calls) = scripted(move |request| {
            assert_eq!(request["kind"], "classify");
            seen.lock()
                .unwrap()
                .push(request["transactions"].as_array().unwrap().len());
            Ok(each(request, |ordinal| json!({"ordinal": ordinal, "category": null})))
        });
        let pipeline = CategorizationPipeline::new(
            &store,
            transport,
            PipelineOptions::new(OperatingMode::Aggressive),
        );

        let report = pipeline.run(&[txn("1", "ACME PTY LTD")], &catalog()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*sizes.lock().unwrap(), vec![1]);
        assert_eq!(report.outcomes[0].state, OutcomeState::Deferred);
        assert_eq!(report.outcomes[0].category_id, None);
        assert_eq!(report.summary.deferred, 1);
        assert_eq!(report.summary.oracle_failed, 0);
    }

    #[test]
    fn test_cold_classification_applies_oracle_category() {
        let store = RuleStore::new();
        let (transport, _) = scripted(|request| {
            Ok(each(request, |ordinal| {
                json!({"ordinal": ordinal, "category": "Dining Out", "confidence": 81, "rationale": "restaurant"})
            }))
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline.run(&[txn("1", "THAI PALACE")], &catalog()).unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.provenance, Some(Provenance::Oracle));
        assert_eq!(outcome.category_id, Some(CategoryId::from("dining")));
        assert_eq!(outcome.rationale.as_deref(), Some("restaurant"));
        assert_eq!(report.summary.oracle_fallback, 1);
    }

    #[test]
    fn test_reject_replaces_category_and_records_not_applied() {
        let store = store_with(vec![woolworths(75)]);
        let rule_id = store.all()[0].id;
        let (transport, _) = scripted(|request| {
            Ok(each(request, |ordinal| {
                json!({"ordinal": ordinal, "verdict": "REJECT", "category": "fuel", "confidence": 85})
            }))
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline.run(&[txn("1", "WOOLWORTHS PETROL")], &catalog()).unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.category_id, Some(CategoryId::from("fuel")));
        assert_eq!(outcome.provenance, Some(Provenance::OracleAfterValidation));
        assert_eq!(report.summary.validated_rejected, 1);

        let stats = store.get(rule_id).unwrap().stats().clone();
        assert_eq!(stats.match_count, 1);
        assert_eq!(stats.applied_count, 0);
    }

    #[test]
    fn test_failed_batch_does_not_abort_run() {
        let store = store_with(vec![woolworths(75)]);
        let rule_id = store.all()[0].id;
        let (transport, _) = scripted(|request| {
            if request["kind"] == "validate" {
                return Err(CategorizeError::OracleTimeout(100));
            }
            Ok(each(request, |ordinal| {
                json!({"ordinal": ordinal, "category": "groceries", "confidence": 88})
            }))
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let transactions = [txn("1", "WOOLWORTHS"), txn("2", "COLES")];
        let report = pipeline.run(&transactions, &catalog()).unwrap();

        assert_eq!(report.outcomes[0].state, OutcomeState::OracleFailed);
        assert!(report.outcomes[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.outcomes[1].state, OutcomeState::Applied);
        assert_eq!(report.summary.failed_batches, 1);
        assert_eq!(report.summary.oracle_failed, 1);
        assert_eq!(report.summary.oracle_fallback, 1);
        // Failed validation leaves the rule untouched
        assert_eq!(store.get(rule_id).unwrap().stats().match_count, 0);
    }

    #[test]
    fn test_malformed_response_fails_batch() {
        let store = RuleStore::new();
        let (transport, _) = scripted(|_| Ok("sorry, I can't do that".to_string()));
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline
            .run(&[txn("1", "A"), txn("2", "B")], &catalog())
            .unwrap();
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.state == OutcomeState::OracleFailed));
        assert_eq!(report.summary.failed_batches, 1);
    }

    #[test]
    fn test_missing_entries_are_oracle_failed() {
        let store = RuleStore::new();
        let (transport, _) = scripted(|_| {
            Ok(json!([
                {"ordinal": 2, "category": "groceries", "confidence": 90},
                {"ordinal": 9, "category": "groceries", "confidence": 90}
            ])
            .to_string())
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline
            .run(&[txn("501", "A"), txn("77", "B"), txn("9000", "C")], &catalog())
            .unwrap();

        let states: Vec<_> = report.outcomes.iter().map(|o| o.state).collect();
        assert_eq!(
            states,
            vec![
                OutcomeState::OracleFailed,
                OutcomeState::Applied,
                OutcomeState::OracleFailed
            ]
        );
        assert_eq!(report.summary.dropped_entries, 1);
        assert_eq!(report.summary.failed_batches, 0);
    }

    #[test]
    fn test_counts_partition_input() {
        let store = store_with(vec![
            woolworths(95),
            RuleRecord::new("Coles", "COLES").category("groceries").confidence(80),
            RuleRecord::new("Kiosk", "KIOSK").category("dining").confidence(40),
            RuleRecord::new("Weekly", "WOOLWORTHS").tag("weekly-shop"),
        ]);
        let (transport, _) = scripted(|request| {
            if request["kind"] == "validate" {
                Ok(each(request, |o| json!({"ordinal": o, "verdict": "CONFIRM", "confidence": 90})))
            } else {
                Ok(each(request, |o| json!({"ordinal": o, "category": "fuel", "confidence": 70})))
            }
        });
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let transactions = [
            txn("1", "WOOLWORTHS EPPING"),
            txn("2", "COLES CENTRAL"),
            txn("3", "KIOSK 7"),
            txn("4", "SHELL 123"),
            txn("5", "WOOLWORTHS METRO"),
        ];
        let report = pipeline.run(&transactions, &catalog()).unwrap();

        assert_eq!(report.outcomes.len(), transactions.len());
        assert_eq!(report.summary.total(), transactions.len());
        assert_eq!(report.summary.auto_applied, 2);
        assert_eq!(report.summary.validated_confirmed, 1);
        assert_eq!(report.summary.deferred, 1);
        assert_eq!(report.summary.oracle_fallback, 1);
        assert_eq!(report.summary.rule_matched, 4);

        let ids: Vec<_> = report.outcomes.iter().map(|o| o.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(report.outcomes[0].labels, vec!["weekly-shop".to_string()]);
    }

    #[test]
    fn test_conservative_awaits_approval() {
        let store = store_with(vec![woolworths(100)]);
        let rule_id = store.all()[0].id;
        let (transport, calls) = never_called();
        let pipeline = CategorizationPipeline::new(
            &store,
            transport,
            PipelineOptions::new(OperatingMode::Conservative),
        );

        let report = pipeline.run(&[txn("1", "WOOLWORTHS")], &catalog()).unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, OutcomeState::AwaitingApproval);
        assert!(outcome.pending_approval);
        assert!(!outcome.auto_applied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let stats = store.get(rule_id).unwrap().stats().clone();
        assert_eq!(stats.match_count, 1);
        assert_eq!(stats.applied_count, 0);
    }

    #[test]
    fn test_poor_accuracy_demotes_to_validation() {
        let mut record = woolworths(95);
        record.stats.applied_count = 10;
        record.stats.override_count = 6;
        let store = store_with(vec![record]);
        let (transport, calls) = scripted(|request| {
            assert_eq!(request["kind"], "validate");
            Ok(each(request, |o| json!({"ordinal": o, "verdict": "CONFIRM", "confidence": 95})))
        });
        let options = PipelineOptions::new(OperatingMode::Smart).with_accuracy_feedback(Some(60), 5);
        let pipeline = CategorizationPipeline::new(&store, transport, options);

        let report = pipeline.run(&[txn("1", "WOOLWORTHS")], &catalog()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.summary.validated_confirmed, 1);
    }

    #[test]
    fn test_sink_receives_applied_categories() {
        let store = store_with(vec![woolworths(95), RuleRecord::new("Kiosk", "KIOSK").category("dining").confidence(10)]);
        let (transport, _) = never_called();
        let sink = MemorySink::new();
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart))
                .with_sink(&sink);

        pipeline
            .run(&[txn("1", "WOOLWORTHS"), txn("2", "KIOSK")], &catalog())
            .unwrap();
        assert_eq!(
            sink.applied(),
            vec![(TransactionId::from("1"), CategoryId::from("groceries"))]
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let audit = AuditLogger::new(temp.path().join("audit.log"));
        let store = store_with(vec![woolworths(95)]);
        let (transport, _) = never_called();
        let sink = MemorySink::new();
        let options = PipelineOptions::new(OperatingMode::Smart).with_dry_run(true);
        let pipeline = CategorizationPipeline::new(&store, transport, options)
            .with_sink(&sink)
            .with_audit(&audit);

        let report = pipeline.run(&[txn("1", "WOOLWORTHS")], &catalog()).unwrap();
        assert_eq!(report.summary.auto_applied, 1);
        assert!(sink.applied().is_empty());
        assert!(audit.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_applied_outcomes_are_audited() {
        let temp = TempDir::new().unwrap();
        let audit = AuditLogger::new(temp.path().join("audit.log"));
        let store = store_with(vec![woolworths(95)]);
        let (transport, _) = never_called();
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart))
                .with_audit(&audit);

        pipeline.run(&[txn("1", "WOOLWORTHS")], &catalog()).unwrap();

        let entries = audit.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_id, "1");
        assert_eq!(entries[0].entity_name.as_deref(), Some("WOOLWORTHS"));
    }

    #[test]
    fn test_sink_failure_is_counted() {
        struct FailingSink;
        impl TransactionSink for FailingSink {
            fn apply_category(&self, _: &TransactionId, _: &CategoryId) -> CategorizeResult<()> {
                Err(CategorizeError::PersistenceUnavailable("ledger locked".into()))
            }
        }

        let store = store_with(vec![woolworths(95)]);
        let (transport, _) = never_called();
        let sink = FailingSink;
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart))
                .with_sink(&sink);

        let report = pipeline.run(&[txn("1", "WOOLWORTHS")], &catalog()).unwrap();
        assert_eq!(report.summary.sink_errors, 1);
        assert!(report.outcomes[0].error.as_deref().unwrap().contains("ledger locked"));
    }

    #[test]
    fn test_cancelled_run_defers_undispatched() {
        let store = store_with(vec![woolworths(95)]);
        let (transport, calls) = never_called();
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));
        pipeline.cancel_flag().cancel();

        let report = pipeline
            .run(&[txn("1", "WOOLWORTHS"), txn("2", "UNKNOWN")], &catalog())
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.outcomes[0].state, OutcomeState::Applied);
        assert_eq!(report.outcomes[1].state, OutcomeState::Deferred);
        assert_eq!(
            report.outcomes[1].error.as_deref(),
            Some("cancelled before dispatch")
        );
        assert_eq!(report.summary.cancelled_batches, 1);
        assert_eq!(report.summary.oracle_failed, 0);
        assert_eq!(report.summary.total(), 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let store = RuleStore::new();
        let (transport, _) = never_called();
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let err = pipeline
            .run(&[txn("1", "A"), txn("1", "B")], &catalog())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_input() {
        let store = RuleStore::new();
        let (transport, calls) = never_called();
        let pipeline =
            CategorizationPipeline::new(&store, transport, PipelineOptions::new(OperatingMode::Smart));

        let report = pipeline.run(&[], &catalog()).unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary, RunSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_options_from_settings() {
        let mut settings = Settings::default();
        settings.mode = OperatingMode::Aggressive;
        settings.oracle.timeout_secs = 7;
        let options = PipelineOptions::from_settings(&settings);
        assert_eq!(options.mode, OperatingMode::Aggressive);
        assert_eq!(options.timeout, Duration::from_secs(7));
        assert_eq!(options.accuracy_threshold, Some(60));
    }
}
