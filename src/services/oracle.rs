//! Oracle protocol
//!
//! Builds classification and validation requests for a batch and parses the
//! oracle's answers back into per-transaction results.
//!
//! The oracle never sees real transaction identifiers. Each request numbers
//! its transactions 1..N and keeps an [`OrdinalTable`] that maps those
//! ordinals back to the caller's ids. Parsing fails closed: entries with an
//! unknown ordinal or missing fields are dropped and counted, never guessed.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::batch::Batch;
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{
    BatchToken, CategoryCatalog, CategoryId, RuleId, Transaction, TransactionId,
};

/// A rule match waiting for oracle validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationItem {
    pub transaction: Transaction,
    pub rule_id: RuleId,
    pub category_id: CategoryId,
    pub confidence: u8,
    pub labels: Vec<String>,
}

/// Maps sequence-local ordinals (1..N) back to real transaction ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalTable {
    token: BatchToken,
    ids: Vec<TransactionId>,
}

impl OrdinalTable {
    pub fn new(token: BatchToken, ids: Vec<TransactionId>) -> Self {
        Self { token, ids }
    }

    pub fn token(&self) -> BatchToken {
        self.token
    }

    pub fn ids(&self) -> &[TransactionId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Look up the real id for a 1-based ordinal
    pub fn resolve(&self, ordinal: i64) -> Option<&TransactionId> {
        if ordinal < 1 {
            return None;
        }
        self.ids.get(usize::try_from(ordinal - 1).ok()?)
    }
}

/// Which question a request asks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Classify,
    Validate,
}

/// A request ready to hand to the transport
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub kind: RequestKind,
    pub text: String,
    pub table: OrdinalTable,
}

impl OracleRequest {
    pub fn token(&self) -> BatchToken {
        self.table.token()
    }
}

#[derive(Serialize)]
struct CategoryEntry<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct TransactionEntry<'a> {
    ordinal: usize,
    payee: &'a str,
    amount: String,
    date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_confidence: Option<u8>,
}

#[derive(Serialize)]
struct RequestPayload<'a> {
    kind: RequestKind,
    batch: String,
    categories: Vec<CategoryEntry<'a>>,
    transactions: Vec<TransactionEntry<'a>>,
}

/// Cold classification answer for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// `None` when the oracle had no usable category
    pub category_id: Option<CategoryId>,
    pub confidence: u8,
    pub rationale: Option<String>,
}

/// The oracle's judgement of a rule suggestion
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Confirm { confidence: u8 },
    Reject { category_id: CategoryId, confidence: u8 },
}

/// Validation answer for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub verdict: Verdict,
    pub rationale: Option<String>,
}

/// Results remapped to real ids, plus the number of discarded entries
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse<R> {
    pub results: HashMap<TransactionId, R>,
    pub dropped: usize,
}

impl<R> ParsedResponse<R> {
    /// Ids from the table that received no usable result
    pub fn missing<'a>(&self, table: &'a OrdinalTable) -> Vec<&'a TransactionId> {
        table
            .ids()
            .iter()
            .filter(|id| !self.results.contains_key(*id))
            .collect()
    }
}

/// Request building and response parsing
pub struct OracleProtocol;

impl OracleProtocol {
    /// Build a cold classification request for a batch of transactions
    pub fn build_classification_request(
        batch: &Batch<Transaction>,
        catalog: &CategoryCatalog,
    ) -> CategorizeResult<OracleRequest> {
        let transactions = batch
            .items
            .iter()
            .enumerate()
            .map(|(i, txn)| TransactionEntry {
                ordinal: i + 1,
                payee: &txn.payee,
                amount: txn.amount.to_decimal_string(),
                date: txn.date.format("%Y-%m-%d").to_string(),
                suggested_category: None,
                rule_confidence: None,
            })
            .collect();

        let ids = batch.items.iter().map(|t| t.id.clone()).collect();
        Self::finish(RequestKind::Classify, batch.token, ids, catalog, transactions)
    }

    /// Build a validation request for a batch of rule suggestions
    pub fn build_validation_request(
        batch: &Batch<ValidationItem>,
        catalog: &CategoryCatalog,
    ) -> CategorizeResult<OracleRequest> {
        let transactions = batch
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| TransactionEntry {
                ordinal: i + 1,
                payee: &item.transaction.payee,
                amount: item.transaction.amount.to_decimal_string(),
                date: item.transaction.date.format("%Y-%m-%d").to_string(),
                suggested_category: Some(
                    catalog
                        .get(&item.category_id)
                        .map(|c| c.name.as_str())
                        .unwrap_or(item.category_id.as_str()),
                ),
                rule_confidence: Some(item.confidence),
            })
            .collect();

        let ids = batch
            .items
            .iter()
            .map(|item| item.transaction.id.clone())
            .collect();
        Self::finish(RequestKind::Validate, batch.token, ids, catalog, transactions)
    }

    fn finish(
        kind: RequestKind,
        token: BatchToken,
        ids: Vec<TransactionId>,
        catalog: &CategoryCatalog,
        transactions: Vec<TransactionEntry<'_>>,
    ) -> CategorizeResult<OracleRequest> {
        let payload = RequestPayload {
            kind,
            batch: token.to_string(),
            categories: catalog
                .categories()
                .iter()
                .map(|c| CategoryEntry {
                    id: c.id.as_str(),
                    name: &c.name,
                })
                .collect(),
            transactions,
        };

        Ok(OracleRequest {
            kind,
            text: serde_json::to_string(&payload)?,
            table: OrdinalTable::new(token, ids),
        })
    }

    /// Parse a cold classification response
    pub fn parse_classification_response(
        text: &str,
        table: &OrdinalTable,
        catalog: &CategoryCatalog,
    ) -> CategorizeResult<ParsedResponse<Classification>> {
        Self::parse_entries(text, table, |entry| {
            let category = match entry.get("category") {
                None => return Err("missing category".to_string()),
                Some(Value::Null) => None,
                Some(Value::String(s)) if s.trim().is_empty() => None,
                Some(Value::String(s)) => Some(
                    catalog
                        .resolve(s)
                        .map(|c| c.id.clone())
                        .ok_or_else(|| format!("unknown category '{}'", s))?,
                ),
                Some(other) => return Err(format!("category is not text: {}", other)),
            };

            let confidence = match (&category, confidence_field(entry)) {
                (_, Some(confidence)) => confidence,
                (None, None) => 0,
                (Some(_), None) => return Err("missing confidence".to_string()),
            };

            Ok(Classification {
                category_id: category,
                confidence,
                rationale: rationale_field(entry),
            })
        })
    }

    /// Parse a validation response
    pub fn parse_validation_response(
        text: &str,
        table: &OrdinalTable,
        catalog: &CategoryCatalog,
    ) -> CategorizeResult<ParsedResponse<ValidationVerdict>> {
        Self::parse_entries(text, table, |entry| {
            let verdict = entry
                .get("verdict")
                .or_else(|| entry.get("decision"))
                .and_then(Value::as_str)
                .ok_or_else(|| "missing verdict".to_string())?;
            let confidence = confidence_field(entry).ok_or_else(|| "missing confidence".to_string())?;

            let verdict = match verdict.trim().to_ascii_uppercase().as_str() {
                "CONFIRM" => Verdict::Confirm { confidence },
                "REJECT" => {
                    let text = entry
                        .get("category")
                        .and_then(Value::as_str)
                        .ok_or_else(|| "reject without replacement category".to_string())?;
                    let category = catalog
                        .resolve(text)
                        .ok_or_else(|| format!("unknown category '{}'", text))?;
                    Verdict::Reject {
                        category_id: category.id.clone(),
                        confidence,
                    }
                }
                other => return Err(format!("unknown verdict '{}'", other)),
            };

            Ok(ValidationVerdict {
                verdict,
                rationale: rationale_field(entry),
            })
        })
    }

    fn parse_entries<R>(
        text: &str,
        table: &OrdinalTable,
        mut parse: impl FnMut(&Value) -> Result<R, String>,
    ) -> CategorizeResult<ParsedResponse<R>> {
        let payload = extract_payload(text).ok_or_else(|| {
            CategorizeError::OracleMalformedResponse(format!(
                "batch {}: no JSON payload in response",
                table.token()
            ))
        })?;

        let entries = response_entries(payload).ok_or_else(|| {
            CategorizeError::OracleMalformedResponse(format!(
                "batch {}: expected a list of results",
                table.token()
            ))
        })?;

        let mut results = HashMap::with_capacity(entries.len());
        let mut dropped = 0;

        for entry in &entries {
            let Some(ordinal) = ordinal_field(entry) else {
                warn!(batch = %table.token(), "Dropping oracle entry without ordinal");
                dropped += 1;
                continue;
            };

            let Some(id) = table.resolve(ordinal) else {
                warn!(
                    batch = %table.token(),
                    ordinal,
                    size = table.len(),
                    "Dropping oracle entry with out-of-range ordinal"
                );
                dropped += 1;
                continue;
            };

            if results.contains_key(id) {
                warn!(batch = %table.token(), ordinal, "Dropping duplicate oracle entry");
                dropped += 1;
                continue;
            }

            match parse(entry) {
                Ok(result) => {
                    results.insert(id.clone(), result);
                }
                Err(reason) => {
                    warn!(batch = %table.token(), ordinal, %reason, "Dropping malformed oracle entry");
                    dropped += 1;
                }
            }
        }

        debug!(
            batch = %table.token(),
            parsed = results.len(),
            dropped,
            "Parsed oracle response"
        );

        Ok(ParsedResponse { results, dropped })
    }
}

/// Find the JSON payload in a response that may carry prose or code fences
///
/// The whole text is tried first. Otherwise each `[` or `{` is tried as the
/// start of a JSON value, and the first one shaped like a result list wins.
fn extract_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    trimmed
        .char_indices()
        .filter(|(_, c)| matches!(c, '[' | '{'))
        .find_map(|(start, _)| {
            let value = serde_json::Deserializer::from_str(&trimmed[start..])
                .into_iter::<Value>()
                .next()?
                .ok()?;
            looks_like_results(&value).then_some(value)
        })
}

fn looks_like_results(value: &Value) -> bool {
    match value {
        Value::Array(entries) => entries.iter().all(Value::is_object),
        Value::Object(map) => matches!(map.get("results"), Some(Value::Array(_))),
        _ => false,
    }
}

fn response_entries(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(entries) => Some(entries),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(entries)) => Some(entries),
            _ => None,
        },
        _ => None,
    }
}

fn ordinal_field(entry: &Value) -> Option<i64> {
    match entry.get("ordinal")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn confidence_field(entry: &Value) -> Option<u8> {
    let raw = match entry.get("confidence")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

fn rationale_field(entry: &Value) -> Option<String> {
    entry
        .get("rationale")
        .or_else(|| entry.get("reason"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
