//! Transaction import
//!
//! Loads the transactions for a run from CSV (`date,payee,amount[,account][,id]`)
//! or JSON. CSV headers are detected by name; a file without a header row is
//! read positionally. Bad rows are reported and skipped, never guessed.

use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CategorizeError, CategorizeResult};
use crate::models::{CategoryId, Money, Transaction, TransactionId};

/// Date formats tried in order when a row's date doesn't parse as ISO
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%y",
];

/// Column positions within a CSV record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub date_column: usize,
    pub payee_column: usize,
    pub amount_column: usize,
    pub account_column: Option<usize>,
    pub id_column: Option<usize>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            date_column: 0,
            payee_column: 1,
            amount_column: 2,
            account_column: Some(3),
            id_column: Some(4),
        }
    }
}

impl ColumnMapping {
    /// Detect the mapping from a header record
    ///
    /// Returns `None` when the record looks like data rather than headers.
    pub fn from_headers(headers: &StringRecord) -> Option<Self> {
        if headers.get(0).is_some_and(|first| parse_date(first).is_ok()) {
            return None;
        }

        let mut date = None;
        let mut payee = None;
        let mut amount = None;
        let mut account = None;
        let mut id = None;

        for (idx, header) in headers.iter().enumerate() {
            let h = header.trim().to_lowercase();
            if h.contains("date") || h.contains("posted") {
                date.get_or_insert(idx);
            } else if h.contains("payee") || h.contains("description") || h.contains("merchant") {
                payee.get_or_insert(idx);
            } else if h.contains("amount") {
                amount.get_or_insert(idx);
            } else if h.contains("account") {
                account.get_or_insert(idx);
            } else if h == "id" || h.contains("reference") || h.contains("transaction") {
                id.get_or_insert(idx);
            }
        }

        let defaults = Self::default();
        Some(Self {
            date_column: date.unwrap_or(defaults.date_column),
            payee_column: payee.unwrap_or(defaults.payee_column),
            amount_column: amount.unwrap_or(defaults.amount_column),
            account_column: account,
            id_column: id,
        })
    }
}

/// Transactions read from a file plus the rows that were skipped
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub transactions: Vec<Transaction>,
    /// Skipped rows by 1-based data row number
    pub errors: Vec<(usize, String)>,
}

impl ImportReport {
    fn push(&mut self, row: usize, result: Result<Transaction, String>) {
        match result {
            Ok(txn) => self.transactions.push(txn),
            Err(reason) => {
                warn!(row, %reason, "Skipping transaction row");
                self.errors.push((row, reason));
            }
        }
    }
}

/// JSON transaction shape accepted on import
#[derive(Debug, Deserialize)]
struct TransactionRow {
    #[serde(default)]
    id: Option<String>,
    payee: String,
    amount: AmountField,
    date: String,
    #[serde(default, alias = "account")]
    account_id: Option<String>,
    /// Category already assigned by the source
    #[serde(default, alias = "category")]
    category_id: Option<String>,
}

/// Amounts may be written as `-42.50` or `"-$42.50"`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AmountField {
    Number(f64),
    Text(String),
}

impl AmountField {
    fn to_money(&self) -> Result<Money, String> {
        match self {
            AmountField::Number(n) if n.is_finite() => Ok(Money::from_cents((n * 100.0).round() as i64)),
            AmountField::Number(n) => Err(format!("Invalid amount: {}", n)),
            AmountField::Text(s) => parse_amount(s),
        }
    }
}

/// Service for loading transactions
pub struct TransactionImporter;

impl TransactionImporter {
    /// Load transactions from a `.csv` or `.json` file
    pub fn from_path(path: impl AsRef<Path>) -> CategorizeResult<ImportReport> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            CategorizeError::Import(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let report = if is_json {
            let mut text = String::new();
            std::io::BufReader::new(file).read_to_string(&mut text)?;
            Self::parse_json(&text)?
        } else {
            Self::parse_csv(file)?
        };

        debug!(
            path = %path.display(),
            imported = report.transactions.len(),
            skipped = report.errors.len(),
            "Loaded transactions"
        );
        Ok(report)
    }

    /// Parse CSV data, detecting a header row if present
    pub fn parse_csv<R: Read>(reader: R) -> CategorizeResult<ImportReport> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut report = ImportReport::default();
        let mut mapping = None;
        let mut row = 0;

        for record in reader.records() {
            let record =
                record.map_err(|e| CategorizeError::Import(format!("Error reading CSV record: {}", e)))?;

            if mapping.is_none() {
                if let Some(detected) = ColumnMapping::from_headers(&record) {
                    mapping = Some(detected);
                    continue;
                }
            }
            let mapping = mapping.get_or_insert_with(ColumnMapping::default);

            row += 1;
            report.push(row, parse_record(&record, row, mapping));
        }

        Ok(report)
    }

    /// Parse a JSON list of transactions
    pub fn parse_json(text: &str) -> CategorizeResult<ImportReport> {
        let rows: Vec<TransactionRow> = serde_json::from_str(text)
            .map_err(|e| CategorizeError::Import(format!("Invalid transaction JSON: {}", e)))?;

        let mut report = ImportReport::default();
        for (idx, entry) in rows.into_iter().enumerate() {
            let row = idx + 1;
            let result = (|| {
                let date = parse_date(&entry.date)?;
                let amount = entry.amount.to_money()?;
                let mut txn =
                    build_transaction(row, entry.id, &entry.payee, amount, date, entry.account_id)?;
                txn.category_id = entry
                    .category_id
                    .filter(|c| !c.trim().is_empty())
                    .map(CategoryId::from);
                Ok(txn)
            })();
            report.push(row, result);
        }

        Ok(report)
    }
}

fn parse_record(
    record: &StringRecord,
    row: usize,
    mapping: &ColumnMapping,
) -> Result<Transaction, String> {
    let field = |col: usize, name: &str| {
        record
            .get(col)
            .map(str::trim)
            .ok_or_else(|| format!("Missing {} column", name))
    };
    let optional = |col: Option<usize>| {
        col.and_then(|c| record.get(c))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let date = parse_date(field(mapping.date_column, "date")?)?;
    let payee = field(mapping.payee_column, "payee")?;
    let amount = parse_amount(field(mapping.amount_column, "amount")?)?;

    build_transaction(
        row,
        optional(mapping.id_column),
        payee,
        amount,
        date,
        optional(mapping.account_column),
    )
}

fn build_transaction(
    row: usize,
    id: Option<String>,
    payee: &str,
    amount: Money,
    date: NaiveDate,
    account: Option<String>,
) -> Result<Transaction, String> {
    let payee = payee.trim();
    if payee.is_empty() {
        return Err("Payee cannot be empty".to_string());
    }

    let id = match id.filter(|s| !s.trim().is_empty()) {
        Some(id) => TransactionId::from(id.trim()),
        None => generate_import_id(row, date, amount, payee),
    };

    let txn = Transaction::new(id, payee, amount, date);
    Ok(match account {
        Some(account) => txn.with_account(account),
        None => txn,
    })
}

/// Stable id for rows that don't carry one
fn generate_import_id(row: usize, date: NaiveDate, amount: Money, payee: &str) -> TransactionId {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    row.hash(&mut hasher);
    date.hash(&mut hasher);
    amount.cents().hash(&mut hasher);
    payee.hash(&mut hasher);
    TransactionId::from(format!("imp-{:016x}", hasher.finish()))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .ok_or_else(|| format!("Could not parse date: '{}'", s))
}

fn parse_amount(s: &str) -> Result<Money, String> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    // Accounting style: (42.50) is an outflow, with or without its own sign
    let cleaned = match cleaned.strip_prefix('(').and_then(|c| c.strip_suffix(')')) {
        Some(inner) => format!("-{}", inner.strip_prefix('-').unwrap_or(inner)),
        None => cleaned,
    };
    Money::parse(&cleaned).map_err(|e| format!("Invalid amount '{}': {}", s, e))
}
