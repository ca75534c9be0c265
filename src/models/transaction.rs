//! Transaction model
//!
//! Transactions are supplied by an external source and are read-only to the
//! categorization engine; only a categorization outcome is attached to them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, CategoryId, TransactionId};
use super::money::Money;

/// A financial transaction awaiting categorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique identifier from the transaction source
    pub id: TransactionId,

    /// Payee text as reported by the bank
    pub payee: String,

    /// Signed amount (negative for expenses)
    pub amount: Money,

    /// Transaction date
    pub date: NaiveDate,

    /// Account the transaction was posted to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,

    /// Category already assigned by the source, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
}

impl Transaction {
    /// Create a new uncategorized transaction
    pub fn new(
        id: impl Into<TransactionId>,
        payee: impl Into<String>,
        amount: Money,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            payee: payee.into(),
            amount,
            date,
            account_id: None,
            category_id: None,
        }
    }

    /// Builder-style setter for the account
    pub fn with_account(mut self, account_id: impl Into<AccountId>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Check if the source already assigned a category
    pub fn is_categorized(&self) -> bool {
        self.category_id.is_some()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.date.format("%Y-%m-%d"),
            self.payee,
            self.amount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_new_transaction() {
        let txn = Transaction::new("501", "WOOLWORTHS EPPING", Money::from_cents(-5000), date());
        assert_eq!(txn.id.as_str(), "501");
        assert!(txn.amount.is_negative());
        assert!(!txn.is_categorized());
        assert!(txn.account_id.is_none());
    }

    #[test]
    fn test_with_account() {
        let txn = Transaction::new("1", "SHELL", Money::from_cents(-4000), date()).with_account("chk");
        assert_eq!(txn.account_id, Some(AccountId::from("chk")));
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{"id":"77","payee":"NETFLIX.COM","amount":-1599,"date":"2025-03-14"}"#;
        let txn: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(txn.amount.cents(), -1599);
        assert_eq!(txn.date, date());
        assert!(txn.category_id.is_none());
    }

    #[test]
    fn test_display() {
        let txn = Transaction::new("1", "SHELL", Money::from_cents(-4000), date());
        assert_eq!(txn.to_string(), "2025-03-14 SHELL -$40.00");
    }
}
