//! Merchant matcher
//!
//! Evaluates a single rule against a single transaction. Checks run in a
//! fixed order and stop at the first failure: payee pattern, exclusions,
//! amount range, account allow-list.

use crate::models::{Rule, Transaction};

/// Stateless rule evaluator
pub struct MerchantMatcher;

impl MerchantMatcher {
    /// Check whether `rule` applies to `txn`
    pub fn matches(rule: &Rule, txn: &Transaction) -> bool {
        if !Self::matches_payee(rule, &txn.payee) {
            return false;
        }

        if rule.amount_min().is_some() || rule.amount_max().is_some() {
            let amount = txn.amount.abs();
            if let Some(min) = rule.amount_min() {
                if amount < min {
                    return false;
                }
            }
            if let Some(max) = rule.amount_max() {
                if amount > max {
                    return false;
                }
            }
        }

        if let Some(accounts) = rule.account_ids() {
            match &txn.account_id {
                Some(account) if accounts.contains(account) => {}
                _ => return false,
            }
        }

        true
    }

    /// Pattern and exclusion checks only
    pub fn matches_payee(rule: &Rule, payee: &str) -> bool {
        // Patterns are compiled anchored at the start of the payee
        rule.compiled_pattern().is_match(payee)
            && !rule
                .compiled_exclusions()
                .iter()
                .any(|exclusion| exclusion.is_match(payee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, Money, RuleRecord};
    use chrono::NaiveDate;

    fn txn(payee: &str, cents: i64) -> Transaction {
        Transaction::new(
            "t1",
            payee,
            Money::from_cents(cents),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        )
    }

    #[test]
    fn test_prefix_match() {
        let rule = RuleRecord::new("Woolworths", "WOOLWORTHS.*").build().unwrap();
        assert!(MerchantMatcher::matches(&rule, &txn("WOOLWORTHS EPPING", -5000)));
        assert!(MerchantMatcher::matches(&rule, &txn("WOOLWORTHS", -5000)));
        // Anchored at the start, not a substring search
        assert!(!MerchantMatcher::matches(&rule, &txn("PAYPAL *WOOLWORTHS", -5000)));
    }

    #[test]
    fn test_prefix_does_not_require_full_match() {
        let rule = RuleRecord::new("Shell", "SHELL").build().unwrap();
        assert!(MerchantMatcher::matches(&rule, &txn("SHELL COLES EXPRESS 1234", -4000)));
    }

    #[test]
    fn test_case_sensitive() {
        let rule = RuleRecord::new("Woolworths", "WOOLWORTHS").build().unwrap();
        assert!(!MerchantMatcher::matches(&rule, &txn("Woolworths Epping", -5000)));

        let insensitive = RuleRecord::new("Woolworths", "(?i)woolworths").build().unwrap();
        assert!(MerchantMatcher::matches(&insensitive, &txn("Woolworths Epping", -5000)));
    }

    #[test]
    fn test_exclusion_overrides_match() {
        let rule = RuleRecord::new("Amazon", "AMAZON")
            .exclude("AMAZON PRIME")
            .build()
            .unwrap();
        assert!(MerchantMatcher::matches(&rule, &txn("AMAZON MKTPLACE", -2000)));
        assert!(!MerchantMatcher::matches(&rule, &txn("AMAZON PRIME VIDEO", -999)));
    }

    #[test]
    fn test_exclusion_is_prefix_anchored() {
        let rule = RuleRecord::new("Amazon", "AMAZON").exclude("PRIME").build().unwrap();
        assert!(MerchantMatcher::matches(&rule, &txn("AMAZON PRIME VIDEO", -999)));
    }

    #[test]
    fn test_amount_range_inclusive_on_absolute_value() {
        let rule = RuleRecord::new("Small", "CAFE")
            .amount_range(Some(Money::from_cents(500)), Some(Money::from_cents(2000)))
            .build()
            .unwrap();

        assert!(MerchantMatcher::matches(&rule, &txn("CAFE", -500)));
        assert!(MerchantMatcher::matches(&rule, &txn("CAFE", -2000)));
        assert!(MerchantMatcher::matches(&rule, &txn("CAFE", 1000)));
        assert!(!MerchantMatcher::matches(&rule, &txn("CAFE", -499)));
        assert!(!MerchantMatcher::matches(&rule, &txn("CAFE", -2001)));
    }

    #[test]
    fn test_open_ended_amount_range() {
        let rule = RuleRecord::new("Big", "RENT")
            .amount_range(Some(Money::from_cents(100_000)), None)
            .build()
            .unwrap();
        assert!(MerchantMatcher::matches(&rule, &txn("RENT", -250_000)));
        assert!(!MerchantMatcher::matches(&rule, &txn("RENT", -99_999)));
    }

    #[test]
    fn test_account_allow_list() {
        let rule = RuleRecord::new("Card only", "UBER")
            .accounts(vec![AccountId::from("credit")])
            .build()
            .unwrap();

        assert!(MerchantMatcher::matches(&rule, &txn("UBER TRIP", -1500).with_account("credit")));
        assert!(!MerchantMatcher::matches(&rule, &txn("UBER TRIP", -1500).with_account("chk")));
        assert!(!MerchantMatcher::matches(&rule, &txn("UBER TRIP", -1500)));
    }

    #[test]
    fn test_matches_is_pure() {
        let rule = RuleRecord::new("Woolworths", "WOOLWORTHS.*").build().unwrap();
        let t = txn("WOOLWORTHS EPPING", -5000);
        let first = MerchantMatcher::matches(&rule, &t);
        for _ in 0..10 {
            assert_eq!(MerchantMatcher::matches(&rule, &t), first);
        }
    }
}
