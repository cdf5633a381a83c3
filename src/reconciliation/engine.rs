//! Suggestion ranking over the unmatched bank/book cartesian product

use std::cmp::Ordering;

use crate::config::AutoMatchOptions;
use crate::reconciliation::scoring::calculate_match_score;
use crate::types::*;

/// Score every unmatched (bank, book) pair and return those reaching the
/// suggestion threshold, highest confidence first.
///
/// The sort is stable: equal confidences keep bank-transaction order, then
/// book-entry order, as supplied by the caller.
pub fn find_matches(
    bank_transactions: &[BankTransaction],
    book_entries: &[BookEntry],
    options: &AutoMatchOptions,
) -> Vec<MatchSuggestion> {
    let unmatched_bank: Vec<&BankTransaction> =
        bank_transactions.iter().filter(|t| !t.matched).collect();
    let unmatched_book: Vec<&BookEntry> = book_entries.iter().filter(|e| !e.matched).collect();

    let mut suggestions = Vec::new();
    for bank_tx in &unmatched_bank {
        for book_entry in &unmatched_book {
            let score = calculate_match_score(bank_tx, book_entry, options);
            if score.is_suggestion() {
                let reason = score.reason();
                suggestions.push(MatchSuggestion {
                    bank_transaction: (*bank_tx).clone(),
                    book_entry: (*book_entry).clone(),
                    confidence: score.confidence,
                    factors: score.factors,
                    reason,
                    rule_id: None,
                });
            }
        }
    }

    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    tracing::debug!(
        bank = unmatched_bank.len(),
        book = unmatched_book.len(),
        suggestions = suggestions.len(),
        "scored reconciliation candidates"
    );

    suggestions
}

/// Matching engine bound to one set of options
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    options: AutoMatchOptions,
}

impl ReconciliationEngine {
    pub fn new(options: AutoMatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AutoMatchOptions {
        &self.options
    }

    pub fn find_matches(
        &self,
        bank_transactions: &[BankTransaction],
        book_entries: &[BookEntry],
    ) -> Vec<MatchSuggestion> {
        find_matches(bank_transactions, book_entries, &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bank(id: &str, amount: i64, d: u32, reference: &str) -> BankTransaction {
        BankTransaction::new(
            id.to_string(),
            "acc".to_string(),
            day(d),
            BigDecimal::from(amount),
            "Virement client".to_string(),
            reference.to_string(),
        )
    }

    fn book(id: &str, amount: i64, d: u32, reference: &str) -> BookEntry {
        BookEntry::debit(
            id.to_string(),
            "acc".to_string(),
            day(d),
            "Virement client".to_string(),
            BigDecimal::from(amount),
            reference.to_string(),
        )
    }

    fn options() -> AutoMatchOptions {
        AutoMatchOptions::default()
    }

    #[test]
    fn test_empty_inputs_give_no_suggestions() {
        assert!(find_matches(&[], &[], &options()).is_empty());
        assert!(find_matches(&[bank("b1", 100, 15, "R")], &[], &options()).is_empty());
    }

    #[test]
    fn test_orders_by_confidence_descending() {
        // Against b1 (1000, day 15, ref R1):
        //   k1: exact amount, 2 days off, reference, description -> 0.80
        //   k2: everything identical                              -> 1.00
        //   k3: exact amount, 2 days off, no reference, desc      -> 0.60 (dropped)
        //   k4: exact amount, exact date, no reference, desc      -> 0.80
        let bank_txs = vec![bank("b1", 1000, 15, "R1")];
        let entries = vec![
            book("k1", 1000, 17, "R1"),
            book("k2", 1000, 15, "R1"),
            book("k3", 1000, 17, "XX"),
            book("k4", 1000, 15, "YY"),
        ];

        let suggestions = find_matches(&bank_txs, &entries, &options());
        let ids: Vec<&str> = suggestions.iter().map(|s| s.book_entry.id.as_str()).collect();
        let scores: Vec<f64> = suggestions.iter().map(|s| s.confidence).collect();

        assert_eq!(ids, vec!["k2", "k1", "k4"]);
        assert_eq!(scores, vec![1.0, 0.8, 0.8]);
    }

    #[test]
    fn test_ties_keep_cartesian_order() {
        let bank_txs = vec![bank("b1", 1000, 15, "R"), bank("b2", 1000, 15, "R")];
        let entries = vec![book("k1", 1000, 15, "R"), book("k2", 1000, 15, "R")];

        let pairs: Vec<(String, String)> = find_matches(&bank_txs, &entries, &options())
            .into_iter()
            .map(|s| (s.bank_transaction.id, s.book_entry.id))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("b1".to_string(), "k1".to_string()),
                ("b1".to_string(), "k2".to_string()),
                ("b2".to_string(), "k1".to_string()),
                ("b2".to_string(), "k2".to_string()),
            ]
        );
    }

    #[test]
    fn test_matched_records_are_skipped() {
        let mut matched_bank = bank("b1", 1000, 15, "R");
        matched_bank.matched = true;
        matched_bank.matched_with = Some("k9".to_string());

        let suggestions = find_matches(
            &[matched_bank, bank("b2", 1000, 15, "R")],
            &[book("k1", 1000, 15, "R")],
            &options(),
        );

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].bank_transaction.id, "b2");
    }

    #[test]
    fn test_never_returns_below_threshold() {
        let bank_txs: Vec<BankTransaction> = (1..=5)
            .map(|i| bank(&format!("b{i}"), 1000 * i as i64, 10 + i, "REF"))
            .collect();
        let entries: Vec<BookEntry> = (1..=5)
            .map(|i| book(&format!("k{i}"), 1000 * i as i64 + 5, 11 + i, "OTHER"))
            .collect();

        for suggestion in find_matches(&bank_txs, &entries, &options()) {
            assert!(suggestion.confidence >= 0.7);
            assert!(suggestion.confidence <= 1.0);
        }
    }

    #[test]
    fn test_engine_uses_its_options() {
        let engine = ReconciliationEngine::new(AutoMatchOptions {
            reference_match: false,
            ..AutoMatchOptions::default()
        });
        // Without the reference, 2 days apart: 0.40 + 0.10 + 0.10 = 0.60
        let suggestions = engine.find_matches(&[bank("b1", 1000, 15, "R")], &[book("k1", 1000, 17, "R")]);
        assert!(suggestions.is_empty());
        assert!(!engine.options().reference_match);
    }
}
