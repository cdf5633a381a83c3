//! User-defined matching rules
//!
//! A rule replaces the weighted score with hard conditions on a pair. Active
//! rules are tried highest priority first, and the first rule a pair
//! satisfies claims both of its records for the rest of the run.
//!
//! ```toml
//! [[rules]]
//! id = "loyer"
//! name = "Loyer mensuel"
//! priority = 10
//! auto_apply = true
//!
//! [rules.conditions]
//! amount_match = "exact"
//! date_match = "range"
//! date_range = 5
//! reference_match = true
//! ```

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::AutoMatchOptions;
use crate::reconciliation::scoring::{calculate_match_score, days_between};
use crate::reconciliation::similarity::{
    normalize_description, normalize_reference, string_similarity,
};
use crate::types::*;

/// How a rule compares amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountCondition {
    #[default]
    Exact,
    /// Absolute difference at most `amount_tolerance`
    Tolerance,
}

/// How a rule compares dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateCondition {
    #[default]
    Exact,
    /// At most `date_range` days apart
    Range,
}

/// Conditions a pair must meet, all of them, for a rule to fire
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    pub amount_match: AmountCondition,
    pub amount_tolerance: Option<BigDecimal>,
    pub date_match: DateCondition,
    pub date_range: Option<u32>,
    /// Require identical, non-empty normalized references
    pub reference_match: bool,
    /// Minimum normalized description similarity
    pub description_similarity: Option<f64>,
}

/// A named set of conditions that pairs records without scoring them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conditions: RuleConditions,
    /// Higher runs first
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Apply matches as pending instead of only suggesting them
    #[serde(default)]
    pub auto_apply: bool,
}

fn default_active() -> bool {
    true
}

impl MatchRule {
    pub fn validate(&self) -> ReconciliationResult<()> {
        if self.id.trim().is_empty() {
            return Err(ReconciliationError::Config(format!(
                "Rule '{}' has an empty id",
                self.name
            )));
        }

        let conditions = &self.conditions;
        if conditions.amount_match == AmountCondition::Tolerance {
            match &conditions.amount_tolerance {
                Some(tolerance) if *tolerance >= BigDecimal::from(0) => {}
                _ => {
                    return Err(ReconciliationError::Config(format!(
                        "Rule '{}' needs a non-negative amount_tolerance",
                        self.id
                    )))
                }
            }
        }
        if conditions.date_match == DateCondition::Range && conditions.date_range.is_none() {
            return Err(ReconciliationError::Config(format!(
                "Rule '{}' needs a date_range",
                self.id
            )));
        }
        if let Some(similarity) = conditions.description_similarity {
            if !(0.0..=1.0).contains(&similarity) {
                return Err(ReconciliationError::Config(format!(
                    "Rule '{}' description_similarity must be within [0, 1], got {similarity}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Whether the pair meets every condition of the rule
    pub fn matches(&self, bank_tx: &BankTransaction, book_entry: &BookEntry) -> bool {
        let conditions = &self.conditions;

        let bank_amount = bank_tx.amount.abs();
        let book_amount = book_entry.amount();
        let amount_ok = match conditions.amount_match {
            AmountCondition::Exact => bank_amount == book_amount,
            AmountCondition::Tolerance => match &conditions.amount_tolerance {
                Some(tolerance) => (&bank_amount - &book_amount).abs() <= *tolerance,
                None => false,
            },
        };
        if !amount_ok {
            return false;
        }

        let days = days_between(bank_tx.date, book_entry.date);
        let date_ok = match conditions.date_match {
            DateCondition::Exact => days == 0.0,
            DateCondition::Range => days <= conditions.date_range.unwrap_or(0) as f64,
        };
        if !date_ok {
            return false;
        }

        if conditions.reference_match {
            let bank_ref = normalize_reference(&bank_tx.reference);
            if bank_ref.is_empty() || bank_ref != normalize_reference(&book_entry.reference) {
                return false;
            }
        }

        if let Some(minimum) = conditions.description_similarity {
            let similarity = string_similarity(
                &normalize_description(&bank_tx.description),
                &normalize_description(&book_entry.description),
            );
            if similarity < minimum {
                return false;
            }
        }

        true
    }
}

/// Pair proposed by a rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub suggestion: MatchSuggestion,
    pub auto_apply: bool,
}

/// Active rules ordered by descending priority
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<MatchRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<MatchRule>) -> Self {
        let mut rules: Vec<MatchRule> = rules.into_iter().filter(|r| r.active).collect();
        // Highest priority first; equal priorities keep their configured order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find_matching_rule(
        &self,
        bank_tx: &BankTransaction,
        book_entry: &BookEntry,
    ) -> Option<&MatchRule> {
        self.rules.iter().find(|r| r.matches(bank_tx, book_entry))
    }

    /// Pair unmatched records rule by rule, each record at most once.
    ///
    /// Confidence and factors still come from the weighted score so rule
    /// matches can be compared with scored ones; the reason names the rule.
    pub fn apply_rules(
        &self,
        bank_transactions: &[BankTransaction],
        book_entries: &[BookEntry],
        options: &AutoMatchOptions,
    ) -> Vec<RuleMatch> {
        let mut taken_bank: HashSet<&str> = HashSet::new();
        let mut taken_book: HashSet<&str> = HashSet::new();
        let mut found = Vec::new();

        for rule in &self.rules {
            for bank_tx in bank_transactions.iter().filter(|t| !t.matched) {
                if taken_bank.contains(bank_tx.id.as_str()) {
                    continue;
                }
                let partner = book_entries.iter().find(|e| {
                    !e.matched && !taken_book.contains(e.id.as_str()) && rule.matches(bank_tx, e)
                });
                let Some(book_entry) = partner else {
                    continue;
                };

                taken_bank.insert(bank_tx.id.as_str());
                taken_book.insert(book_entry.id.as_str());

                let score = calculate_match_score(bank_tx, book_entry, options);
                let reason = if score.factors.is_empty() {
                    format!("Règle « {} »", rule.name)
                } else {
                    format!("Règle « {} » : {}", rule.name, score.reason())
                };
                found.push(RuleMatch {
                    suggestion: MatchSuggestion {
                        bank_transaction: bank_tx.clone(),
                        book_entry: book_entry.clone(),
                        confidence: score.confidence,
                        factors: score.factors,
                        reason,
                        rule_id: Some(rule.id.clone()),
                    },
                    auto_apply: rule.auto_apply,
                });
            }
        }

        tracing::debug!(
            rules = self.rules.len(),
            matched = found.len(),
            "applied matching rules"
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bank(id: &str, amount: i64, d: u32, description: &str, reference: &str) -> BankTransaction {
        BankTransaction::new(
            id.to_string(),
            "acc".to_string(),
            NaiveDate::from_ymd_opt(2024, 2, d).unwrap(),
            BigDecimal::from(amount),
            description.to_string(),
            reference.to_string(),
        )
    }

    fn book(id: &str, amount: i64, d: u32, description: &str, reference: &str) -> BookEntry {
        BookEntry::credit(
            id.to_string(),
            "acc".to_string(),
            NaiveDate::from_ymd_opt(2024, 2, d).unwrap(),
            description.to_string(),
            BigDecimal::from(amount),
            reference.to_string(),
        )
    }

    fn rule(id: &str, priority: i32, conditions: RuleConditions) -> MatchRule {
        MatchRule {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            conditions,
            priority,
            active: true,
            auto_apply: false,
        }
    }

    #[test]
    fn test_tolerance_and_range_conditions() {
        let fees = rule(
            "frais",
            1,
            RuleConditions {
                amount_match: AmountCondition::Tolerance,
                amount_tolerance: Some(BigDecimal::from(50)),
                date_match: DateCondition::Range,
                date_range: Some(5),
                ..RuleConditions::default()
            },
        );

        let tx = bank("b1", -1_000, 10, "Commission", "");
        assert!(fees.matches(&tx, &book("k1", 1_050, 15, "Frais", "")));
        assert!(!fees.matches(&tx, &book("k2", 1_051, 15, "Frais", "")));
        assert!(!fees.matches(&tx, &book("k3", 1_000, 16, "Frais", "")));
    }

    #[test]
    fn test_reference_and_description_conditions() {
        let strict = rule(
            "strict",
            1,
            RuleConditions {
                reference_match: true,
                description_similarity: Some(0.9),
                ..RuleConditions::default()
            },
        );

        let tx = bank("b1", 500, 3, "Loyer fevrier", "LOY-02");
        assert!(strict.matches(&tx, &book("k1", 500, 3, "LOYER FEVRIER", "loy 02")));
        assert!(!strict.matches(&tx, &book("k2", 500, 3, "Loyer fevrier", "LOY-03")));
        assert!(!strict.matches(&tx, &book("k3", 500, 3, "Electricite", "LOY-02")));

        let empty_refs = bank("b2", 500, 3, "Loyer fevrier", "");
        assert!(!strict.matches(&empty_refs, &book("k4", 500, 3, "Loyer fevrier", "")));
    }

    #[test]
    fn test_priority_order_and_single_use() {
        let loose = rule(
            "loose",
            1,
            RuleConditions {
                date_match: DateCondition::Range,
                date_range: Some(10),
                ..RuleConditions::default()
            },
        );
        let exact = rule("exact", 5, RuleConditions::default());
        let mut inactive = rule("inactive", 99, RuleConditions::default());
        inactive.active = false;

        let engine = RuleEngine::new(vec![loose, exact, inactive]);
        let bank_txs = vec![bank("b1", 100, 5, "A", ""), bank("b2", 100, 8, "B", "")];
        let entries = vec![book("k1", 100, 8, "B", ""), book("k2", 100, 5, "A", "")];

        let found = engine.apply_rules(&bank_txs, &entries, &AutoMatchOptions::default());
        let pairs: Vec<(&str, &str, Option<&str>)> = found
            .iter()
            .map(|m| {
                (
                    m.suggestion.bank_transaction.id.as_str(),
                    m.suggestion.book_entry.id.as_str(),
                    m.suggestion.rule_id.as_deref(),
                )
            })
            .collect();

        // The exact-date rule runs first and claims both same-day pairs.
        assert_eq!(
            pairs,
            vec![("b1", "k2", Some("exact")), ("b2", "k1", Some("exact"))]
        );
        assert!(found[0].suggestion.reason.starts_with("Règle « exact » : Montant identique"));
        assert_eq!(
            engine.find_matching_rule(&bank_txs[0], &entries[0]).map(|r| r.id.as_str()),
            Some("loose")
        );
    }

    #[test]
    fn test_validate_rejects_incomplete_rules() {
        let tolerance_without_value = rule(
            "r1",
            0,
            RuleConditions {
                amount_match: AmountCondition::Tolerance,
                ..RuleConditions::default()
            },
        );
        assert!(tolerance_without_value.validate().is_err());

        let range_without_days = rule(
            "r2",
            0,
            RuleConditions {
                date_match: DateCondition::Range,
                ..RuleConditions::default()
            },
        );
        assert!(range_without_days.validate().is_err());
        assert!(rule("r3", 0, RuleConditions::default()).validate().is_ok());
    }
}
