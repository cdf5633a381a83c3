//! Weighted multi-factor confidence score for a bank/book pair
//!
//! Components are added, then the total is capped at 1:
//!
//! | component   | weight                        |
//! |-------------|-------------------------------|
//! | amount      | 0.40 exact, 0.35 within 1%    |
//! | date        | 0.30, decaying to 0 at the tolerance |
//! | reference   | 0.20                          |
//! | description | 0.10 × similarity             |

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;

use crate::config::AutoMatchOptions;
use crate::reconciliation::similarity::{
    normalize_description, normalize_reference, string_similarity,
};
use crate::types::*;

/// Minimum confidence for a pair to be suggested
pub const MATCH_THRESHOLD: f64 = 0.7;

const EXACT_AMOUNT_WEIGHT: f64 = 0.40;
const CLOSE_AMOUNT_WEIGHT: f64 = 0.35;
const DATE_WEIGHT: f64 = 0.30;
const REFERENCE_WEIGHT: f64 = 0.20;
const DESCRIPTION_WEIGHT: f64 = 0.10;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

// Scores are kept to nine decimals so 0.4 + 0.2 + 0.1 compares equal to 0.7.
const SCORE_SCALE: f64 = 1e9;

/// Confidence of a pair together with the factors that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub confidence: f64,
    pub factors: Vec<MatchFactor>,
}

impl MatchScore {
    /// Comma-joined factor labels; empty when nothing fired
    pub fn reason(&self) -> String {
        self.factors
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_suggestion(&self) -> bool {
        self.confidence >= MATCH_THRESHOLD
    }
}

/// Score how likely `bank_tx` and `book_entry` record the same event.
pub fn calculate_match_score(
    bank_tx: &BankTransaction,
    book_entry: &BookEntry,
    options: &AutoMatchOptions,
) -> MatchScore {
    let mut score = 0.0;
    let mut factors = Vec::new();

    if let Some((weight, factor)) = amount_component(bank_tx, book_entry, options) {
        score += weight;
        factors.push(factor);
    }

    if let Some((weight, factor)) = date_component(bank_tx, book_entry, options) {
        score += weight;
        factors.push(factor);
    }

    if options.reference_match {
        let bank_ref = normalize_reference(&bank_tx.reference);
        if !bank_ref.is_empty() && bank_ref == normalize_reference(&book_entry.reference) {
            score += REFERENCE_WEIGHT;
            factors.push(MatchFactor::Reference);
        }
    }

    let similarity = string_similarity(
        &normalize_description(&bank_tx.description),
        &normalize_description(&book_entry.description),
    );
    if similarity >= options.description_similarity {
        score += DESCRIPTION_WEIGHT * similarity;
        factors.push(MatchFactor::Description { similarity });
    }

    let confidence: f64 = score.min(1.0);
    MatchScore {
        confidence: (confidence * SCORE_SCALE).round() / SCORE_SCALE,
        factors,
    }
}

/// Absolute distance between two timestamps in fractional days
pub(crate) fn days_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (a - b).num_milliseconds().unsigned_abs() as f64 / MILLIS_PER_DAY
}

fn amount_component(
    bank_tx: &BankTransaction,
    book_entry: &BookEntry,
    options: &AutoMatchOptions,
) -> Option<(f64, MatchFactor)> {
    let bank_amount = bank_tx.amount.abs();
    let book_amount = book_entry.amount();

    if options.exact_amount_match && bank_amount == book_amount {
        return Some((EXACT_AMOUNT_WEIGHT, MatchFactor::ExactAmount));
    }

    // |a - b| / max(a, b) < 1%, kept in decimal arithmetic. Two zero
    // amounts give 0 < 0 and never count as close.
    let largest = if bank_amount > book_amount {
        &bank_amount
    } else {
        &book_amount
    };
    let difference = (&bank_amount - &book_amount).abs();
    if difference * BigDecimal::from(100) < *largest {
        return Some((CLOSE_AMOUNT_WEIGHT, MatchFactor::CloseAmount));
    }

    None
}

fn date_component(
    bank_tx: &BankTransaction,
    book_entry: &BookEntry,
    options: &AutoMatchOptions,
) -> Option<(f64, MatchFactor)> {
    let days = days_between(bank_tx.date, book_entry.date);

    if days == 0.0 {
        return Some((DATE_WEIGHT, MatchFactor::ExactDate));
    }

    let tolerance = options.date_tolerance_days as f64;
    if options.date_tolerance_days > 0 && days <= tolerance {
        let weight = DATE_WEIGHT * (1.0 - days / tolerance);
        return Some((weight, MatchFactor::CloseDate { days }));
    }

    None
}
