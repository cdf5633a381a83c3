//! Validation and parsing utilities

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::str::FromStr;

use crate::traits::*;
use crate::types::*;

/// Parse a statement date: `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.f]` or RFC 3339.
///
/// Date-only values land at midnight; RFC 3339 values are converted to UTC.
pub fn parse_date(value: &str) -> ReconciliationResult<NaiveDateTime> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::default()));
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(datetime);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.naive_utc());
    }

    Err(ReconciliationError::InvalidInput(format!(
        "Cannot parse date '{value}'"
    )))
}

/// Parse a decimal amount such as `1000000`, `-250000.50` or `1 000 000`.
pub fn parse_amount(value: &str) -> ReconciliationResult<BigDecimal> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ReconciliationError::InvalidInput(
            "Amount cannot be empty".to_string(),
        ));
    }

    BigDecimal::from_str(&compact).map_err(|_| {
        ReconciliationError::InvalidInput(format!("Cannot parse amount '{value}'"))
    })
}

/// Validate that a record ID is valid
pub fn validate_record_id(id: &str) -> ReconciliationResult<()> {
    if id.trim().is_empty() {
        return Err(ReconciliationError::InvalidInput(
            "Record ID cannot be empty".to_string(),
        ));
    }

    if id.len() > 64 {
        return Err(ReconciliationError::InvalidInput(
            "Record ID cannot exceed 64 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReconciliationError::InvalidInput(
            "Record ID can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that a label is present and of reasonable length
pub fn validate_description(description: &str) -> ReconciliationResult<()> {
    if description.trim().is_empty() {
        return Err(ReconciliationError::InvalidInput(
            "Description cannot be empty".to_string(),
        ));
    }

    if description.len() > 500 {
        return Err(ReconciliationError::InvalidInput(
            "Description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validator that also rejects zero amounts, negative book lines and
/// unusual IDs
pub struct StrictRecordValidator;

impl RecordValidator for StrictRecordValidator {
    fn validate_bank_transaction(&self, transaction: &BankTransaction) -> ReconciliationResult<()> {
        DefaultRecordValidator.validate_bank_transaction(transaction)?;

        validate_record_id(&transaction.id)?;
        validate_description(&transaction.description)?;

        if transaction.amount == BigDecimal::from(0) {
            return Err(ReconciliationError::InvalidInput(format!(
                "Bank transaction '{}' has a zero amount",
                transaction.id
            )));
        }

        Ok(())
    }

    fn validate_book_entry(&self, entry: &BookEntry) -> ReconciliationResult<()> {
        DefaultRecordValidator.validate_book_entry(entry)?;

        validate_record_id(&entry.id)?;
        validate_description(&entry.description)?;

        let zero = BigDecimal::from(0);
        if entry.debit < zero || entry.credit < zero {
            return Err(ReconciliationError::InvalidInput(format!(
                "Book entry '{}' cannot carry a negative debit or credit",
                entry.id
            )));
        }

        Ok(())
    }
}
