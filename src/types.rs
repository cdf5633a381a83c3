//! Core types and data structures for bank reconciliation

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A line item from an imported bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Bank account the statement belongs to
    pub account_id: String,
    /// Booking date (and time, when the statement carries one)
    pub date: NaiveDateTime,
    /// Signed amount in transaction-currency units
    pub amount: BigDecimal,
    /// Free-text label from the statement
    pub description: String,
    /// Bank-assigned reference (transfer number, cheque number, ...)
    pub reference: String,
    /// Whether the transaction takes part in an active match
    pub matched: bool,
    /// Id of the paired book entry, present iff `matched`
    pub matched_with: Option<String>,
    /// When the current match was made
    pub matched_date: Option<NaiveDateTime>,
    /// Who made the current match
    pub matched_by: Option<String>,
}

impl BankTransaction {
    /// Create a new, unmatched bank transaction dated at midnight of `date`
    pub fn new(
        id: String,
        account_id: String,
        date: NaiveDate,
        amount: BigDecimal,
        description: String,
        reference: String,
    ) -> Self {
        Self {
            id,
            account_id,
            date: date.and_time(chrono::NaiveTime::default()),
            amount,
            description,
            reference,
            matched: false,
            matched_with: None,
            matched_date: None,
            matched_by: None,
        }
    }

    pub(crate) fn mark_matched(&mut self, book_entry_id: &str, at: NaiveDateTime, by: &str) {
        self.matched = true;
        self.matched_with = Some(book_entry_id.to_string());
        self.matched_date = Some(at);
        self.matched_by = Some(by.to_string());
    }

    pub(crate) fn clear_match(&mut self) {
        self.matched = false;
        self.matched_with = None;
        self.matched_date = None;
        self.matched_by = None;
    }
}

/// Ledger-side accounting record (one debit or credit line on the bank account)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    /// Unique identifier for the entry
    pub id: String,
    /// Ledger account the entry is posted to (e.g. 521 Banques)
    pub account_id: String,
    /// Posting date
    pub date: NaiveDateTime,
    /// Entry label
    pub description: String,
    /// Debit amount (zero for a credit line)
    pub debit: BigDecimal,
    /// Credit amount (zero for a debit line)
    pub credit: BigDecimal,
    /// Document reference (invoice number, voucher number, ...)
    pub reference: String,
    /// Whether the entry takes part in an active match
    pub matched: bool,
    /// Id of the paired bank transaction, present iff `matched`
    pub matched_with: Option<String>,
    /// When the current match was made
    pub matched_date: Option<NaiveDateTime>,
    /// Who made the current match
    pub matched_by: Option<String>,
}

impl BookEntry {
    /// Create a new, unmatched book entry dated at midnight of `date`
    pub fn new(
        id: String,
        account_id: String,
        date: NaiveDate,
        description: String,
        debit: BigDecimal,
        credit: BigDecimal,
        reference: String,
    ) -> Self {
        Self {
            id,
            account_id,
            date: date.and_time(chrono::NaiveTime::default()),
            description,
            debit,
            credit,
            reference,
            matched: false,
            matched_with: None,
            matched_date: None,
            matched_by: None,
        }
    }

    /// Create a debit entry
    pub fn debit(
        id: String,
        account_id: String,
        date: NaiveDate,
        description: String,
        amount: BigDecimal,
        reference: String,
    ) -> Self {
        Self::new(id, account_id, date, description, amount, BigDecimal::from(0), reference)
    }

    /// Create a credit entry
    pub fn credit(
        id: String,
        account_id: String,
        date: NaiveDate,
        description: String,
        amount: BigDecimal,
        reference: String,
    ) -> Self {
        Self::new(id, account_id, date, description, BigDecimal::from(0), amount, reference)
    }

    /// Magnitude of the entry: the debit if it is non-zero, the credit otherwise
    pub fn amount(&self) -> BigDecimal {
        if self.debit != BigDecimal::from(0) {
            self.debit.abs()
        } else {
            self.credit.abs()
        }
    }

    /// Signed effect on the bank account balance (debit increases it)
    pub fn net_amount(&self) -> BigDecimal {
        &self.debit - &self.credit
    }

    pub(crate) fn mark_matched(&mut self, bank_transaction_id: &str, at: NaiveDateTime, by: &str) {
        self.matched = true;
        self.matched_with = Some(bank_transaction_id.to_string());
        self.matched_date = Some(at);
        self.matched_by = Some(by.to_string());
    }

    pub(crate) fn clear_match(&mut self) {
        self.matched = false;
        self.matched_with = None;
        self.matched_date = None;
        self.matched_by = None;
    }
}

/// How a match came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Paired by a user
    Manual,
    /// Accepted from the scoring engine
    Auto,
    /// Applied by a matching rule
    Rule,
}

/// Lifecycle state of a persisted match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Applied automatically, awaiting review
    Pending,
    /// Reviewed and accepted
    Confirmed,
    /// Reviewed and refused; the records are free again
    Rejected,
}

impl MatchStatus {
    /// Pending and confirmed matches hold both records
    pub fn is_active(&self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Confirmed)
    }
}

/// Persisted record of a bank transaction paired with a book entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationMatch {
    pub id: String,
    pub bank_transaction_id: String,
    pub book_entry_id: String,
    pub match_type: MatchType,
    /// Score in [0, 1]; manual pairings carry 1.0
    pub confidence: f64,
    pub reason: String,
    pub matched_date: NaiveDateTime,
    pub matched_by: String,
    pub rule_id: Option<String>,
    pub status: MatchStatus,
}

impl ReconciliationMatch {
    /// Create a match with a fresh id, stamped now
    pub fn new(
        bank_transaction_id: String,
        book_entry_id: String,
        match_type: MatchType,
        confidence: f64,
        reason: String,
        matched_by: String,
        status: MatchStatus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bank_transaction_id,
            book_entry_id,
            match_type,
            confidence,
            reason,
            matched_date: chrono::Utc::now().naive_utc(),
            matched_by,
            rule_id: None,
            status,
        }
    }
}

/// One contributing factor of a match score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchFactor {
    /// Amounts are equal (exact amount matching enabled)
    ExactAmount,
    /// Amounts are within 1% of each other
    CloseAmount,
    /// Dates coincide
    ExactDate,
    /// Dates are `days` apart, inside the tolerance window
    CloseDate { days: f64 },
    /// Normalized references are identical
    Reference,
    /// Normalized descriptions are `similarity` alike
    Description { similarity: f64 },
}

impl fmt::Display for MatchFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchFactor::ExactAmount => write!(f, "Montant identique"),
            MatchFactor::CloseAmount => write!(f, "Montant proche"),
            MatchFactor::ExactDate => write!(f, "Date identique"),
            MatchFactor::CloseDate { days } => write!(f, "Date proche ({} jours)", days),
            MatchFactor::Reference => write!(f, "Référence identique"),
            MatchFactor::Description { similarity } => {
                write!(f, "Description similaire ({}%)", (similarity * 100.0).round())
            }
        }
    }
}

/// Ranked pairing proposal; produced fresh on every run and never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub bank_transaction: BankTransaction,
    pub book_entry: BookEntry,
    pub confidence: f64,
    pub factors: Vec<MatchFactor>,
    /// Comma-joined factor labels
    pub reason: String,
    /// Rule that proposed the pair, if any
    pub rule_id: Option<String>,
}

/// Which matched-state records a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Matched,
    Unmatched,
    #[default]
    All,
}

/// Period and status filter for fetching records of one account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: StatusFilter,
    /// Case-insensitive substring searched in description and reference
    pub search_term: Option<String>,
}

impl ReconciliationFilter {
    /// Filter for the unmatched records of a period
    pub fn unmatched(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
            status: StatusFilter::Unmatched,
            search_term: None,
        }
    }

    /// Same period and search, restricted to unmatched records
    pub fn only_unmatched(&self) -> Self {
        Self {
            status: StatusFilter::Unmatched,
            ..self.clone()
        }
    }

    pub(crate) fn accepts(
        &self,
        date: NaiveDateTime,
        matched: bool,
        description: &str,
        reference: &str,
    ) -> bool {
        if let Some(start) = self.start_date {
            if date.date() < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if date.date() > end {
                return false;
            }
        }
        match self.status {
            StatusFilter::Matched if !matched => return false,
            StatusFilter::Unmatched if matched => return false,
            _ => {}
        }
        if let Some(term) = self.search_term.as_deref() {
            let term = term.to_lowercase();
            if !description.to_lowercase().contains(&term)
                && !reference.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}

/// Outcome of recording a batch of imported records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

/// Progress of an account's reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
    InProgress,
    Completed,
}

/// Balances and match counts for one account over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub account_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Sum of bank transaction amounts
    pub bank_balance: BigDecimal,
    /// Sum of book entry debits minus credits
    pub book_balance: BigDecimal,
    /// Bank balance minus book balance
    pub difference: BigDecimal,
    pub matched_items: usize,
    pub unmatched_bank: usize,
    pub unmatched_book: usize,
    pub state: ReconciliationState,
}

/// Consistency check of an account's reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: ReconciliationSummary,
}

/// Result of an automatic matching pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoMatchOutcome {
    /// Matches applied as pending
    pub matched: Vec<ReconciliationMatch>,
    /// Remaining suggestions whose records are both still free
    pub suggestions: Vec<MatchSuggestion>,
}

/// Lifecycle of a reconciliation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Open,
    Closed,
    Archived,
}

/// Date range of one account whose reconciliation is closed as a unit.
///
/// Once the period leaves `Open`, records dated inside it can no longer be
/// matched, unmatched or imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPeriod {
    pub id: String,
    pub account_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
    pub created_date: NaiveDateTime,
    pub closed_date: Option<NaiveDateTime>,
    pub closed_by: Option<String>,
    /// Balances frozen when the period was closed
    pub summary: Option<ReconciliationSummary>,
}

impl ReconciliationPeriod {
    /// Create an open period with a fresh id
    pub fn new(account_id: String, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            start_date,
            end_date,
            status: PeriodStatus::Open,
            created_date: chrono::Utc::now().naive_utc(),
            closed_date: None,
            closed_by: None,
            summary: None,
        }
    }

    /// Whether a record of `account_id` dated `date` falls inside the period
    pub fn covers(&self, account_id: &str, date: NaiveDateTime) -> bool {
        self.account_id == account_id
            && date.date() >= self.start_date
            && date.date() <= self.end_date
    }

    pub fn overlaps(&self, other: &ReconciliationPeriod) -> bool {
        self.account_id == other.account_id
            && self.start_date <= other.end_date
            && other.start_date <= self.end_date
    }

    pub fn is_locked(&self) -> bool {
        self.status != PeriodStatus::Open
    }

    /// Filter selecting every record of the period
    pub fn filter(&self) -> ReconciliationFilter {
        ReconciliationFilter {
            start_date: Some(self.start_date),
            end_date: Some(self.end_date),
            ..ReconciliationFilter::default()
        }
    }
}

/// Kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    BankTransaction,
    BookEntry,
    Match,
    Period,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::BankTransaction => write!(f, "Bank transaction"),
            RecordKind::BookEntry => write!(f, "Book entry"),
            RecordKind::Match => write!(f, "Match"),
            RecordKind::Period => write!(f, "Reconciliation period"),
        }
    }
}

/// Errors that can occur in the reconciliation system
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("{0} already matched: {1}")]
    AlreadyMatched(RecordKind, String),
    #[error("{0} not found: {1}")]
    NotFound(RecordKind, String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Reconciliation period is closed: {0}")]
    PeriodClosed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reconciliation operations
pub type ReconciliationResult<T> = Result<T, ReconciliationError>;
