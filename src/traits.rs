//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::types::*;

/// Storage abstraction for reconciliation records
///
/// This trait allows the reconciliation core to work with any storage backend
/// (file, database, remote API, in-memory, etc.) by implementing these methods.
///
/// Every mutation must be atomic: it re-checks its preconditions against the
/// current state and either applies all of its changes (bank transaction,
/// book entry, match record, period) together, or changes nothing and
/// returns the error.
#[async_trait]
pub trait ReconciliationStorage: Send + Sync {
    /// Insert or replace a bank transaction
    async fn save_bank_transaction(&mut self, transaction: &BankTransaction)
        -> ReconciliationResult<()>;

    /// Insert a bank transaction unless its id is already stored.
    ///
    /// Returns `false` for a duplicate, leaving the stored record untouched.
    async fn insert_bank_transaction(&mut self, transaction: &BankTransaction)
        -> ReconciliationResult<bool>;

    /// Get a bank transaction by ID
    async fn get_bank_transaction(&self, id: &str)
        -> ReconciliationResult<Option<BankTransaction>>;

    /// List the bank transactions of an account accepted by `filter`,
    /// ordered by date then id
    async fn list_bank_transactions(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BankTransaction>>;

    /// Insert or replace a book entry
    async fn save_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<()>;

    /// Insert a book entry unless its id is already stored
    async fn insert_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<bool>;

    /// Get a book entry by ID
    async fn get_book_entry(&self, id: &str) -> ReconciliationResult<Option<BookEntry>>;

    /// List the book entries of an account accepted by `filter`,
    /// ordered by date then id
    async fn list_book_entries(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BookEntry>>;

    /// Atomically pair the two records named by `reconciliation_match` and store it.
    ///
    /// Fails with `NotFound` if either record is missing, `AlreadyMatched`
    /// if either one is already matched and `PeriodClosed` if either one
    /// lies in a closed period.
    async fn apply_match(&mut self, reconciliation_match: &ReconciliationMatch)
        -> ReconciliationResult<()>;

    /// Atomically clear both sides of an active match.
    ///
    /// With `expected` the stored status must equal it. With `keep_as` the
    /// record is kept under that status, otherwise it is deleted. Returns the
    /// match as it was before the release.
    async fn release_match(
        &mut self,
        match_id: &str,
        expected: Option<MatchStatus>,
        keep_as: Option<MatchStatus>,
    ) -> ReconciliationResult<ReconciliationMatch>;

    /// Atomically move a match from status `from` to the active status `to`.
    ///
    /// Fails with `InvalidTransition` when the stored status is not `from`.
    async fn transition_match(
        &mut self,
        match_id: &str,
        from: MatchStatus,
        to: MatchStatus,
    ) -> ReconciliationResult<ReconciliationMatch>;

    /// Get a match by ID
    async fn get_match(&self, match_id: &str) -> ReconciliationResult<Option<ReconciliationMatch>>;

    /// List all match records, oldest first
    async fn list_matches(&self) -> ReconciliationResult<Vec<ReconciliationMatch>>;

    /// Store a new period; fails if it overlaps a period of the same account
    async fn insert_period(&mut self, period: &ReconciliationPeriod) -> ReconciliationResult<()>;

    /// Get a period by ID
    async fn get_period(&self, period_id: &str)
        -> ReconciliationResult<Option<ReconciliationPeriod>>;

    /// List the periods of an account, earliest first
    async fn list_periods(&self, account_id: &str)
        -> ReconciliationResult<Vec<ReconciliationPeriod>>;

    /// Atomically close an open period, freezing `summary` into it.
    ///
    /// Fails with `InvalidTransition` if the period is not open or a pending
    /// match still touches one of its records.
    async fn close_period(
        &mut self,
        period_id: &str,
        closed_by: &str,
        summary: &ReconciliationSummary,
    ) -> ReconciliationResult<ReconciliationPeriod>;

    /// Atomically archive a closed period
    async fn archive_period(&mut self, period_id: &str)
        -> ReconciliationResult<ReconciliationPeriod>;
}

/// Trait for implementing custom validation of imported records
pub trait RecordValidator: Send + Sync {
    /// Validate a bank transaction before saving
    fn validate_bank_transaction(&self, transaction: &BankTransaction) -> ReconciliationResult<()>;

    /// Validate a book entry before saving
    fn validate_book_entry(&self, entry: &BookEntry) -> ReconciliationResult<()>;
}

/// Default validator with basic structural rules
pub struct DefaultRecordValidator;

impl RecordValidator for DefaultRecordValidator {
    fn validate_bank_transaction(&self, transaction: &BankTransaction) -> ReconciliationResult<()> {
        if transaction.id.trim().is_empty() {
            return Err(ReconciliationError::InvalidInput(
                "Bank transaction ID cannot be empty".to_string(),
            ));
        }
        if transaction.matched != transaction.matched_with.is_some() {
            return Err(ReconciliationError::InvalidInput(format!(
                "Bank transaction '{}' has inconsistent matched state",
                transaction.id
            )));
        }
        Ok(())
    }

    fn validate_book_entry(&self, entry: &BookEntry) -> ReconciliationResult<()> {
        if entry.id.trim().is_empty() {
            return Err(ReconciliationError::InvalidInput(
                "Book entry ID cannot be empty".to_string(),
            ));
        }

        let zero = bigdecimal::BigDecimal::from(0);
        if (entry.debit != zero) == (entry.credit != zero) {
            return Err(ReconciliationError::InvalidInput(format!(
                "Book entry '{}' must have exactly one of debit or credit",
                entry.id
            )));
        }

        if entry.matched != entry.matched_with.is_some() {
            return Err(ReconciliationError::InvalidInput(format!(
                "Book entry '{}' has inconsistent matched state",
                entry.id
            )));
        }
        Ok(())
    }
}
