//! In-memory storage implementation for testing

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

/// Complete reconciliation state held by the in-memory and file backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub bank_transactions: BTreeMap<String, BankTransaction>,
    pub book_entries: BTreeMap<String, BookEntry>,
    pub matches: BTreeMap<String, ReconciliationMatch>,
    #[serde(default)]
    pub periods: BTreeMap<String, ReconciliationPeriod>,
}

impl MemoryState {
    pub(crate) fn list_bank_transactions(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> Vec<BankTransaction> {
        let mut transactions: Vec<BankTransaction> = self
            .bank_transactions
            .values()
            .filter(|tx| {
                tx.account_id == account_id
                    && filter.accepts(tx.date, tx.matched, &tx.description, &tx.reference)
            })
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        transactions
    }

    pub(crate) fn list_book_entries(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> Vec<BookEntry> {
        let mut entries: Vec<BookEntry> = self
            .book_entries
            .values()
            .filter(|entry| {
                entry.account_id == account_id
                    && filter.accepts(entry.date, entry.matched, &entry.description, &entry.reference)
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    pub(crate) fn list_matches(&self) -> Vec<ReconciliationMatch> {
        let mut matches: Vec<ReconciliationMatch> = self.matches.values().cloned().collect();
        matches.sort_by(|a, b| {
            a.matched_date
                .cmp(&b.matched_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    pub(crate) fn list_periods(&self, account_id: &str) -> Vec<ReconciliationPeriod> {
        let mut periods: Vec<ReconciliationPeriod> = self
            .periods
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        periods.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        periods
    }

    /// Fails when a closed or archived period covers `date` on `account_id`
    fn ensure_open(&self, account_id: &str, date: NaiveDateTime) -> ReconciliationResult<()> {
        match self
            .periods
            .values()
            .find(|p| p.is_locked() && p.covers(account_id, date))
        {
            Some(period) => Err(ReconciliationError::PeriodClosed(period.id.clone())),
            None => Ok(()),
        }
    }

    /// Lock check for both records of a match; missing records are ignored
    fn ensure_match_open(&self, m: &ReconciliationMatch) -> ReconciliationResult<()> {
        if let Some(bank) = self.bank_transactions.get(&m.bank_transaction_id) {
            self.ensure_open(&bank.account_id, bank.date)?;
        }
        if let Some(book) = self.book_entries.get(&m.book_entry_id) {
            self.ensure_open(&book.account_id, book.date)?;
        }
        Ok(())
    }

    pub(crate) fn save_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconciliationResult<()> {
        if let Some(existing) = self.bank_transactions.get(&transaction.id) {
            self.ensure_open(&existing.account_id, existing.date)?;
        }
        self.ensure_open(&transaction.account_id, transaction.date)?;
        self.bank_transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    pub(crate) fn insert_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconciliationResult<bool> {
        if self.bank_transactions.contains_key(&transaction.id) {
            return Ok(false);
        }
        self.save_bank_transaction(transaction)?;
        Ok(true)
    }

    pub(crate) fn save_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<()> {
        if let Some(existing) = self.book_entries.get(&entry.id) {
            self.ensure_open(&existing.account_id, existing.date)?;
        }
        self.ensure_open(&entry.account_id, entry.date)?;
        self.book_entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    pub(crate) fn insert_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<bool> {
        if self.book_entries.contains_key(&entry.id) {
            return Ok(false);
        }
        self.save_book_entry(entry)?;
        Ok(true)
    }

    pub(crate) fn apply_match(&mut self, m: &ReconciliationMatch) -> ReconciliationResult<()> {
        if !m.status.is_active() {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Cannot apply match '{}' with status {:?}",
                m.id, m.status
            )));
        }
        if self.matches.contains_key(&m.id) {
            return Err(ReconciliationError::InvalidInput(format!(
                "Match '{}' already exists",
                m.id
            )));
        }

        let bank = self.bank_transactions.get(&m.bank_transaction_id).ok_or_else(|| {
            ReconciliationError::NotFound(RecordKind::BankTransaction, m.bank_transaction_id.clone())
        })?;
        if bank.matched {
            return Err(ReconciliationError::AlreadyMatched(
                RecordKind::BankTransaction,
                bank.id.clone(),
            ));
        }

        let book = self.book_entries.get(&m.book_entry_id).ok_or_else(|| {
            ReconciliationError::NotFound(RecordKind::BookEntry, m.book_entry_id.clone())
        })?;
        if book.matched {
            return Err(ReconciliationError::AlreadyMatched(
                RecordKind::BookEntry,
                book.id.clone(),
            ));
        }

        self.ensure_match_open(m)?;

        // Preconditions hold; from here on nothing can fail.
        if let Some(bank) = self.bank_transactions.get_mut(&m.bank_transaction_id) {
            bank.mark_matched(&m.book_entry_id, m.matched_date, &m.matched_by);
        }
        if let Some(book) = self.book_entries.get_mut(&m.book_entry_id) {
            book.mark_matched(&m.bank_transaction_id, m.matched_date, &m.matched_by);
        }
        self.matches.insert(m.id.clone(), m.clone());
        Ok(())
    }

    pub(crate) fn release_match(
        &mut self,
        match_id: &str,
        expected: Option<MatchStatus>,
        keep_as: Option<MatchStatus>,
    ) -> ReconciliationResult<ReconciliationMatch> {
        let existing = self
            .matches
            .get(match_id)
            .cloned()
            .ok_or_else(|| ReconciliationError::NotFound(RecordKind::Match, match_id.to_string()))?;

        if let Some(status) = expected {
            if existing.status != status {
                return Err(ReconciliationError::InvalidTransition(format!(
                    "Match '{}' is {:?}, expected {:?}",
                    match_id, existing.status, status
                )));
            }
        }
        if !existing.status.is_active() {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Match '{}' is already {:?}",
                match_id, existing.status
            )));
        }
        if let Some(status) = keep_as {
            if status.is_active() {
                return Err(ReconciliationError::InvalidTransition(format!(
                    "Released match '{}' cannot stay {:?}",
                    match_id, status
                )));
            }
        }
        self.ensure_match_open(&existing)?;

        // Only clear a side that still points at its partner.
        if let Some(bank) = self.bank_transactions.get_mut(&existing.bank_transaction_id) {
            if bank.matched_with.as_deref() == Some(existing.book_entry_id.as_str()) {
                bank.clear_match();
            }
        }
        if let Some(book) = self.book_entries.get_mut(&existing.book_entry_id) {
            if book.matched_with.as_deref() == Some(existing.bank_transaction_id.as_str()) {
                book.clear_match();
            }
        }

        match keep_as {
            Some(status) => {
                if let Some(m) = self.matches.get_mut(match_id) {
                    m.status = status;
                }
            }
            None => {
                self.matches.remove(match_id);
            }
        }

        Ok(existing)
    }

    pub(crate) fn transition_match(
        &mut self,
        match_id: &str,
        from: MatchStatus,
        to: MatchStatus,
    ) -> ReconciliationResult<ReconciliationMatch> {
        let existing = self
            .matches
            .get(match_id)
            .ok_or_else(|| ReconciliationError::NotFound(RecordKind::Match, match_id.to_string()))?;

        if existing.status != from {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Match '{}' is {:?}, expected {:?}",
                match_id, existing.status, from
            )));
        }
        // Leaving the active states frees the records; that is `release_match`.
        if !to.is_active() {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Match '{}' cannot move to {:?} without being released",
                match_id, to
            )));
        }
        self.ensure_match_open(existing)?;

        let mut updated = existing.clone();
        updated.status = to;
        self.matches.insert(match_id.to_string(), updated.clone());
        Ok(updated)
    }

    pub(crate) fn insert_period(&mut self, period: &ReconciliationPeriod) -> ReconciliationResult<()> {
        if self.periods.contains_key(&period.id) {
            return Err(ReconciliationError::InvalidInput(format!(
                "Period '{}' already exists",
                period.id
            )));
        }
        if let Some(other) = self.periods.values().find(|p| p.overlaps(period)) {
            return Err(ReconciliationError::InvalidInput(format!(
                "Period {}..{} overlaps period '{}' ({}..{})",
                period.start_date, period.end_date, other.id, other.start_date, other.end_date
            )));
        }
        self.periods.insert(period.id.clone(), period.clone());
        Ok(())
    }

    pub(crate) fn close_period(
        &mut self,
        period_id: &str,
        closed_by: &str,
        summary: &ReconciliationSummary,
        at: NaiveDateTime,
    ) -> ReconciliationResult<ReconciliationPeriod> {
        let period = self
            .periods
            .get(period_id)
            .ok_or_else(|| ReconciliationError::NotFound(RecordKind::Period, period_id.to_string()))?;

        if period.status != PeriodStatus::Open {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Only open periods can be closed, '{}' is {:?}",
                period_id, period.status
            )));
        }

        let pending = self.matches.values().find(|m| {
            m.status == MatchStatus::Pending
                && self
                    .bank_transactions
                    .get(&m.bank_transaction_id)
                    .is_some_and(|tx| period.covers(&tx.account_id, tx.date))
        });
        if let Some(m) = pending {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Period '{}' still has pending match '{}'",
                period_id, m.id
            )));
        }

        let mut closed = period.clone();
        closed.status = PeriodStatus::Closed;
        closed.closed_date = Some(at);
        closed.closed_by = Some(closed_by.to_string());
        closed.summary = Some(summary.clone());
        self.periods.insert(period_id.to_string(), closed.clone());
        Ok(closed)
    }

    pub(crate) fn archive_period(&mut self, period_id: &str) -> ReconciliationResult<ReconciliationPeriod> {
        let period = self
            .periods
            .get_mut(period_id)
            .ok_or_else(|| ReconciliationError::NotFound(RecordKind::Period, period_id.to_string()))?;

        if period.status != PeriodStatus::Closed {
            return Err(ReconciliationError::InvalidTransition(format!(
                "Only closed periods can be archived, '{}' is {:?}",
                period_id, period.status
            )));
        }
        period.status = PeriodStatus::Archived;
        Ok(period.clone())
    }
}

/// In-memory storage implementation for testing and development
///
/// All records live behind a single lock, so every mutation is one critical
/// section. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage instance seeded with existing state
    pub fn from_state(state: MemoryState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ReconciliationResult<MemoryState> {
        Ok(self.read()?.clone())
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReconciliationResult<()> {
        *self.write()? = MemoryState::default();
        Ok(())
    }

    /// Run `op` on a copy of the state, hand the result to `persist`, and
    /// only then make it visible. Any error leaves the state untouched.
    pub(crate) fn commit_with<T>(
        &self,
        op: impl FnOnce(&mut MemoryState) -> ReconciliationResult<T>,
        persist: impl FnOnce(&MemoryState) -> ReconciliationResult<()>,
    ) -> ReconciliationResult<T> {
        let mut state = self.write()?;
        let mut next = state.clone();
        let output = op(&mut next)?;
        persist(&next)?;
        *state = next;
        Ok(output)
    }

    pub(crate) fn read(&self) -> ReconciliationResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| ReconciliationError::Storage("memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> ReconciliationResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| ReconciliationError::Storage("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl ReconciliationStorage for MemoryStorage {
    async fn save_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconciliationResult<()> {
        self.write()?.save_bank_transaction(transaction)
    }

    async fn insert_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconciliationResult<bool> {
        self.write()?.insert_bank_transaction(transaction)
    }

    async fn get_bank_transaction(
        &self,
        id: &str,
    ) -> ReconciliationResult<Option<BankTransaction>> {
        Ok(self.read()?.bank_transactions.get(id).cloned())
    }

    async fn list_bank_transactions(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BankTransaction>> {
        Ok(self.read()?.list_bank_transactions(account_id, filter))
    }

    async fn save_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<()> {
        self.write()?.save_book_entry(entry)
    }

    async fn insert_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<bool> {
        self.write()?.insert_book_entry(entry)
    }

    async fn get_book_entry(&self, id: &str) -> ReconciliationResult<Option<BookEntry>> {
        Ok(self.read()?.book_entries.get(id).cloned())
    }

    async fn list_book_entries(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BookEntry>> {
        Ok(self.read()?.list_book_entries(account_id, filter))
    }

    async fn apply_match(
        &mut self,
        reconciliation_match: &ReconciliationMatch,
    ) -> ReconciliationResult<()> {
        self.write()?.apply_match(reconciliation_match)
    }

    async fn release_match(
        &mut self,
        match_id: &str,
        expected: Option<MatchStatus>,
        keep_as: Option<MatchStatus>,
    ) -> ReconciliationResult<ReconciliationMatch> {
        self.write()?.release_match(match_id, expected, keep_as)
    }

    async fn transition_match(
        &mut self,
        match_id: &str,
        from: MatchStatus,
        to: MatchStatus,
    ) -> ReconciliationResult<ReconciliationMatch> {
        self.write()?.transition_match(match_id, from, to)
    }

    async fn get_match(&self, match_id: &str) -> ReconciliationResult<Option<ReconciliationMatch>> {
        Ok(self.read()?.matches.get(match_id).cloned())
    }

    async fn list_matches(&self) -> ReconciliationResult<Vec<ReconciliationMatch>> {
        Ok(self.read()?.list_matches())
    }

    async fn insert_period(&mut self, period: &ReconciliationPeriod) -> ReconciliationResult<()> {
        self.write()?.insert_period(period)
    }

    async fn get_period(
        &self,
        period_id: &str,
    ) -> ReconciliationResult<Option<ReconciliationPeriod>> {
        Ok(self.read()?.periods.get(period_id).cloned())
    }

    async fn list_periods(&self, account_id: &str) -> ReconciliationResult<Vec<ReconciliationPeriod>> {
        Ok(self.read()?.list_periods(account_id))
    }

    async fn close_period(
        &mut self,
        period_id: &str,
        closed_by: &str,
        summary: &ReconciliationSummary,
    ) -> ReconciliationResult<ReconciliationPeriod> {
        let at = chrono::Utc::now().naive_utc();
        self.write()?.close_period(period_id, closed_by, summary, at)
    }

    async fn archive_period(&mut self, period_id: &str) -> ReconciliationResult<ReconciliationPeriod> {
        self.write()?.archive_period(period_id)
    }
}
