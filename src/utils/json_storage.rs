//! JSON file-backed storage
//!
//! Keeps the whole state in memory and rewrites the file after every
//! mutation. The file is written to a sibling temporary path and renamed into
//! place, and the in-memory state only changes once the write succeeded.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::traits::*;
use crate::types::*;
use crate::utils::memory_storage::{MemoryState, MemoryStorage};

/// Storage persisted as a single JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    memory: MemoryStorage,
}

impl JsonFileStorage {
    /// Open the store at `path`, loading it if the file exists
    pub fn open(path: impl AsRef<Path>) -> ReconciliationResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                ReconciliationError::Storage(format!(
                    "Failed to parse {}: {e}",
                    path.display()
                ))
            })?
        } else {
            MemoryState::default()
        };

        tracing::debug!(
            path = %path.display(),
            bank_transactions = state.bank_transactions.len(),
            book_entries = state.book_entries.len(),
            matches = state.matches.len(),
            "opened reconciliation store"
        );

        Ok(Self {
            path,
            memory: MemoryStorage::from_state(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit<T>(
        &self,
        op: impl FnOnce(&mut MemoryState) -> ReconciliationResult<T>,
    ) -> ReconciliationResult<T> {
        self.memory.commit_with(op, |state| write_state(&self.path, state))
    }
}

fn write_state(path: &Path, state: &MemoryState) -> ReconciliationResult<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| ReconciliationError::Storage(format!("Failed to serialize state: {e}")))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl ReconciliationStorage for JsonFileStorage {
    async fn save_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconciliationResult<()> {
        self.commit(|state| state.save_bank_transaction(transaction))
    }

    async fn insert_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconciliationResult<bool> {
        self.commit(|state| state.insert_bank_transaction(transaction))
    }

    async fn get_bank_transaction(
        &self,
        id: &str,
    ) -> ReconciliationResult<Option<BankTransaction>> {
        self.memory.get_bank_transaction(id).await
    }

    async fn list_bank_transactions(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BankTransaction>> {
        self.memory.list_bank_transactions(account_id, filter).await
    }

    async fn save_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<()> {
        self.commit(|state| state.save_book_entry(entry))
    }

    async fn insert_book_entry(&mut self, entry: &BookEntry) -> ReconciliationResult<bool> {
        self.commit(|state| state.insert_book_entry(entry))
    }

    async fn get_book_entry(&self, id: &str) -> ReconciliationResult<Option<BookEntry>> {
        self.memory.get_book_entry(id).await
    }

    async fn list_book_entries(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BookEntry>> {
        self.memory.list_book_entries(account_id, filter).await
    }

    async fn apply_match(
        &mut self,
        reconciliation_match: &ReconciliationMatch,
    ) -> ReconciliationResult<()> {
        self.commit(|state| state.apply_match(reconciliation_match))
    }

    async fn release_match(
        &mut self,
        match_id: &str,
        expected: Option<MatchStatus>,
        keep_as: Option<MatchStatus>,
    ) -> ReconciliationResult<ReconciliationMatch> {
        self.commit(|state| state.release_match(match_id, expected, keep_as))
    }

    async fn transition_match(
        &mut self,
        match_id: &str,
        from: MatchStatus,
        to: MatchStatus,
    ) -> ReconciliationResult<ReconciliationMatch> {
        self.commit(|state| state.transition_match(match_id, from, to))
    }

    async fn get_match(&self, match_id: &str) -> ReconciliationResult<Option<ReconciliationMatch>> {
        self.memory.get_match(match_id).await
    }

    async fn list_matches(&self) -> ReconciliationResult<Vec<ReconciliationMatch>> {
        self.memory.list_matches().await
    }

    async fn insert_period(&mut self, period: &ReconciliationPeriod) -> ReconciliationResult<()> {
        self.commit(|state| state.insert_period(period))
    }

    async fn get_period(
        &self,
        period_id: &str,
    ) -> ReconciliationResult<Option<ReconciliationPeriod>> {
        self.memory.get_period(period_id).await
    }

    async fn list_periods(&self, account_id: &str) -> ReconciliationResult<Vec<ReconciliationPeriod>> {
        self.memory.list_periods(account_id).await
    }

    async fn close_period(
        &mut self,
        period_id: &str,
        closed_by: &str,
        summary: &ReconciliationSummary,
    ) -> ReconciliationResult<ReconciliationPeriod> {
        let at = chrono::Utc::now().naive_utc();
        self.commit(|state| state.close_period(period_id, closed_by, summary, at))
    }

    async fn archive_period(&mut self, period_id: &str) -> ReconciliationResult<ReconciliationPeriod> {
        self.commit(|state| state.archive_period(period_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciliation.json");
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        let mut storage = JsonFileStorage::open(&path).unwrap();
        storage
            .save_bank_transaction(&BankTransaction::new(
                "bank-1".to_string(),
                "acc".to_string(),
                date,
                BigDecimal::from(1000),
                "Virement SARL ABC".to_string(),
                "VIR1".to_string(),
            ))
            .await
            .unwrap();
        storage
            .save_book_entry(&BookEntry::debit(
                "book-1".to_string(),
                "acc".to_string(),
                date,
                "Virement SARL ABC".to_string(),
                BigDecimal::from(1000),
                "VIR1".to_string(),
            ))
            .await
            .unwrap();
        let m = ReconciliationMatch::new(
            "bank-1".to_string(),
            "book-1".to_string(),
            MatchType::Manual,
            1.0,
            String::new(),
            "tester".to_string(),
            MatchStatus::Confirmed,
        );
        storage.apply_match(&m).await.unwrap();

        let reopened = JsonFileStorage::open(&path).unwrap();
        let stored = reopened.get_match(&m.id).await.unwrap().unwrap();
        assert_eq!(stored, m);
        let bank = reopened.get_bank_transaction("bank-1").await.unwrap().unwrap();
        assert!(bank.matched);
        assert_eq!(bank.amount, BigDecimal::from(1000));
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciliation.json");

        let mut storage = JsonFileStorage::open(&path).unwrap();
        let err = storage.release_match("missing", None, None).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::NotFound(RecordKind::Match, _)));
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciliation.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStorage::open(&path).unwrap_err();
        assert!(matches!(err, ReconciliationError::Storage(_)));
    }

    #[tokio::test]
    async fn test_transition_and_period_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciliation.json");
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        let mut storage = JsonFileStorage::open(&path).unwrap();
        storage
            .insert_bank_transaction(&BankTransaction::new(
                "bank-1".to_string(),
                "acc".to_string(),
                date,
                BigDecimal::from(42),
                "Prelevement".to_string(),
                "PRL1".to_string(),
            ))
            .await
            .unwrap();
        storage
            .insert_book_entry(&BookEntry::credit(
                "book-1".to_string(),
                "acc".to_string(),
                date,
                "Prelevement".to_string(),
                BigDecimal::from(42),
                "PRL1".to_string(),
            ))
            .await
            .unwrap();
        let m = ReconciliationMatch::new(
            "bank-1".to_string(),
            "book-1".to_string(),
            MatchType::Auto,
            1.0,
            String::new(),
            "tester".to_string(),
            MatchStatus::Pending,
        );
        storage.apply_match(&m).await.unwrap();
        storage
            .transition_match(&m.id, MatchStatus::Pending, MatchStatus::Confirmed)
            .await
            .unwrap();
        let period = ReconciliationPeriod::new("acc".to_string(), date, date);
        storage.insert_period(&period).await.unwrap();

        let reopened = JsonFileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get_match(&m.id).await.unwrap().unwrap().status,
            MatchStatus::Confirmed
        );
        assert_eq!(reopened.list_periods("acc").await.unwrap(), vec![period]);
    }
}
