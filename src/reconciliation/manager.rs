//! Match lifecycle: recording imports, suggesting, matching and unmatching,
//! and closing reconciled periods

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashSet;

use crate::config::ReconciliationConfig;
use crate::reconciliation::engine::find_matches;
use crate::reconciliation::rules::RuleEngine;
use crate::traits::*;
use crate::types::*;

/// Reconciliation manager for handling the match lifecycle of one store
pub struct ReconciliationManager<S: ReconciliationStorage> {
    pub(crate) storage: S,
    config: ReconciliationConfig,
    rules: RuleEngine,
    validator: Box<dyn RecordValidator>,
}

impl<S: ReconciliationStorage> ReconciliationManager<S> {
    /// Create a new manager with the default configuration
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: ReconciliationConfig::default(),
            rules: RuleEngine::default(),
            validator: Box::new(DefaultRecordValidator),
        }
    }

    /// Create a new manager with a validated configuration
    pub fn with_config(storage: S, config: ReconciliationConfig) -> ReconciliationResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            rules: RuleEngine::new(config.rules.clone()),
            config,
            validator: Box::new(DefaultRecordValidator),
        })
    }

    /// Replace the record validator
    pub fn with_validator(mut self, validator: Box<dyn RecordValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    // Imports
    /// Record imported bank transactions; known ids are counted as duplicates
    /// and records dated inside a closed period are reported as errors
    pub async fn record_bank_transactions(
        &mut self,
        transactions: Vec<BankTransaction>,
    ) -> ReconciliationResult<ImportSummary> {
        let mut summary = ImportSummary::default();

        for transaction in transactions {
            if let Err(e) = self.validator.validate_bank_transaction(&transaction) {
                summary.errors.push(e.to_string());
                continue;
            }
            match self.storage.insert_bank_transaction(&transaction).await {
                Ok(true) => summary.imported += 1,
                Ok(false) => summary.duplicates += 1,
                Err(e @ ReconciliationError::PeriodClosed(_)) => {
                    summary.errors.push(format!("{}: {e}", transaction.id))
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            imported = summary.imported,
            duplicates = summary.duplicates,
            errors = summary.errors.len(),
            "recorded bank transactions"
        );
        Ok(summary)
    }

    /// Record ledger entries; known ids are counted as duplicates
    pub async fn record_book_entries(
        &mut self,
        entries: Vec<BookEntry>,
    ) -> ReconciliationResult<ImportSummary> {
        let mut summary = ImportSummary::default();

        for entry in entries {
            if let Err(e) = self.validator.validate_book_entry(&entry) {
                summary.errors.push(e.to_string());
                continue;
            }
            match self.storage.insert_book_entry(&entry).await {
                Ok(true) => summary.imported += 1,
                Ok(false) => summary.duplicates += 1,
                Err(e @ ReconciliationError::PeriodClosed(_)) => {
                    summary.errors.push(format!("{}: {e}", entry.id))
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            imported = summary.imported,
            duplicates = summary.duplicates,
            errors = summary.errors.len(),
            "recorded book entries"
        );
        Ok(summary)
    }

    // Queries
    /// Get the bank transactions of an account
    pub async fn get_bank_transactions(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BankTransaction>> {
        self.storage.list_bank_transactions(account_id, filter).await
    }

    /// Get the book entries of an account
    pub async fn get_book_entries(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<BookEntry>> {
        self.storage.list_book_entries(account_id, filter).await
    }

    /// Unmatched bank transactions and book entries of an account
    pub async fn get_unmatched(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<(Vec<BankTransaction>, Vec<BookEntry>)> {
        let unmatched = filter.only_unmatched();
        Ok((
            self.get_bank_transactions(account_id, &unmatched).await?,
            self.get_book_entries(account_id, &unmatched).await?,
        ))
    }

    /// Get a match by ID
    pub async fn get_match(&self, match_id: &str) -> ReconciliationResult<Option<ReconciliationMatch>> {
        self.storage.get_match(match_id).await
    }

    /// Get a match by ID, returning an error if not found
    pub async fn get_match_required(&self, match_id: &str) -> ReconciliationResult<ReconciliationMatch> {
        self.storage
            .get_match(match_id)
            .await?
            .ok_or_else(|| ReconciliationError::NotFound(RecordKind::Match, match_id.to_string()))
    }

    /// List all match records
    pub async fn list_matches(&self) -> ReconciliationResult<Vec<ReconciliationMatch>> {
        self.storage.list_matches().await
    }

    /// Score the unmatched records of an account and rank the candidates
    pub async fn suggest_matches(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<Vec<MatchSuggestion>> {
        let (bank_transactions, book_entries) = self.get_unmatched(account_id, filter).await?;

        Ok(find_matches(
            &bank_transactions,
            &book_entries,
            &self.config.matching,
        ))
    }

    // Lifecycle
    /// Pair two records by hand; the match is confirmed with confidence 1.0
    pub async fn manual_match(
        &mut self,
        bank_transaction_id: &str,
        book_entry_id: &str,
    ) -> ReconciliationResult<ReconciliationMatch> {
        let reconciliation_match = ReconciliationMatch::new(
            bank_transaction_id.to_string(),
            book_entry_id.to_string(),
            MatchType::Manual,
            1.0,
            "Rapprochement manuel".to_string(),
            self.config.matched_by.clone(),
            MatchStatus::Confirmed,
        );
        self.apply(reconciliation_match).await
    }

    /// Confirm a suggestion produced by the engine or by a rule
    pub async fn accept_suggestion(
        &mut self,
        suggestion: &MatchSuggestion,
    ) -> ReconciliationResult<ReconciliationMatch> {
        let reconciliation_match = self.match_from_suggestion(suggestion, MatchStatus::Confirmed);
        self.apply(reconciliation_match).await
    }

    /// Pair the unmatched records of an account in two passes.
    ///
    /// Active rules run first, highest priority first; pairs of rules marked
    /// `auto_apply` become pending matches and the others are returned as
    /// suggestions. The remaining records are then scored, and every
    /// suggestion at or above the auto-apply threshold is applied as a
    /// pending match, best first. Each record is used at most once.
    pub async fn auto_match(
        &mut self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<AutoMatchOutcome> {
        let (bank_transactions, book_entries) = self.get_unmatched(account_id, filter).await?;
        let threshold = self.config.auto_apply_threshold;

        let rule_matches = if self.rules.is_empty() {
            Vec::new()
        } else {
            self.rules
                .apply_rules(&bank_transactions, &book_entries, &self.config.matching)
        };

        let claimed_bank: HashSet<&str> = rule_matches
            .iter()
            .map(|m| m.suggestion.bank_transaction.id.as_str())
            .collect();
        let claimed_book: HashSet<&str> = rule_matches
            .iter()
            .map(|m| m.suggestion.book_entry.id.as_str())
            .collect();
        let free_bank: Vec<BankTransaction> = bank_transactions
            .iter()
            .filter(|t| !claimed_bank.contains(t.id.as_str()))
            .cloned()
            .collect();
        let free_book: Vec<BookEntry> = book_entries
            .iter()
            .filter(|e| !claimed_book.contains(e.id.as_str()))
            .cloned()
            .collect();

        let mut candidates: Vec<(MatchSuggestion, bool)> = rule_matches
            .into_iter()
            .map(|m| (m.suggestion, m.auto_apply))
            .collect();
        candidates.extend(
            find_matches(&free_bank, &free_book, &self.config.matching)
                .into_iter()
                .map(|s| {
                    let apply = s.confidence >= threshold;
                    (s, apply)
                }),
        );

        let mut taken_bank = HashSet::new();
        let mut taken_book = HashSet::new();
        let mut matched = Vec::new();
        let mut remaining = Vec::new();

        for (suggestion, apply) in candidates {
            let bank_id = suggestion.bank_transaction.id.clone();
            let book_id = suggestion.book_entry.id.clone();
            if taken_bank.contains(&bank_id) || taken_book.contains(&book_id) {
                continue;
            }

            if !apply {
                remaining.push(suggestion);
                continue;
            }

            let reconciliation_match = self.match_from_suggestion(&suggestion, MatchStatus::Pending);
            match self.apply(reconciliation_match).await {
                Ok(m) => {
                    taken_bank.insert(bank_id);
                    taken_book.insert(book_id);
                    matched.push(m);
                }
                // Raced with another writer; the pair is simply skipped.
                Err(ReconciliationError::AlreadyMatched(kind, id)) => {
                    tracing::warn!(%kind, %id, "skipping auto-match, record taken");
                }
                Err(ReconciliationError::PeriodClosed(period_id)) => {
                    tracing::warn!(%period_id, "skipping auto-match, period closed");
                }
                Err(e) => return Err(e),
            }
        }

        // Lower-ranked suggestions may have lost a record to an applied match.
        remaining.retain(|s| {
            !taken_bank.contains(&s.bank_transaction.id) && !taken_book.contains(&s.book_entry.id)
        });

        tracing::info!(
            account_id,
            matched = matched.len(),
            suggestions = remaining.len(),
            "auto-match pass complete"
        );

        Ok(AutoMatchOutcome {
            matched,
            suggestions: remaining,
        })
    }

    /// Confirm a pending match
    pub async fn confirm_match(&mut self, match_id: &str) -> ReconciliationResult<ReconciliationMatch> {
        let confirmed = self
            .storage
            .transition_match(match_id, MatchStatus::Pending, MatchStatus::Confirmed)
            .await?;

        tracing::info!(match_id, "confirmed match");
        Ok(confirmed)
    }

    /// Reject a pending match; both records become unmatched and the match
    /// record is kept as rejected
    pub async fn reject_match(&mut self, match_id: &str) -> ReconciliationResult<ReconciliationMatch> {
        let mut released = self
            .storage
            .release_match(
                match_id,
                Some(MatchStatus::Pending),
                Some(MatchStatus::Rejected),
            )
            .await?;
        released.status = MatchStatus::Rejected;

        tracing::info!(match_id, "rejected match");
        Ok(released)
    }

    /// Undo a match: both records become unmatched and the record is deleted
    pub async fn unmatch(&mut self, match_id: &str) -> ReconciliationResult<()> {
        let released = self.storage.release_match(match_id, None, None).await?;

        tracing::info!(
            match_id,
            bank_transaction_id = %released.bank_transaction_id,
            book_entry_id = %released.book_entry_id,
            "unmatched"
        );
        Ok(())
    }

    fn match_from_suggestion(
        &self,
        suggestion: &MatchSuggestion,
        status: MatchStatus,
    ) -> ReconciliationMatch {
        let match_type = if suggestion.rule_id.is_some() {
            MatchType::Rule
        } else {
            MatchType::Auto
        };
        let mut reconciliation_match = ReconciliationMatch::new(
            suggestion.bank_transaction.id.clone(),
            suggestion.book_entry.id.clone(),
            match_type,
            suggestion.confidence,
            suggestion.reason.clone(),
            self.config.matched_by.clone(),
            status,
        );
        reconciliation_match.rule_id = suggestion.rule_id.clone();
        reconciliation_match
    }

    async fn apply(
        &mut self,
        reconciliation_match: ReconciliationMatch,
    ) -> ReconciliationResult<ReconciliationMatch> {
        if let Err(e) = self.storage.apply_match(&reconciliation_match).await {
            tracing::warn!(
                bank_transaction_id = %reconciliation_match.bank_transaction_id,
                book_entry_id = %reconciliation_match.book_entry_id,
                error = %e,
                "match refused"
            );
            return Err(e);
        }

        tracing::info!(
            match_id = %reconciliation_match.id,
            bank_transaction_id = %reconciliation_match.bank_transaction_id,
            book_entry_id = %reconciliation_match.book_entry_id,
            match_type = ?reconciliation_match.match_type,
            confidence = reconciliation_match.confidence,
            "matched"
        );
        Ok(reconciliation_match)
    }

    // Reporting
    /// Balances and match counts of an account over the filter's period
    pub async fn summary(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<ReconciliationSummary> {
        let period = ReconciliationFilter {
            status: StatusFilter::All,
            ..filter.clone()
        };
        let bank_transactions = self.get_bank_transactions(account_id, &period).await?;
        let book_entries = self.get_book_entries(account_id, &period).await?;

        let bank_balance: BigDecimal = bank_transactions.iter().map(|t| &t.amount).sum();
        let book_balance: BigDecimal = book_entries.iter().map(|e| e.net_amount()).sum();
        let difference = &bank_balance - &book_balance;

        let unmatched_bank = bank_transactions.iter().filter(|t| !t.matched).count();
        let unmatched_book = book_entries.iter().filter(|e| !e.matched).count();
        let matched_items = bank_transactions.iter().filter(|t| t.matched).count();

        let state = if unmatched_bank == 0 && unmatched_book == 0 {
            ReconciliationState::Completed
        } else {
            ReconciliationState::InProgress
        };

        Ok(ReconciliationSummary {
            account_id: account_id.to_string(),
            start_date: filter.start_date,
            end_date: filter.end_date,
            bank_balance,
            book_balance,
            difference,
            matched_items,
            unmatched_bank,
            unmatched_book,
            state,
        })
    }

    /// Check that matched flags and match records agree for an account
    pub async fn validate_reconciliation(
        &self,
        account_id: &str,
        filter: &ReconciliationFilter,
    ) -> ReconciliationResult<ReconciliationReport> {
        let summary = self.summary(account_id, filter).await?;
        let period = ReconciliationFilter {
            status: StatusFilter::All,
            ..filter.clone()
        };
        let bank_transactions = self.get_bank_transactions(account_id, &period).await?;
        let matches = self.list_matches().await?;

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for transaction in bank_transactions.iter().filter(|t| t.matched) {
            let Some(book_id) = transaction.matched_with.as_deref() else {
                errors.push(format!(
                    "Bank transaction '{}' is matched without a partner",
                    transaction.id
                ));
                continue;
            };

            match self.storage.get_book_entry(book_id).await? {
                Some(entry) if entry.matched_with.as_deref() == Some(transaction.id.as_str()) => {}
                Some(_) => errors.push(format!(
                    "Bank transaction '{}' and book entry '{}' do not point at each other",
                    transaction.id, book_id
                )),
                None => errors.push(format!(
                    "Bank transaction '{}' is matched with unknown book entry '{}'",
                    transaction.id, book_id
                )),
            }

            let active = matches.iter().find(|m| {
                m.status.is_active()
                    && m.bank_transaction_id == transaction.id
                    && m.book_entry_id == book_id
            });
            match active {
                None => errors.push(format!(
                    "Bank transaction '{}' is matched but has no active match record",
                    transaction.id
                )),
                Some(m) if m.status == MatchStatus::Pending => warnings.push(format!(
                    "Match '{}' for bank transaction '{}' awaits confirmation",
                    m.id, transaction.id
                )),
                Some(_) => {}
            }
        }

        if summary.unmatched_bank > 0 {
            warnings.push(format!(
                "{} bank transaction(s) remain unmatched",
                summary.unmatched_bank
            ));
        }
        if summary.unmatched_book > 0 {
            warnings.push(format!(
                "{} book entr(ies) remain unmatched",
                summary.unmatched_book
            ));
        }
        if summary.state == ReconciliationState::Completed
            && summary.difference != BigDecimal::from(0)
        {
            warnings.push(format!(
                "All items are matched but balances differ by {}",
                summary.difference
            ));
        }

        Ok(ReconciliationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            summary,
        })
    }

    // Periods
    /// Open a reconciliation period for an account
    pub async fn open_period(
        &mut self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ReconciliationResult<ReconciliationPeriod> {
        if start_date > end_date {
            return Err(ReconciliationError::InvalidInput(format!(
                "Period start {start_date} is after its end {end_date}"
            )));
        }

        let period = ReconciliationPeriod::new(account_id.to_string(), start_date, end_date);
        self.storage.insert_period(&period).await?;

        tracing::info!(
            period_id = %period.id,
            account_id,
            %start_date,
            %end_date,
            "opened reconciliation period"
        );
        Ok(period)
    }

    pub async fn get_period(&self, period_id: &str) -> ReconciliationResult<Option<ReconciliationPeriod>> {
        self.storage.get_period(period_id).await
    }

    /// Periods of an account, oldest first
    pub async fn list_periods(&self, account_id: &str) -> ReconciliationResult<Vec<ReconciliationPeriod>> {
        self.storage.list_periods(account_id).await
    }

    /// Close an open period, freezing its summary. Refused while the period
    /// fails validation or still holds pending matches; afterwards its records
    /// can no longer be matched, unmatched or re-imported.
    pub async fn close_period(&mut self, period_id: &str) -> ReconciliationResult<ReconciliationPeriod> {
        let period = self.period_required(period_id).await?;
        let report = self
            .validate_reconciliation(&period.account_id, &period.filter())
            .await?;
        if !report.is_valid {
            tracing::warn!(period_id, errors = report.errors.len(), "period close refused");
            return Err(ReconciliationError::InvalidTransition(format!(
                "Period '{}' has reconciliation errors: {}",
                period_id,
                report.errors.join("; ")
            )));
        }

        let closed = self
            .storage
            .close_period(period_id, &self.config.matched_by, &report.summary)
            .await?;

        tracing::info!(
            period_id,
            account_id = %closed.account_id,
            difference = %report.summary.difference,
            "closed reconciliation period"
        );
        Ok(closed)
    }

    /// Archive a closed period once it still validates cleanly
    pub async fn archive_period(&mut self, period_id: &str) -> ReconciliationResult<ReconciliationPeriod> {
        let period = self.period_required(period_id).await?;
        let report = self
            .validate_reconciliation(&period.account_id, &period.filter())
            .await?;
        if !report.is_valid {
            tracing::warn!(period_id, errors = report.errors.len(), "period archive refused");
            return Err(ReconciliationError::InvalidTransition(format!(
                "Period '{}' cannot be archived with reconciliation errors: {}",
                period_id,
                report.errors.join("; ")
            )));
        }

        let archived = self.storage.archive_period(period_id).await?;
        tracing::info!(period_id, "archived reconciliation period");
        Ok(archived)
    }

    async fn period_required(&self, period_id: &str) -> ReconciliationResult<ReconciliationPeriod> {
        self.storage
            .get_period(period_id)
            .await?
            .ok_or_else(|| ReconciliationError::NotFound(RecordKind::Period, period_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    async fn manager_with_pair() -> ReconciliationManager<MemoryStorage> {
        let mut manager = ReconciliationManager::new(MemoryStorage::new());
        manager
            .record_bank_transactions(vec![BankTransaction::new(
                "bank-1".to_string(),
                "acc".to_string(),
                date(15),
                BigDecimal::from(1000),
                "Virement SARL ABC".to_string(),
                "VIR-1".to_string(),
            )])
            .await
            .unwrap();
        manager
            .record_book_entries(vec![BookEntry::debit(
                "book-1".to_string(),
                "acc".to_string(),
                date(15),
                "Virement SARL ABC".to_string(),
                BigDecimal::from(1000),
                "VIR-1".to_string(),
            )])
            .await
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_manual_match_sets_both_sides() {
        let mut manager = manager_with_pair().await;
        let m = manager.manual_match("bank-1", "book-1").await.unwrap();

        assert_eq!(m.match_type, MatchType::Manual);
        assert_eq!(m.status, MatchStatus::Confirmed);
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.matched_by, "system");

        let bank = manager.storage.get_bank_transaction("bank-1").await.unwrap().unwrap();
        let book = manager.storage.get_book_entry("book-1").await.unwrap().unwrap();
        assert_eq!(bank.matched_with.as_deref(), Some("book-1"));
        assert_eq!(book.matched_with.as_deref(), Some("bank-1"));
    }

    #[tokio::test]
    async fn test_get_unmatched_excludes_matched_pair() {
        let mut manager = manager_with_pair().await;
        let all = ReconciliationFilter::default();

        let (bank, book) = manager.get_unmatched("acc", &all).await.unwrap();
        assert_eq!((bank.len(), book.len()), (1, 1));

        manager.manual_match("bank-1", "book-1").await.unwrap();
        let (bank, book) = manager.get_unmatched("acc", &all).await.unwrap();
        assert!(bank.is_empty() && book.is_empty());
        assert!(manager.suggest_matches("acc", &all).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_match_unknown_ids() {
        let mut manager = manager_with_pair().await;
        let err = manager.manual_match("invalid-bank", "book-1").await.unwrap_err();
        assert!(matches!(
            err,
            ReconciliationError::NotFound(RecordKind::BankTransaction, _)
        ));
        assert!(manager.list_matches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_and_reject_require_pending() {
        let mut manager = manager_with_pair().await;
        let m = manager.manual_match("bank-1", "book-1").await.unwrap();

        assert!(matches!(
            manager.confirm_match(&m.id).await,
            Err(ReconciliationError::InvalidTransition(_))
        ));
        assert!(matches!(
            manager.reject_match(&m.id).await,
            Err(ReconciliationError::InvalidTransition(_))
        ));
        assert!(matches!(
            manager.confirm_match("missing").await,
            Err(ReconciliationError::NotFound(RecordKind::Match, _))
        ));
    }

    #[tokio::test]
    async fn test_duplicates_and_invalid_records_are_counted() {
        let mut manager = manager_with_pair().await;
        let summary = manager
            .record_bank_transactions(vec![
                BankTransaction::new(
                    "bank-1".to_string(),
                    "acc".to_string(),
                    date(15),
                    BigDecimal::from(1000),
                    "Virement SARL ABC".to_string(),
                    "VIR-1".to_string(),
                ),
                BankTransaction::new(
                    " ".to_string(),
                    "acc".to_string(),
                    date(16),
                    BigDecimal::from(5),
                    "Frais".to_string(),
                    String::new(),
                ),
            ])
            .await
            .unwrap();

        assert_eq!(summary.imported, 0);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_rule_matches_are_recorded_as_rule() {
        let config = ReconciliationConfig::from_toml_str(
            r#"
            [[rules]]
            id = "virements"
            name = "Virements"
            auto_apply = true

            [rules.conditions]
            reference_match = true
            "#,
        )
        .unwrap();
        let mut manager = ReconciliationManager::with_config(MemoryStorage::new(), config).unwrap();
        let seeded = manager_with_pair().await;
        manager.storage = seeded.storage;

        let outcome = manager
            .auto_match("acc", &ReconciliationFilter::default())
            .await
            .unwrap();

        assert_eq!(outcome.matched.len(), 1);
        let m = &outcome.matched[0];
        assert_eq!(m.match_type, MatchType::Rule);
        assert_eq!(m.rule_id.as_deref(), Some("virements"));
        assert_eq!(m.status, MatchStatus::Pending);
        assert!(m.reason.starts_with("Règle « Virements »"));
        assert!(outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_period_lifecycle() {
        let mut manager = manager_with_pair().await;
        let period = manager.open_period("acc", date(1), date(31)).await.unwrap();
        assert_eq!(period.status, PeriodStatus::Open);

        let m = manager.manual_match("bank-1", "book-1").await.unwrap();
        let closed = manager.close_period(&period.id).await.unwrap();
        assert_eq!(closed.status, PeriodStatus::Closed);
        assert_eq!(closed.closed_by.as_deref(), Some("system"));
        assert_eq!(closed.summary.as_ref().map(|s| s.matched_items), Some(1));

        assert!(matches!(
            manager.unmatch(&m.id).await,
            Err(ReconciliationError::PeriodClosed(ref id)) if *id == period.id
        ));

        let archived = manager.archive_period(&period.id).await.unwrap();
        assert_eq!(archived.status, PeriodStatus::Archived);
        assert_eq!(manager.list_periods("acc").await.unwrap(), vec![archived]);
    }

    #[tokio::test]
    async fn test_open_period_rejects_bad_ranges() {
        let mut manager = manager_with_pair().await;
        assert!(matches!(
            manager.open_period("acc", date(31), date(1)).await,
            Err(ReconciliationError::InvalidInput(_))
        ));

        manager.open_period("acc", date(1), date(15)).await.unwrap();
        assert!(matches!(
            manager.open_period("acc", date(15), date(31)).await,
            Err(ReconciliationError::InvalidInput(_))
        ));
        assert!(manager.open_period("other", date(1), date(31)).await.is_ok());
        assert!(matches!(
            manager.close_period("missing").await,
            Err(ReconciliationError::NotFound(RecordKind::Period, _))
        ));
    }

    #[test]
    fn test_with_config_rejects_invalid_config() {
        let config = ReconciliationConfig {
            auto_apply_threshold: 1.5,
            ..ReconciliationConfig::default()
        };
        assert!(ReconciliationManager::with_config(MemoryStorage::new(), config).is_err());
    }
}
