//! Auto-matching walkthrough over an in-memory store
//!
//! Run with `RUST_LOG=reconciliation_core=debug` to see the engine's logs.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::utils::MemoryStorage;
use reconciliation_core::{
    BankTransaction, BookEntry, ReconciliationFilter, ReconciliationManager,
};
use tracing_subscriber::EnvFilter;

const ACCOUNT: &str = "521100";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let day = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).ok_or("invalid date");
    let mut manager = ReconciliationManager::new(MemoryStorage::new());

    println!("Importing January statement and ledger...\n");
    manager
        .record_bank_transactions(vec![
            BankTransaction::new(
                "bank-1".to_string(),
                ACCOUNT.to_string(),
                day(15)?,
                BigDecimal::from(1_000_000),
                "Virement SARL ABC facture 001".to_string(),
                "FAC-2024-001".to_string(),
            ),
            BankTransaction::new(
                "bank-2".to_string(),
                ACCOUNT.to_string(),
                day(16)?,
                BigDecimal::from(-250_000),
                "Achat mobilier bureau".to_string(),
                "FAC-ACH-001".to_string(),
            ),
            BankTransaction::new(
                "bank-3".to_string(),
                ACCOUNT.to_string(),
                day(31)?,
                BigDecimal::from(-15_000),
                "Frais tenue de compte".to_string(),
                String::new(),
            ),
        ])
        .await?;
    manager
        .record_book_entries(vec![
            BookEntry::debit(
                "book-1".to_string(),
                ACCOUNT.to_string(),
                day(15)?,
                "Virement SARL ABC facture 001".to_string(),
                BigDecimal::from(1_000_000),
                "FAC 2024 001".to_string(),
            ),
            BookEntry::credit(
                "book-2".to_string(),
                ACCOUNT.to_string(),
                day(17)?,
                "Achat mobilier de bureau".to_string(),
                BigDecimal::from(250_000),
                "FAC-ACH-001".to_string(),
            ),
        ])
        .await?;

    let january = ReconciliationFilter {
        start_date: Some(day(1)?),
        end_date: Some(day(31)?),
        ..ReconciliationFilter::default()
    };

    let outcome = manager.auto_match(ACCOUNT, &january).await?;
    for m in &outcome.matched {
        println!(
            "  auto  {} <-> {}  {:.2}  {}",
            m.bank_transaction_id, m.book_entry_id, m.confidence, m.reason
        );
        manager.confirm_match(&m.id).await?;
    }

    for suggestion in &outcome.suggestions {
        println!(
            "  sugg  {} <-> {}  {:.2}  {}",
            suggestion.bank_transaction.id,
            suggestion.book_entry.id,
            suggestion.confidence,
            suggestion.reason
        );
        manager.accept_suggestion(suggestion).await?;
    }

    let report = manager.validate_reconciliation(ACCOUNT, &january).await?;
    let summary = &report.summary;
    println!("\nReconciliation of account {}:", summary.account_id);
    println!("  Bank balance:  {}", summary.bank_balance);
    println!("  Book balance:  {}", summary.book_balance);
    println!("  Difference:    {}", summary.difference);
    println!(
        "  Matched: {}  Unmatched bank: {}  Unmatched book: {}",
        summary.matched_items, summary.unmatched_bank, summary.unmatched_book
    );
    for warning in &report.warnings {
        println!("  ! {warning}");
    }
    for error in &report.errors {
        println!("  x {error}");
    }

    let period = manager.open_period(ACCOUNT, day(1)?, day(31)?).await?;
    let closed = manager.close_period(&period.id).await?;
    println!("\nPeriod {} is now {:?}", closed.id, closed.status);

    Ok(())
}
