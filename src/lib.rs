//! # Reconciliation Core
//!
//! Bank reconciliation for SYSCOHADA bookkeeping: pairs bank statement lines
//! with ledger entries using a weighted confidence score and keeps a record
//! of every confirmed pairing.
//!
//! ## Features
//!
//! - **Auto-matching**: amount, date proximity, reference and description
//!   similarity combined into a confidence in [0, 1]
//! - **Ranked suggestions**: every unmatched pair at or above 0.7, best first
//! - **Match lifecycle**: manual match, accepted suggestions, pending
//!   auto-matches with confirm/reject, and unmatch
//! - **Matching rules**: prioritized hard conditions, configured in TOML,
//!   that pair records before the scored pass
//! - **Periods**: open, close and archive reconciliation periods; a closed
//!   period freezes its summary and locks its records
//! - **Storage abstraction**: trait-based storage with in-memory and JSON file
//!   backends
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{find_matches, AutoMatchOptions, BankTransaction, BookEntry};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let bank = BankTransaction::new(
//!     "bank-1".to_string(),
//!     "521100".to_string(),
//!     date,
//!     BigDecimal::from(1_000_000),
//!     "Vente marchandises".to_string(),
//!     "FAC-001".to_string(),
//! );
//! let book = BookEntry::debit(
//!     "book-1".to_string(),
//!     "521100".to_string(),
//!     date,
//!     "Vente marchandises".to_string(),
//!     BigDecimal::from(1_000_000),
//!     "FAC-001".to_string(),
//! );
//!
//! let suggestions = find_matches(&[bank], &[book], &AutoMatchOptions::default());
//! assert_eq!(suggestions[0].confidence, 1.0);
//! ```

pub mod config;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
