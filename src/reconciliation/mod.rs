//! Reconciliation of bank statements against book entries
//!
//! `similarity` and `scoring` compute the confidence of a single pair,
//! `engine` ranks the candidates of a whole run, `rules` pairs records on
//! user-defined conditions, and `manager` drives the match lifecycle and
//! reconciliation periods against a storage backend.

pub mod engine;
pub mod manager;
pub mod rules;
pub mod scoring;
pub mod similarity;

pub use engine::*;
pub use manager::*;
pub use rules::*;
pub use scoring::*;
pub use similarity::*;
