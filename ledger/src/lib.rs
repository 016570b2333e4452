//! Payment proof ledger.
//!
//! The crate exposes:
//! - [`TransactionLedger`]: hash-keyed, at-most-once record of spent payment proofs.
//! - [`LedgerFile`]: the durable append-only file backing it.
//!
//! Proof hashes are trusted as reported by the payment layer and amounts are stored as given;
//! neither is checked against a chain or a price here.

pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{LedgerEntry, TransactionLedger, DEFAULT_AMOUNT};
pub use storage::{LedgerFile, LedgerFileStats};
