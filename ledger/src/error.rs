use std::path::PathBuf;

use core_types::MappingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("state directory missing: {path}")]
    MissingStateDir { path: PathBuf },
    #[error("{field} is required")]
    InvalidInput { field: &'static str },
    #[error("transaction {hash} already recorded")]
    Duplicate { hash: String },
    #[error("on-chain verification requested but no verifier is available")]
    VerificationUnavailable,
    #[error("ledger corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::Duplicate { .. })
    }
}

impl From<MappingError> for LedgerError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::Corrupt { line, reason, .. } => LedgerError::Corrupt { line, reason },
            MappingError::Io(err) => LedgerError::Io(err),
        }
    }
}
