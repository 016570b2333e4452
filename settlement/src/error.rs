use ledger::LedgerError;
use slot_space::{AllocationError, ContentError, PageId, Rect, SelectionIssue};
use thiserror::Error;

use crate::reconciliation::ReconciliationTicket;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{field} is required")]
    Validation { field: &'static str },
    #[error("invalid selection {rect} on page {page}: {issue}")]
    InvalidSelection {
        page: PageId,
        rect: Rect,
        issue: SelectionIssue,
    },
    #[error("invalid content: {0}")]
    InvalidContent(#[from] ContentError),
    #[error("payment {hash} was already applied")]
    DuplicatePayment { hash: String },
    #[error("slot {rect} on page {page} is already taken")]
    SlotTaken { page: PageId, rect: Rect },
    #[error("slot taken after payment was recorded: {ticket}")]
    SlotTakenAfterPayment { ticket: ReconciliationTicket },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AllocationError> for SettlementError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::InvalidSelection { page, rect, issue } => {
                SettlementError::InvalidSelection { page, rect, issue }
            }
            AllocationError::InvalidContent(err) => SettlementError::InvalidContent(err),
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InvalidInput { field } => SettlementError::Validation { field },
            LedgerError::Duplicate { hash } => SettlementError::DuplicatePayment { hash },
            other => SettlementError::Internal(other.to_string()),
        }
    }
}
