//! Settlement: turns a paid draft into a committed allocation.
//!
//! The proof is spent in the [`ledger`] first and the grid insert follows. When the insert loses a
//! race after the proof was spent, a [`ReconciliationTicket`] is persisted and the caller gets
//! [`SettlementError::SlotTakenAfterPayment`].

pub mod config;
pub mod error;
pub mod reconciliation;
pub mod service;
pub mod settlement_metrics;

pub use config::SettlementConfig;
pub use error::{Result, SettlementError};
pub use reconciliation::{ReconciliationLog, ReconciliationTicket};
pub use service::{PaymentProof, SettlementService};
pub use settlement_metrics::{SettlementMetrics, SettlementMetricsSnapshot};
