use std::sync::Arc;

use ledger::TransactionLedger;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use slot_space::{
    Allocation, AllocationError, AllocationService, ContentInput, Draft, GridError,
    NewAllocation, PageId, Rect, SelectionIssue,
};

use crate::{
    error::{Result, SettlementError},
    reconciliation::ReconciliationLog,
    settlement_metrics::SettlementMetrics,
};

/// Payment proof as reported by the wallet layer. Trusted; see [`ledger`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentProof {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub amount: Option<String>,
}

impl PaymentProof {
    pub fn new(hash: impl Into<String>, network: impl Into<String>, amount: Option<&str>) -> Self {
        Self {
            hash: hash.into(),
            network: network.into(),
            amount: amount.map(str::to_string),
        }
    }
}

pub struct SettlementService {
    allocations: Arc<AllocationService>,
    ledger: Arc<TransactionLedger>,
    reconciliation: Arc<ReconciliationLog>,
    metrics: Arc<SettlementMetrics>,
    precheck: bool,
}

impl SettlementService {
    pub fn new(
        allocations: Arc<AllocationService>,
        ledger: Arc<TransactionLedger>,
        reconciliation: Arc<ReconciliationLog>,
        metrics: Arc<SettlementMetrics>,
    ) -> Self {
        Self {
            allocations,
            ledger,
            reconciliation,
            metrics,
            precheck: true,
        }
    }

    /// With the precheck off the proof is always spent before the grid is consulted.
    pub fn with_precheck(mut self, precheck: bool) -> Self {
        self.precheck = precheck;
        self
    }

    pub fn allocations(&self) -> &Arc<AllocationService> {
        &self.allocations
    }

    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    pub fn reconciliation(&self) -> &Arc<ReconciliationLog> {
        &self.reconciliation
    }

    pub fn metrics(&self) -> &Arc<SettlementMetrics> {
        &self.metrics
    }

    /// Drafts and commits in one call. A proof the ledger already holds is answered with
    /// [`SettlementError::DuplicatePayment`] before the selection is looked at.
    pub fn settle(
        &self,
        page: PageId,
        rect: Rect,
        content: &ContentInput,
        animated: bool,
        proof: &PaymentProof,
    ) -> Result<Allocation> {
        if let Some(err) = self.replayed(proof) {
            self.metrics.record_duplicate();
            return Err(err);
        }
        let drafted = if self.precheck {
            self.allocations.finalize_draft(page, rect, content, animated)
        } else {
            self.allocations
                .finalize_draft_ignoring_occupancy(page, rect, content, animated)
        };
        let draft = match drafted {
            Ok(draft) => draft,
            Err(AllocationError::InvalidSelection {
                page,
                rect,
                issue: SelectionIssue::Occupied,
            }) => {
                self.metrics.record_slot_taken();
                return Err(SettlementError::SlotTaken { page, rect });
            }
            Err(err) => {
                self.metrics.record_rejected();
                return Err(err.into());
            }
        };
        self.commit(&draft, proof)
    }

    /// Early answer for an already spent proof. `record_if_absent` remains the authority.
    fn replayed(&self, proof: &PaymentProof) -> Option<SettlementError> {
        let hash = proof.hash.trim();
        if hash.is_empty() || !self.ledger.contains(hash) {
            return None;
        }
        warn!("settlement: replayed proof {hash} on {}", proof.network.trim());
        Some(SettlementError::DuplicatePayment {
            hash: hash.to_string(),
        })
    }

    /// Spends `proof` and commits the draft against the grid as it is now.
    ///
    /// A selection that is already taken before the proof is touched fails with
    /// [`SettlementError::SlotTaken`] and spends nothing. Once the ledger has accepted the proof
    /// it stays spent; losing the insert after that point files a reconciliation ticket.
    pub fn commit(&self, draft: &Draft, proof: &PaymentProof) -> Result<Allocation> {
        let result = self.try_commit(draft, proof);
        match &result {
            Ok(_) => self.metrics.record_committed(),
            Err(SettlementError::DuplicatePayment { .. }) => self.metrics.record_duplicate(),
            Err(SettlementError::SlotTaken { .. }) => self.metrics.record_slot_taken(),
            Err(SettlementError::SlotTakenAfterPayment { .. }) => {
                self.metrics.record_spent_unfulfilled()
            }
            Err(SettlementError::Internal(_)) => self.metrics.record_internal(),
            Err(_) => self.metrics.record_rejected(),
        }
        result
    }

    fn try_commit(&self, draft: &Draft, proof: &PaymentProof) -> Result<Allocation> {
        if proof.hash.trim().is_empty() {
            return Err(SettlementError::Validation { field: "hash" });
        }
        if proof.network.trim().is_empty() {
            return Err(SettlementError::Validation { field: "network" });
        }
        if let Some(err) = self.replayed(proof) {
            return Err(err);
        }
        let page = draft.page();
        let rect = draft.rect();
        match self.allocations.selection_issue(page, &rect) {
            None => {}
            Some(SelectionIssue::Occupied) if !self.precheck => {}
            Some(SelectionIssue::Occupied) => {
                warn!("settlement: {rect} on page {page} already taken, proof not spent");
                return Err(SettlementError::SlotTaken { page, rect });
            }
            Some(issue) => return Err(SettlementError::InvalidSelection { page, rect, issue }),
        }

        let entry = self
            .ledger
            .record_if_absent(&proof.hash, &proof.network, proof.amount.as_deref())?;

        let new = NewAllocation {
            content: draft.content().clone(),
            animated: draft.animated(),
            proof_hash: entry.hash.clone(),
        };
        match self.allocations.grid().insert(page, rect, new) {
            Ok(allocation) => {
                info!(
                    "settlement: allocation {} committed on page {} at {} for {} {}",
                    allocation.id, page, rect, entry.network, entry.hash
                );
                Ok(allocation)
            }
            Err(err) => {
                let lost_race = matches!(err, GridError::Conflict { .. });
                let ticket = self
                    .reconciliation
                    .record(&entry, page, rect, err.to_string())
                    .map_err(|io_err| {
                        error!(
                            "settlement: payment {} on {} spent without allocation ({err}); \
                             reconciliation ticket could not be written: {io_err}",
                            entry.hash, entry.network
                        );
                        SettlementError::Internal(io_err.to_string())
                    })?;
                error!("settlement: payment spent without allocation, {ticket}");
                if lost_race {
                    Err(SettlementError::SlotTakenAfterPayment { ticket })
                } else {
                    Err(SettlementError::Internal(err.to_string()))
                }
            }
        }
    }
}
