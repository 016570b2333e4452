use std::{fmt, io, path::Path};

use core_types::{MappingError, MappingStore};
use ledger::LedgerEntry;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slot_space::{PageId, Rect};
use time::OffsetDateTime;

/// A payment that was spent in the ledger but never turned into an allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTicket {
    pub id: u64,
    pub hash: String,
    pub network: String,
    pub amount: String,
    pub page: PageId,
    pub rect: Rect,
    pub reason: String,
    pub recorded_at_ns: i64,
}

impl fmt::Display for ReconciliationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ticket #{} for {} {} (page {}, {}): {}",
            self.id, self.network, self.hash, self.page, self.rect, self.reason
        )
    }
}

struct LogState {
    store: MappingStore<ReconciliationTicket>,
    tickets: Vec<ReconciliationTicket>,
}

/// Durable list of spent-but-unfulfilled payments awaiting manual review.
pub struct ReconciliationLog {
    state: Mutex<LogState>,
}

impl ReconciliationLog {
    pub fn open(path: impl AsRef<Path>, sync_writes: bool) -> Result<Self, MappingError> {
        let (store, persisted) = MappingStore::open(path, sync_writes)?;
        let tickets: Vec<ReconciliationTicket> =
            persisted.into_iter().map(|mapped| mapped.record).collect();
        if !tickets.is_empty() {
            info!(
                "settlement: {} reconciliation tickets outstanding in {}",
                tickets.len(),
                store.path().display()
            );
        }
        Ok(Self {
            state: Mutex::new(LogState { store, tickets }),
        })
    }

    pub fn record(
        &self,
        entry: &LedgerEntry,
        page: PageId,
        rect: Rect,
        reason: impl Into<String>,
    ) -> io::Result<ReconciliationTicket> {
        let mut state = self.state.lock();
        let ticket = ReconciliationTicket {
            id: state.tickets.len() as u64 + 1,
            hash: entry.hash.clone(),
            network: entry.network.clone(),
            amount: entry.amount.clone(),
            page,
            rect,
            reason: reason.into(),
            recorded_at_ns: OffsetDateTime::now_utc().unix_timestamp_nanos() as i64,
        };
        state.store.append(&ticket)?;
        state.tickets.push(ticket.clone());
        Ok(ticket)
    }

    pub fn list(&self) -> Vec<ReconciliationTicket> {
        self.state.lock().tickets.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
