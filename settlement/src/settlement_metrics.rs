use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

#[derive(Default)]
pub struct SettlementMetrics {
    committed: AtomicU64,
    rejected: AtomicU64,
    duplicate_payments: AtomicU64,
    slot_taken: AtomicU64,
    spent_unfulfilled: AtomicU64,
    internal_errors: AtomicU64,
}

impl SettlementMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_payments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_taken(&self) {
        self.slot_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spent_unfulfilled(&self) {
        self.spent_unfulfilled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_internal(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SettlementMetricsSnapshot {
        SettlementMetricsSnapshot {
            committed: self.committed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            duplicate_payments: self.duplicate_payments.load(Ordering::Relaxed),
            slot_taken: self.slot_taken.load(Ordering::Relaxed),
            spent_unfulfilled: self.spent_unfulfilled.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettlementMetricsSnapshot {
    pub committed: u64,
    pub rejected: u64,
    pub duplicate_payments: u64,
    pub slot_taken: u64,
    pub spent_unfulfilled: u64,
    pub internal_errors: u64,
}

impl fmt::Display for SettlementMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "settlement: committed={} rejected={} duplicates={} slot_taken={} spent_unfulfilled={} internal={}",
            self.committed,
            self.rejected,
            self.duplicate_payments,
            self.slot_taken,
            self.spent_unfulfilled,
            self.internal_errors
        )
    }
}
