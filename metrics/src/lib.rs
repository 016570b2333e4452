// Copyright (c) James Kassemi, SC, US. All rights reserved.
//! Prometheus text rendering of slot, settlement and ledger state.
use prometheus::{Encoder, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use settlement::SettlementMetricsSnapshot;
use slot_space::{PageCountsSnapshot, SlotMetricsSnapshot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Point-in-time inputs for one scrape.
pub struct ScrapeInputs<'a> {
    pub slots: &'a SlotMetricsSnapshot,
    pub settlement: &'a SettlementMetricsSnapshot,
    pub ledger_entries: usize,
    pub reconciliation_tickets: usize,
}

/// Owns a private registry so scrapes never see gauges registered elsewhere in the process.
pub struct MetricsExporter {
    registry: Registry,
    page_allocations: IntGaugeVec,
    page_units: IntGaugeVec,
    page_occupancy: GaugeVec,
    previews: IntGaugeVec,
    insert_conflicts: IntGauge,
    settlement_outcomes: IntGaugeVec,
    ledger_entries: IntGauge,
    reconciliation_tickets: IntGauge,
}

impl MetricsExporter {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let page_allocations = IntGaugeVec::new(
            Opts::new("gridd_page_allocations", "Committed allocations per page"),
            &["page"],
        )?;
        registry.register(Box::new(page_allocations.clone()))?;
        let page_units = IntGaugeVec::new(
            Opts::new("gridd_page_units", "Grid units covered by allocations per page"),
            &["page"],
        )?;
        registry.register(Box::new(page_units.clone()))?;
        let page_occupancy = GaugeVec::new(
            Opts::new(
                "gridd_page_occupancy_ratio",
                "Fraction of a page's grid units that are allocated",
            ),
            &["page"],
        )?;
        registry.register(Box::new(page_occupancy.clone()))?;
        let previews = IntGaugeVec::new(
            Opts::new("gridd_previews_total", "Selection previews by validity"),
            &["result"],
        )?;
        registry.register(Box::new(previews.clone()))?;
        let insert_conflicts = IntGauge::with_opts(Opts::new(
            "gridd_insert_conflicts_total",
            "Grid inserts rejected because the rect was taken under the page lock",
        ))?;
        registry.register(Box::new(insert_conflicts.clone()))?;
        let settlement_outcomes = IntGaugeVec::new(
            Opts::new("gridd_settlement_outcomes_total", "Settlement outcomes by kind"),
            &["outcome"],
        )?;
        registry.register(Box::new(settlement_outcomes.clone()))?;
        let ledger_entries = IntGauge::with_opts(Opts::new(
            "gridd_ledger_entries",
            "Payment proofs recorded in the ledger",
        ))?;
        registry.register(Box::new(ledger_entries.clone()))?;
        let reconciliation_tickets = IntGauge::with_opts(Opts::new(
            "gridd_reconciliation_tickets",
            "Spent payments awaiting reconciliation",
        ))?;
        registry.register(Box::new(reconciliation_tickets.clone()))?;
        Ok(Self {
            registry,
            page_allocations,
            page_units,
            page_occupancy,
            previews,
            insert_conflicts,
            settlement_outcomes,
            ledger_entries,
            reconciliation_tickets,
        })
    }

    pub fn render(&self, inputs: ScrapeInputs<'_>) -> Result<Vec<u8>, MetricsError> {
        self.record_pages(inputs.slots);
        let slots = inputs.slots;
        let accepted = slots.previews.saturating_sub(slots.preview_rejections);
        self.previews
            .with_label_values(&["valid"])
            .set(accepted as i64);
        self.previews
            .with_label_values(&["invalid"])
            .set(slots.preview_rejections as i64);
        self.insert_conflicts.set(slots.insert_conflicts as i64);
        self.record_settlement(inputs.settlement);
        self.ledger_entries.set(inputs.ledger_entries as i64);
        self.reconciliation_tickets
            .set(inputs.reconciliation_tickets as i64);

        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    fn record_pages(&self, snapshot: &SlotMetricsSnapshot) {
        // empty pages are skipped to keep label cardinality proportional to use
        for counts in snapshot.pages.iter().filter(|p| p.allocations > 0) {
            let PageCountsSnapshot {
                page,
                allocations,
                units,
            } = *counts;
            let label = page.to_string();
            self.page_allocations
                .with_label_values(&[label.as_str()])
                .set(allocations as i64);
            self.page_units
                .with_label_values(&[label.as_str()])
                .set(units as i64);
            self.page_occupancy
                .with_label_values(&[label.as_str()])
                .set(snapshot.occupancy(page));
        }
    }

    fn record_settlement(&self, snapshot: &SettlementMetricsSnapshot) {
        let outcomes = [
            ("committed", snapshot.committed),
            ("rejected", snapshot.rejected),
            ("duplicate_payment", snapshot.duplicate_payments),
            ("slot_taken", snapshot.slot_taken),
            ("slot_taken_after_payment", snapshot.spent_unfulfilled),
            ("internal_error", snapshot.internal_errors),
        ];
        for (outcome, value) in outcomes {
            self.settlement_outcomes
                .with_label_values(&[outcome])
                .set(value as i64);
        }
    }
}
