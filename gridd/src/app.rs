use std::{io, sync::Arc};

use core_types::MappingError;
use ledger::{LedgerError, TransactionLedger};
use log::info;
use settlement::{ReconciliationLog, SettlementMetrics, SettlementService};
use slot_space::{AllocationService, GridIndex, SlotMetrics, SlotSpaceError};
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("usage: gridd <dev|prod>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    SlotSpace(#[from] SlotSpaceError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("reconciliation log: {0}")]
    Reconciliation(MappingError),
    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics::MetricsError),
    #[error("api server: {0}")]
    Server(io::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed while waiting for shutdown signal: {0}")]
    ShutdownWait(#[from] std::sync::mpsc::RecvError),
}

/// Fully wired service state, shared by the API server and the status logger.
pub struct App {
    pub settlement: Arc<SettlementService>,
    pub slot_metrics: Arc<SlotMetrics>,
}

pub fn bootstrap(config: &AppConfig) -> Result<App, AppError> {
    config.slot_space.ensure_dirs()?;
    let slot_metrics = SlotMetrics::new(config.slot_space.total_pages, config.slot_space.grid_size);
    let (grid, grid_report) = GridIndex::bootstrap(&config.slot_space, Some(slot_metrics.clone()))?;
    info!(
        "allocation store: {} ({} allocations)",
        grid_report.path.display(),
        grid_report.allocations_loaded
    );
    let allocations = AllocationService::new(
        Arc::new(grid),
        config.slot_space.pricing,
        config.slot_space.max_title_chars,
        Some(slot_metrics.clone()),
    );

    let (ledger, ledger_stats) = TransactionLedger::bootstrap(config.ledger.clone())?;
    info!(
        "ledger file: {} ({}, {} entries)",
        ledger_stats.path.display(),
        if ledger_stats.created { "created" } else { "existing" },
        ledger_stats.entries_loaded
    );

    let reconciliation = ReconciliationLog::open(
        config.settlement.reconciliation_path(),
        config.settlement.sync_writes,
    )
    .map_err(AppError::Reconciliation)?;

    let settlement = SettlementService::new(
        Arc::new(allocations),
        Arc::new(ledger),
        Arc::new(reconciliation),
        SettlementMetrics::new(),
    )
    .with_precheck(config.settlement.precheck);

    Ok(App {
        settlement: Arc::new(settlement),
        slot_metrics,
    })
}
