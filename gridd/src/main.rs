mod api;
mod app;
mod config;

use std::{
    env, process,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use log::{error, info};
use settlement::SettlementService;
use slot_space::SlotMetrics;

use crate::{
    api::{ApiServer, ApiState},
    app::{App, AppError},
    config::{AppConfig, Environment},
};

const STATUS_LOG_INTERVAL_SECS: u64 = 30;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        error!("gridd failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = {
        let env = parse_environment()?;
        AppConfig::load(env)?
    };

    let app = app::bootstrap(&config)?;
    info!(
        "gridd booted in {} mode; state at {:?}; {} pages of {}x{} units",
        config.env_label(),
        config.slot_space.state_dir(),
        config.slot_space.total_pages,
        config.slot_space.grid_size,
        config.slot_space.grid_size
    );
    info!(
        "pricing: {} per pixel, {} pixels per unit edge, animated x{}",
        config.slot_space.pricing.rate_per_pixel,
        config.slot_space.pricing.unit_pixels,
        config.slot_space.pricing.animated_multiplier
    );
    // payment proofs are trusted as reported; see ledger.verify_on_chain
    info!("payment proofs accepted without on-chain verification");

    let state = Arc::new(ApiState::new(&app, config.max_body_bytes)?);
    let server = ApiServer::start(state, config.listen_addr)?;
    let status_logger = StatusLogger::spawn(&app, Duration::from_secs(STATUS_LOG_INTERVAL_SECS));
    info!("gridd is running; press Ctrl+C to shut down.");
    wait_for_shutdown_signal()?;
    info!("shutdown signal received; stopping api server...");
    status_logger.shutdown();
    server.shutdown();
    Ok(())
}

fn parse_environment() -> Result<Environment, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Environment::from_str(&arg).map_err(AppError::from)
}

fn wait_for_shutdown_signal() -> Result<(), AppError> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;
    Ok(())
}

/// Logs occupancy and settlement counters on an interval until stopped.
struct StatusLogger {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StatusLogger {
    fn spawn(app: &App, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let slot_metrics = Arc::clone(&app.slot_metrics);
        let settlement = Arc::clone(&app.settlement);
        let handle = thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                log_status(&slot_metrics, &settlement);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                sleep_with_stop(&stop_clone, interval);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusLogger {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn log_status(slot_metrics: &SlotMetrics, settlement: &SettlementService) {
    info!("{}", slot_metrics.snapshot());
    info!(
        "{}; ledger entries={}, reconciliation tickets={}",
        settlement.metrics().snapshot(),
        settlement.ledger().len(),
        settlement.reconciliation().len()
    );
}

fn sleep_with_stop(stop: &AtomicBool, interval: Duration) {
    let mut remaining = interval;
    const STEP: Duration = Duration::from_millis(500);
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let sleep_for = if remaining > STEP { STEP } else { remaining };
        thread::sleep(sleep_for);
        remaining = remaining.saturating_sub(sleep_for);
    }
}
