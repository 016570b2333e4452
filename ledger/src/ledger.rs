use std::collections::HashMap;

use core_types::Mapped;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    config::LedgerConfig,
    error::{LedgerError, Result},
    storage::{LedgerFile, LedgerFileStats},
};

pub const DEFAULT_AMOUNT: &str = "0";

/// A payment proof marked as spent. Written once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hash: String,
    pub network: String,
    pub amount: String,
    pub recorded_at_ns: i64,
}

struct LedgerState {
    entries: Vec<LedgerEntry>,
    by_hash: HashMap<String, usize>,
    file: LedgerFile,
}

/// Hash-keyed record of applied payment proofs.
///
/// The uniqueness check, the durable append, and the in-memory insert all happen under one
/// lock, so of any number of concurrent submissions of a hash exactly one is accepted.
pub struct TransactionLedger {
    config: LedgerConfig,
    state: Mutex<LedgerState>,
}

impl TransactionLedger {
    pub fn bootstrap(config: LedgerConfig) -> Result<(Self, LedgerFileStats)> {
        if config.verify_on_chain {
            return Err(LedgerError::VerificationUnavailable);
        }
        if !config.state_dir().exists() {
            return Err(LedgerError::MissingStateDir {
                path: config.state_dir().to_path_buf(),
            });
        }
        let (file, persisted, stats) = LedgerFile::open(config.ledger_path(), config.sync_writes)?;
        let mut by_hash = HashMap::with_capacity(persisted.len());
        let mut entries = Vec::with_capacity(persisted.len());
        for Mapped { line, record } in persisted {
            if by_hash.insert(record.hash.clone(), entries.len()).is_some() {
                return Err(LedgerError::Corrupt {
                    line,
                    reason: format!("duplicate hash {}", record.hash),
                });
            }
            entries.push(record);
        }
        if !entries.is_empty() {
            info!(
                "ledger: restored {} entries from {}",
                entries.len(),
                stats.path.display()
            );
        }
        Ok((
            Self {
                config,
                state: Mutex::new(LedgerState {
                    entries,
                    by_hash,
                    file,
                }),
            },
            stats,
        ))
    }

    /// Records the proof iff its hash is new. Hash and network are trimmed and must be non-empty;
    /// a missing or blank amount is stored as `"0"`. The amount is not compared to any price.
    pub fn record_if_absent(
        &self,
        hash: &str,
        network: &str,
        amount: Option<&str>,
    ) -> Result<LedgerEntry> {
        let hash = hash.trim();
        if hash.is_empty() {
            return Err(LedgerError::InvalidInput { field: "hash" });
        }
        let network = network.trim();
        if network.is_empty() {
            return Err(LedgerError::InvalidInput { field: "network" });
        }
        let amount = match amount.map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => DEFAULT_AMOUNT,
        };

        let mut state = self.state.lock();
        if state.by_hash.contains_key(hash) {
            warn!("ledger: duplicate transaction {hash} on {network}");
            return Err(LedgerError::Duplicate {
                hash: hash.to_string(),
            });
        }
        let entry = LedgerEntry {
            hash: hash.to_string(),
            network: network.to_string(),
            amount: amount.to_string(),
            recorded_at_ns: OffsetDateTime::now_utc().unix_timestamp_nanos() as i64,
        };
        state.file.append(&entry)?;
        let position = state.entries.len();
        state.entries.push(entry.clone());
        state.by_hash.insert(entry.hash.clone(), position);
        drop(state);
        info!(
            "ledger: recorded {} on {} (amount {})",
            entry.hash, entry.network, entry.amount
        );
        Ok(entry)
    }

    pub fn get(&self, hash: &str) -> Option<LedgerEntry> {
        let state = self.state.lock();
        let position = *state.by_hash.get(hash)?;
        state.entries.get(position).cloned()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.state.lock().by_hash.contains_key(hash)
    }

    /// Every entry in the order it was recorded.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{Arc, Barrier},
        thread,
    };
    use tempfile::tempdir;

    fn ledger(dir: &std::path::Path) -> TransactionLedger {
        let mut config = LedgerConfig::new(dir.to_path_buf());
        config.sync_writes = false;
        TransactionLedger::bootstrap(config).unwrap().0
    }

    #[test]
    fn first_accept_then_duplicate() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        let entry = ledger.record_if_absent("H1", "ETH", Some("5")).unwrap();
        assert_eq!(entry.amount, "5");
        assert!(entry.recorded_at_ns > 0);
        let err = ledger.record_if_absent("H1", "BTC", None).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("H1").unwrap().network, "ETH");
    }

    #[test]
    fn hash_and_network_required() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        assert!(matches!(
            ledger.record_if_absent("  ", "ETH", None),
            Err(LedgerError::InvalidInput { field: "hash" })
        ));
        assert!(matches!(
            ledger.record_if_absent("H", "", None),
            Err(LedgerError::InvalidInput { field: "network" })
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn amount_defaults_and_hash_is_trimmed() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        let entry = ledger.record_if_absent(" 0xabc ", "SOL", Some(" ")).unwrap();
        assert_eq!(entry.hash, "0xabc");
        assert_eq!(entry.amount, DEFAULT_AMOUNT);
        assert!(ledger.record_if_absent("0xabc", "SOL", None).is_err());
        // comparison is exact, not case-folded
        assert!(ledger.record_if_absent("0xABC", "SOL", None).is_ok());
    }

    #[test]
    fn entries_survive_restart() {
        let dir = tempdir().unwrap();
        {
            let ledger = ledger(dir.path());
            ledger.record_if_absent("a", "BTC", Some("0.001")).unwrap();
            ledger.record_if_absent("b", "SUI", None).unwrap();
        }
        let reopened = ledger(dir.path());
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.entries()[0].hash, "a");
        assert!(reopened.record_if_absent("b", "SUI", None).unwrap_err().is_duplicate());
        assert!(reopened.record_if_absent("c", "BASE", None).is_ok());
    }

    #[test]
    fn duplicate_hash_on_disk_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = {
            let ledger = ledger(dir.path());
            ledger.record_if_absent("a", "BTC", None).unwrap();
            ledger.config().ledger_path()
        };
        let mut raw = std::fs::read_to_string(&path).unwrap();
        let line = raw.lines().nth(1).unwrap().to_string();
        // the blank line is skipped on load but still counted
        raw.push('\n');
        raw.push_str(&line);
        raw.push('\n');
        std::fs::write(&path, raw).unwrap();
        let err = TransactionLedger::bootstrap(LedgerConfig::new(dir.path().to_path_buf()))
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::Corrupt { line: 4, .. }));
    }

    #[test]
    fn on_chain_verification_is_refused() {
        let dir = tempdir().unwrap();
        let mut config = LedgerConfig::new(dir.path().to_path_buf());
        config.verify_on_chain = true;
        assert!(matches!(
            TransactionLedger::bootstrap(config),
            Err(LedgerError::VerificationUnavailable)
        ));
    }

    #[test]
    fn concurrent_same_hash_single_accept() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(ledger(dir.path()));
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ledger.record_if_absent("H1", "ETH", Some("5"))
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let accepted = outcomes.iter().filter(|r| r.is_ok()).count();
        let duplicates = outcomes
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::Duplicate { .. })))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(duplicates, workers - 1);
        assert_eq!(ledger.len(), 1);
    }
}
