use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::Result;

pub const DEFAULT_STATE_DIR: &str = "gridd.state";

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub state_dir: PathBuf,
    pub sync_writes: bool,
    /// Proofs are accepted as reported while this is false. No verifier exists to honor `true`.
    pub verify_on_chain: bool,
}

impl LedgerConfig {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            sync_writes: true,
            verify_on_chain: false,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("ledger.map")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}
