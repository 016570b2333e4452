use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct SettlementConfig {
    pub state_dir: PathBuf,
    pub sync_writes: bool,
    /// Check the selection against the grid before spending the proof.
    pub precheck: bool,
}

impl SettlementConfig {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            sync_writes: true,
            precheck: true,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn reconciliation_path(&self) -> PathBuf {
        self.state_dir.join("reconciliation.map")
    }
}
