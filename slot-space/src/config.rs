use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    content::MAX_TITLE_CHARS,
    error::Result,
    rect::{Pricing, GRID_SIZE, TOTAL_PAGES},
};

pub const DEFAULT_BUCKET_SIZE: u32 = 16;
pub const DEFAULT_STATE_DIR: &str = "gridd.state";

#[derive(Clone, Debug)]
pub struct SlotSpaceConfig {
    pub state_dir: PathBuf,
    pub grid_size: u32,
    pub total_pages: u32,
    pub bucket_size: u32,
    pub pricing: Pricing,
    pub max_title_chars: usize,
    pub sync_writes: bool,
}

impl SlotSpaceConfig {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            grid_size: GRID_SIZE,
            total_pages: TOTAL_PAGES,
            bucket_size: DEFAULT_BUCKET_SIZE,
            pricing: Pricing::default(),
            max_title_chars: MAX_TITLE_CHARS,
            sync_writes: true,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn allocations_path(&self) -> PathBuf {
        self.state_dir.join("allocations.map")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}
