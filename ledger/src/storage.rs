use std::{
    io,
    path::{Path, PathBuf},
};

use core_types::{Mapped, MappingStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    error::{LedgerError, Result},
    ledger::LedgerEntry,
};

const LEDGER_MAGIC: &str = "GRIDLEDGR";
const LEDGER_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug)]
pub struct LedgerFileStats {
    pub path: PathBuf,
    pub created: bool,
    pub entries_loaded: usize,
    pub created_at_s: i64,
}

/// First line of every ledger file.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFileHeader {
    magic: String,
    schema_version: u32,
    created_at_s: i64,
}

impl LedgerFileHeader {
    fn new() -> Self {
        Self {
            magic: LEDGER_MAGIC.to_string(),
            schema_version: LEDGER_SCHEMA_VERSION,
            created_at_s: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != LEDGER_MAGIC {
            return Err(format!("unexpected magic {:?}", self.magic));
        }
        if self.schema_version != LEDGER_SCHEMA_VERSION {
            return Err(format!(
                "ledger schema mismatch (file={}, expected={})",
                self.schema_version, LEDGER_SCHEMA_VERSION
            ));
        }
        Ok(())
    }
}

/// Header line followed by one JSON entry per line. Entries are only ever appended.
pub struct LedgerFile {
    store: MappingStore<LedgerEntry>,
}

impl LedgerFile {
    pub fn open(
        path: impl AsRef<Path>,
        sync_writes: bool,
    ) -> Result<(Self, Vec<Mapped<LedgerEntry>>, LedgerFileStats)> {
        let path = path.as_ref().to_path_buf();
        let created = !path.exists() || path.metadata()?.len() == 0;
        let (store, header, entries) =
            MappingStore::open_with_header(&path, sync_writes, LedgerFileHeader::new)?;
        let Mapped { line, record: header } = header;
        header
            .validate()
            .map_err(|reason| LedgerError::Corrupt { line, reason })?;
        let stats = LedgerFileStats {
            path,
            created,
            entries_loaded: entries.len(),
            created_at_s: header.created_at_s,
        };
        Ok((Self { store }, entries, stats))
    }

    /// On error the file is left as it was before the call.
    pub fn append(&mut self, entry: &LedgerEntry) -> io::Result<()> {
        self.store.append(entry).map(|_| ())
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }
}
