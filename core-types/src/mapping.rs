// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Append-only JSON-lines files backing the allocation, ledger and reconciliation stores.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use log::error;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{}:{line}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A record together with the 1-based file line it was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapped<T> {
    pub line: usize,
    pub record: T,
}

/// Records are never rewritten or removed. A failed append is cut back off the file; if that
/// fails too the store is poisoned and refuses further appends.
pub struct MappingStore<T> {
    path: PathBuf,
    file: File,
    sync_writes: bool,
    len: usize,
    poisoned: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MappingStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Opens (creating if needed) the store and returns every record already on disk.
    pub fn open(
        path: impl AsRef<Path>,
        sync_writes: bool,
    ) -> Result<(Self, Vec<Mapped<T>>), MappingError> {
        let path = path.as_ref().to_path_buf();
        let records = read_lines(&path)?
            .into_iter()
            .map(|(line, raw)| decode(&path, line, &raw))
            .collect::<Result<Vec<_>, _>>()?;
        let file = open_append(&path)?;
        Ok((Self::with_file(path, file, sync_writes, records.len()), records))
    }

    /// Like [`MappingStore::open`], but the first line holds a header of type `H`. An empty file
    /// gets `new_header()` written and synced before anything else.
    pub fn open_with_header<H, F>(
        path: impl AsRef<Path>,
        sync_writes: bool,
        new_header: F,
    ) -> Result<(Self, Mapped<H>, Vec<Mapped<T>>), MappingError>
    where
        H: Serialize + DeserializeOwned,
        F: FnOnce() -> H,
    {
        let path = path.as_ref().to_path_buf();
        let mut lines = read_lines(&path)?.into_iter();
        let Some((line, raw)) = lines.next() else {
            let header = new_header();
            let mut file = open_append(&path)?;
            file.set_len(0)?;
            file.write_all(&encode(&header)?)?;
            file.sync_data()?;
            let header = Mapped {
                line: 1,
                record: header,
            };
            return Ok((Self::with_file(path, file, sync_writes, 0), header, Vec::new()));
        };
        let header = decode(&path, line, &raw)?;
        let records = lines
            .map(|(line, raw)| decode(&path, line, &raw))
            .collect::<Result<Vec<_>, _>>()?;
        let file = open_append(&path)?;
        Ok((
            Self::with_file(path, file, sync_writes, records.len()),
            header,
            records,
        ))
    }

    fn with_file(path: PathBuf, file: File, sync_writes: bool, len: usize) -> Self {
        Self {
            path,
            file,
            sync_writes,
            len,
            poisoned: false,
            _marker: PhantomData,
        }
    }

    /// Writes one record; returns the number of records now in the store. On error nothing of
    /// the record remains in the file.
    pub fn append(&mut self, record: &T) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} refused append after an unrecoverable write failure",
                    self.path.display()
                ),
            ));
        }
        let line = encode(record)?;
        let start = self.file.metadata()?.len();
        if let Err(err) = self.write_line(&line) {
            self.rollback(start);
            return Err(err);
        }
        self.len += 1;
        Ok(self.len)
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn rollback(&mut self, len: u64) {
        if let Err(err) = self.file.set_len(len) {
            error!(
                "mapping: cannot truncate {} back to {len} bytes: {err}; store poisoned",
                self.path.display()
            );
            self.poisoned = true;
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Non-blank lines with their 1-based line numbers.
fn read_lines(path: &Path) -> io::Result<Vec<(usize, String)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push((idx + 1, line));
        }
    }
    Ok(lines)
}

fn decode<R: DeserializeOwned>(path: &Path, line: usize, raw: &str) -> Result<Mapped<R>, MappingError> {
    serde_json::from_str(raw)
        .map(|record| Mapped { line, record })
        .map_err(|err| MappingError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason: err.to_string(),
        })
}

fn encode<R: Serialize>(record: &R) -> io::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    line.push(b'\n');
    Ok(line)
}
