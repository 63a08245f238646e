// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! Represents the storage trait and example implementations.
//!
//! The ledger keeps its index in memory; a [`Storage`] is where votes are
//! kept durably. A vote is visible in the ledger only after `append` returned
//! `Ok`, so an implementation must not report success before the vote would
//! survive a restart.

use crate::errors::{Error, Result, StorageError};
use crate::vote::Vote;
use slog::Logger;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// File name of the vote log inside the data directory.
pub const VOTE_LOG_FILE: &str = "votes.jsonl";

/// Storage saves all the votes a ledger has accepted.
///
/// If any Storage method returns an error, the ledger will refuse the vote
/// and leave its index untouched.
pub trait Storage {
    /// Every vote persisted so far, in the order it was appended. Called once
    /// when a ledger is built on top of the storage.
    fn initial_votes(&self) -> Result<Vec<Vote>>;

    /// Durably adds one vote.
    fn append(&self, vote: &Vote) -> Result<()>;
}

/// The Memory Storage Core instance holds the actual state of the storage struct. To access this
/// value, use the `rl` and `wl` functions on the main MemStorage implementation.
#[derive(Default)]
pub struct MemStorageCore {
    votes: Vec<Vote>,
    // Fail the next append, for testing.
    trigger_append_unavailable: bool,
}

impl MemStorageCore {
    /// All votes appended so far.
    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    /// Seeds the storage with votes as if they had been appended before a
    /// restart. No duplicate check is performed.
    pub fn extend(&mut self, votes: impl IntoIterator<Item = Vote>) {
        self.votes.extend(votes);
    }

    /// Make the next append return `StorageError::Unavailable`.
    pub fn trigger_append_unavailable(&mut self) {
        self.trigger_append_unavailable = true;
    }
}

/// `MemStorage` is a thread-safe but incomplete implementation of `Storage`, mainly for tests.
///
/// A real `Storage` should save votes to disk; see [`FileStorage`].
///
/// When in doubt, use the `rl` and `wl` functions to get a read or write lock
/// of the underlying `MemStorageCore`. Clones share the same core.
#[derive(Clone, Default)]
pub struct MemStorage {
    core: Arc<RwLock<MemStorageCore>>,
}

impl MemStorage {
    /// Returns a new, empty memory storage.
    pub fn new() -> MemStorage {
        MemStorage {
            ..Default::default()
        }
    }

    /// Create a new `MemStorage` holding the given votes.
    pub fn new_with_votes(votes: Vec<Vote>) -> MemStorage {
        let store = MemStorage::new();
        store.wl().extend(votes);
        store
    }

    /// Opens up a read lock on the storage and returns a guard handle. Use this
    /// with functions that don't require mutation.
    pub fn rl(&self) -> RwLockReadGuard<'_, MemStorageCore> {
        self.core.read().unwrap()
    }

    /// Opens up a write lock on the storage and returns guard handle. Use this
    /// with functions that take a mutable reference to self.
    pub fn wl(&self) -> RwLockWriteGuard<'_, MemStorageCore> {
        self.core.write().unwrap()
    }
}

impl Storage for MemStorage {
    fn initial_votes(&self) -> Result<Vec<Vote>> {
        Ok(self.rl().votes.clone())
    }

    fn append(&self, vote: &Vote) -> Result<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("storage::append", |_| Err(Error::Store(
            StorageError::Unavailable
        )));

        let mut core = self.wl();
        if core.trigger_append_unavailable {
            core.trigger_append_unavailable = false;
            return Err(Error::Store(StorageError::Unavailable));
        }
        core.votes.push(vote.clone());
        Ok(())
    }
}

/// An append-only JSON-lines vote log on disk.
///
/// Each line of `<data_dir>/votes.jsonl` holds one serialized [`Vote`]. A
/// trailing line without a newline is the remains of an interrupted write;
/// it is dropped when it does not parse.
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<File>,
    recovered: Vec<Vote>,
    sync_writes: bool,
    logger: Logger,
}

impl FileStorage {
    /// Opens (creating if needed) the vote log under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P, sync_writes: bool, logger: &Logger) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(VOTE_LOG_FILE);
        let logger = logger.new(o!("vote_log" => path.display().to_string()));

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (recovered, keep) = parse_log(&data)?;
        if keep < data.len() {
            warn!(
                logger,
                "dropping torn write at end of vote log";
                "offset" => keep,
                "bytes" => data.len() - keep,
            );
            file.set_len(keep as u64)?;
            file.sync_all()?;
        } else if !data.is_empty() && data[data.len() - 1] != b'\n' {
            // The last vote made it to disk but its newline did not.
            file.write_all(b"\n")?;
            file.sync_all()?;
        }

        info!(logger, "opened vote log"; "votes" => recovered.len());
        Ok(FileStorage {
            path,
            file: Mutex::new(file),
            recovered,
            sync_writes,
            logger,
        })
    }

    /// Location of the vote log.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn initial_votes(&self) -> Result<Vec<Vote>> {
        Ok(self.recovered.clone())
    }

    fn append(&self, vote: &Vote) -> Result<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("storage::append", |_| Err(Error::Store(
            StorageError::Unavailable
        )));

        let mut line = serde_json::to_vec(vote)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| Error::Store(StorageError::Unavailable))?;
        let len = file.metadata()?.len();
        if let Err(e) = file.write_all(&line).and_then(|_| self.sync(&file)) {
            error!(self.logger, "failed to append vote"; "vote" => %vote, "err" => %e);
            // A refused vote must not come back on the next open, whether
            // none, part or all of its line was written.
            file.set_len(len)?;
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

impl FileStorage {
    fn sync(&self, file: &File) -> io::Result<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("storage::append::after_write", |_| Err(io::Error::new(
            io::ErrorKind::Other,
            "injected sync failure"
        )));

        if self.sync_writes {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// Parses a vote log. Returns the votes and the length of the prefix that
/// should be kept; anything past it is a torn final line.
fn parse_log(data: &[u8]) -> Result<(Vec<Vote>, usize)> {
    let mut votes = Vec::new();
    let mut offset = 0;
    let mut lineno = 0;
    while offset < data.len() {
        lineno += 1;
        let (line, next, terminated) = match data[offset..].iter().position(|b| *b == b'\n') {
            Some(pos) => (&data[offset..offset + pos], offset + pos + 1, true),
            None => (&data[offset..], data.len(), false),
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            offset = next;
            continue;
        }
        match serde_json::from_slice::<Vote>(line) {
            Ok(vote) => votes.push(vote),
            Err(_) if !terminated => return Ok((votes, offset)),
            Err(e) => {
                return Err(Error::Store(StorageError::Corrupted(format!(
                    "line {}: {}",
                    lineno, e
                ))))
            }
        }
        offset = next;
    }
    Ok((votes, data.len()))
}
