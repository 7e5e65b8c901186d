//! Append-only ledger of consumed payment proofs.
//!
//! `tx_hash` uniqueness here is the sole replay-protection mechanism: a
//! record is inserted at most once per hash for the lifetime of the store.
//! [`Ledger::try_commit`] is a keyed atomic insert-if-absent; callers make
//! authorization decisions from its return value alone, never from a
//! separate existence check.
//!
//! Two implementations: [`MemoryLedger`] for tests and ephemeral runs, and
//! [`JsonlLedger`] which pairs the in-memory index with an append-only
//! JSON-lines file replayed on open, so the consumed set survives restart.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::proof::TxHash;
use crate::timestamp::UnixTimestamp;
use crate::util::MoneyAmount;

/// One consumed proof. Written exactly once, never mutated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub tx_hash: TxHash,
    pub amount: MoneyAmount,
    pub sender: String,
    pub resource: String,
    pub verified_at: UnixTimestamp,
}

/// Outcome of an insert-if-absent attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryCommit {
    /// The record was written; this caller spent the hash.
    Committed,
    /// The hash was already consumed; replay.
    AlreadyExists,
}

/// Ledger I/O failure. Deliberately distinct from [`TryCommit::AlreadyExists`]:
/// a failed write must never read as a replay, or fresh payments would be
/// silently rejected.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Ledger record is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Ledger lock poisoned")]
    Poisoned,
}

/// Capability interface for the consumed-proof store. The dispatcher depends
/// on this seam, not on a concrete backend.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomic insert-if-absent keyed by `tx_hash`. Two callers racing on the
    /// same hash see exactly one `Committed`; unrelated hashes never
    /// serialize against each other.
    async fn try_commit(&self, record: PaymentRecord) -> Result<TryCommit, StorageError>;

    /// Diagnostics only. Authorization goes through `try_commit`.
    async fn contains(&self, tx_hash: &TxHash) -> Result<bool, StorageError>;

    /// Snapshot of all records. A commit racing the snapshot may or may not
    /// be visible; iteration itself is always safe.
    async fn all_records(&self) -> Result<Vec<PaymentRecord>, StorageError>;
}

/// Purely in-memory ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    index: DashMap<TxHash, PaymentRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn try_commit(&self, record: PaymentRecord) -> Result<TryCommit, StorageError> {
        match self.index.entry(record.tx_hash.clone()) {
            Entry::Occupied(_) => Ok(TryCommit::AlreadyExists),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(TryCommit::Committed)
            }
        }
    }

    async fn contains(&self, tx_hash: &TxHash) -> Result<bool, StorageError> {
        Ok(self.index.contains_key(tx_hash))
    }

    async fn all_records(&self) -> Result<Vec<PaymentRecord>, StorageError> {
        Ok(self.index.iter().map(|entry| entry.value().clone()).collect())
    }
}

/// Durable ledger: `DashMap` index over an append-only JSON-lines file.
///
/// The index answers replay questions; the file is the source of truth
/// across restarts. One JSON object per line, replayed on open.
pub struct JsonlLedger {
    index: DashMap<TxHash, PaymentRecord>,
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonlLedger {
    /// Opens (or creates) the ledger file and replays it into the index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let index = DashMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: PaymentRecord = serde_json::from_str(&line)?;
                index.insert(record.tx_hash.clone(), record);
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), records = index.len(), "Ledger opened");
        Ok(Self {
            index,
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &PaymentRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().map_err(|_| StorageError::Poisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for JsonlLedger {
    async fn try_commit(&self, record: PaymentRecord) -> Result<TryCommit, StorageError> {
        // Claim the hash in the index first; the entry API makes the claim
        // atomic per shard. The file append follows outside the entry guard
        // so no shard lock is held across I/O.
        match self.index.entry(record.tx_hash.clone()) {
            Entry::Occupied(_) => return Ok(TryCommit::AlreadyExists),
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
            }
        }
        if let Err(e) = self.append(&record) {
            // Release the claim so a later attempt can still commit.
            self.index.remove(&record.tx_hash);
            return Err(e);
        }
        Ok(TryCommit::Committed)
    }

    async fn contains(&self, tx_hash: &TxHash) -> Result<bool, StorageError> {
        Ok(self.index.contains_key(tx_hash))
    }

    async fn all_records(&self) -> Result<Vec<PaymentRecord>, StorageError> {
        Ok(self.index.iter().map(|entry| entry.value().clone()).collect())
    }
}
