//! # Ledger Store
//!
//! Snapshot persistence on sled. The ledger itself is an in-memory state
//! machine; hosts persist it after applying calls and restore it on start.
//!
//! ## Tree Layout
//!
//! | Tree        | Key              | Value                |
//! |-------------|------------------|----------------------|
//! | `snapshots` | `seq` (8B BE)    | `bincode(ClearNet)`  |
//! | `metadata`  | key (UTF-8)      | value (bytes)        |
//!
//! Sequence numbers are big-endian so sled's key order matches numeric
//! order. Earlier snapshots are kept, giving a history of ledger states.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::debug;

use crate::ledger::ClearNet;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

const META_LATEST_SEQ: &[u8] = b"latest_snapshot_seq";

/// Append-only snapshot store.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: Db,
    snapshots: Tree,
    metadata: Tree,
}

impl LedgerStore {
    /// Opens or creates a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store removed on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let snapshots = db.open_tree("snapshots")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            snapshots,
            metadata,
        })
    }

    /// Writes a new snapshot and returns its sequence number. The snapshot and
    /// the latest-sequence pointer commit in one transaction, flushed before
    /// returning.
    pub fn save(&self, ledger: &ClearNet) -> StoreResult<u64> {
        let seq = match self.latest_seq()? {
            Some(seq) => seq + 1,
            None => 0,
        };
        let bytes =
            bincode::serialize(ledger).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let key = seq.to_be_bytes();

        (&self.snapshots, &self.metadata)
            .transaction(|(snapshots, metadata)| {
                snapshots.insert(&key[..], bytes.as_slice())?;
                metadata.insert(META_LATEST_SEQ, &key[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(err) => StoreError::Sled(err),
                TransactionError::Abort(()) => {
                    StoreError::Serialization("snapshot transaction aborted".to_string())
                }
            })?;
        self.db.flush()?;

        debug!(seq, "snapshot saved");
        Ok(seq)
    }

    /// Sequence number of the newest snapshot, if any.
    pub fn latest_seq(&self) -> StoreResult<Option<u64>> {
        match self.metadata.get(META_LATEST_SEQ)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::Serialization("invalid sequence bytes".to_string()))?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Loads the snapshot stored under `seq`.
    pub fn load(&self, seq: u64) -> StoreResult<Option<ClearNet>> {
        match self.snapshots.get(seq.to_be_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Loads the newest snapshot.
    pub fn load_latest(&self) -> StoreResult<Option<ClearNet>> {
        match self.latest_seq()? {
            Some(seq) => self.load(seq),
            None => Ok(None),
        }
    }

    /// The newest snapshot as pretty-printed JSON.
    pub fn export_json(&self) -> StoreResult<Option<String>> {
        match self.load_latest()? {
            Some(ledger) => serde_json::to_string_pretty(&ledger)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::config::LedgerConfig;
    use crate::ledger::CallContext;

    fn ledger() -> ClearNet {
        ClearNet::new(Address::derive("owner"), LedgerConfig::default()).unwrap()
    }

    /// Reopens a dropped store. sled's flusher thread may hold the file lock
    /// for a moment after the last handle goes away.
    fn reopen(path: &Path) -> LedgerStore {
        let mut attempts = 0;
        loop {
            match LedgerStore::open(path) {
                Ok(store) => return store,
                Err(err) if attempts < 100 => {
                    attempts += 1;
                    debug!(%err, attempts, "store still locked");
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(err) => panic!("store never released its lock: {err}"),
            }
        }
    }

    #[test]
    fn empty_store_has_nothing() {
        let store = LedgerStore::open_temporary().unwrap();
        assert!(store.latest_seq().unwrap().is_none());
        assert!(store.load_latest().unwrap().is_none());
        assert!(store.export_json().unwrap().is_none());
    }

    #[test]
    fn save_assigns_increasing_sequence() {
        let store = LedgerStore::open_temporary().unwrap();
        let mut ledger = ledger();
        assert_eq!(store.save(&ledger).unwrap(), 0);

        let owner = CallContext::now(ledger.owner());
        ledger.transfer(&owner, Address::derive("alice"), 42).unwrap();
        assert_eq!(store.save(&ledger).unwrap(), 1);
        assert_eq!(store.snapshot_count(), 2);

        let first = store.load(0).unwrap().unwrap();
        let latest = store.load_latest().unwrap().unwrap();
        assert_eq!(first.token().balance_of(&Address::derive("alice")), 0);
        assert_eq!(latest.token().balance_of(&Address::derive("alice")), 42);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        let seq = store.save(&ledger()).unwrap();
        drop(store);

        let store = reopen(dir.path());
        assert_eq!(store.latest_seq().unwrap(), Some(seq));
        let restored = store.load_latest().unwrap().unwrap();
        assert_eq!(restored.owner(), Address::derive("owner"));
        restored.verify_custody().unwrap();
    }

    #[test]
    fn export_is_json() {
        let store = LedgerStore::open_temporary().unwrap();
        store.save(&ledger()).unwrap();
        let json = store.export_json().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("token").is_some());
        assert!(value.get("events").is_none());
    }
}
