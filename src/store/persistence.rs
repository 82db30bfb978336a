//! Persistence layer for the Revision Store

use crate::error::StorageError;
use crate::revision::RevisionInfo;
use crate::store::{RevisionStore, ROOT_ELEMENT};
use crate::tree::{ElementRecord, Snapshot, TreeIndex};
use crate::types::{ElementId, Revision};
use bincode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const HEAD_KEY: &[u8] = b"head";
const STORE_FORMAT_VERSION: u32 = 1;

/// On-disk form of one revision.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRevision {
    version: u32,
    info: RevisionInfo,
    root: ElementId,
    id_high_water: u64,
    records: Vec<ElementRecord>,
}

fn revision_key(revision: Revision) -> Vec<u8> {
    let mut key = b"rev:".to_vec();
    key.extend_from_slice(&revision.to_be_bytes());
    key
}

fn sled_err(context: &str, err: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{}: {}", context, err),
    ))
}

/// Sled-based implementation of RevisionStore
///
/// Each revision is stored whole; decoded snapshots are cached.
pub struct SledRevisionStore {
    db: sled::Db,
    cache: RwLock<HashMap<Revision, Arc<Snapshot>>>,
}

impl SledRevisionStore {
    /// Open (or create) a store at the given path. A new store is seeded
    /// with revision 0.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| sled_err("Failed to open sled database", e))?;
        let store = Self {
            db,
            cache: RwLock::new(HashMap::new()),
        };
        if store.read_head()?.is_none() {
            info!(path = %path.as_ref().display(), "Initialising empty revision store");
            store.write_revision(&Snapshot::initial(ROOT_ELEMENT), &RevisionInfo::new(0, None))?;
        }
        Ok(store)
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn read_head(&self) -> Result<Option<Revision>, StorageError> {
        match self
            .db
            .get(HEAD_KEY)
            .map_err(|e| sled_err("Failed to read head", e))?
        {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    StorageError::Corrupt("head pointer is not 8 bytes".to_string())
                })?;
                Ok(Some(Revision::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn read_stored(&self, revision: Revision) -> Result<StoredRevision, StorageError> {
        let bytes = self
            .db
            .get(revision_key(revision))
            .map_err(|e| sled_err("Failed to read revision", e))?
            .ok_or(StorageError::RevisionMissing(revision))?;
        let stored: StoredRevision = bincode::deserialize(&bytes).map_err(|e| {
            StorageError::Corrupt(format!("Failed to deserialize r{}: {}", revision, e))
        })?;
        if stored.version != STORE_FORMAT_VERSION {
            return Err(StorageError::Corrupt(format!(
                "Unsupported store format version: {}",
                stored.version
            )));
        }
        Ok(stored)
    }

    /// Write revision data and advance the head pointer in one sled batch.
    fn write_revision(&self, snapshot: &Snapshot, info: &RevisionInfo) -> Result<(), StorageError> {
        let mut records: Vec<ElementRecord> = snapshot.index().records().cloned().collect();
        records.sort_by_key(|record| record.id);
        let stored = StoredRevision {
            version: STORE_FORMAT_VERSION,
            info: info.clone(),
            root: snapshot.root(),
            id_high_water: snapshot.id_high_water(),
            records,
        };
        let value = bincode::serialize(&stored).map_err(|e| {
            StorageError::Corrupt(format!("Failed to serialize r{}: {}", snapshot.revision(), e))
        })?;

        let mut batch = sled::Batch::default();
        batch.insert(revision_key(snapshot.revision()), value);
        batch.insert(HEAD_KEY, &snapshot.revision().to_be_bytes()[..]);
        self.db
            .apply_batch(batch)
            .map_err(|e| sled_err("Failed to write revision", e))?;
        self.flush_db()
    }

    fn flush_db(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| sled_err("Failed to flush store", e))?;
        Ok(())
    }
}

impl RevisionStore for SledRevisionStore {
    fn head(&self) -> Result<Revision, StorageError> {
        self.read_head()?
            .ok_or_else(|| StorageError::Corrupt("store has no head pointer".to_string()))
    }

    fn snapshot(&self, revision: Revision) -> Result<Arc<Snapshot>, StorageError> {
        if let Some(snapshot) = self.cache.read().get(&revision) {
            return Ok(Arc::clone(snapshot));
        }
        let stored = self.read_stored(revision)?;
        let index = TreeIndex::from_records(stored.records)
            .map_err(|e| StorageError::Corrupt(format!("r{}: {}", revision, e)))?;
        if index.root() != stored.root {
            return Err(StorageError::Corrupt(format!(
                "r{}: root mismatch ({} vs {})",
                revision,
                index.root(),
                stored.root
            )));
        }
        let snapshot = Arc::new(Snapshot::new(revision, index, stored.id_high_water));
        debug!(revision, elements = snapshot.len(), "Loaded snapshot from store");
        self.cache.write().insert(revision, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn info(&self, revision: Revision) -> Result<RevisionInfo, StorageError> {
        Ok(self.read_stored(revision)?.info)
    }

    fn append(&self, snapshot: Snapshot, info: RevisionInfo) -> Result<Revision, StorageError> {
        let expected = self.head()? + 1;
        if snapshot.revision() != expected || info.revision != expected {
            return Err(StorageError::Corrupt(format!(
                "appending r{} but next revision is r{}",
                snapshot.revision(),
                expected
            )));
        }
        self.write_revision(&snapshot, &info)?;
        self.cache.write().insert(expected, Arc::new(snapshot));
        debug!(revision = expected, "Appended revision");
        Ok(expected)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.flush_db()
    }
}
