//! Revision Store
//!
//! Append-only storage of committed snapshots. The store owns the head
//! revision; the engine never keeps its own copy of it.

pub mod persistence;

pub use persistence::SledRevisionStore;

use crate::error::StorageError;
use crate::revision::RevisionInfo;
use crate::tree::Snapshot;
use crate::types::{ElementId, Revision};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Root element id of every fresh repository.
pub const ROOT_ELEMENT: ElementId = ElementId(0);

/// Revision Store interface
pub trait RevisionStore: Send + Sync {
    fn head(&self) -> Result<Revision, StorageError>;

    fn snapshot(&self, revision: Revision) -> Result<Arc<Snapshot>, StorageError>;

    fn info(&self, revision: Revision) -> Result<RevisionInfo, StorageError>;

    /// Append the next revision. `snapshot.revision()` must be `head + 1`.
    fn append(&self, snapshot: Snapshot, info: RevisionInfo) -> Result<Revision, StorageError>;

    /// Force everything appended so far onto durable storage.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-memory store; revision N lives at index N.
pub struct MemoryRevisionStore {
    revisions: RwLock<Vec<(Arc<Snapshot>, RevisionInfo)>>,
}

impl Default for MemoryRevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRevisionStore {
    /// A store holding revision 0 (empty root).
    pub fn new() -> Self {
        let initial = Arc::new(Snapshot::initial(ROOT_ELEMENT));
        MemoryRevisionStore {
            revisions: RwLock::new(vec![(initial, RevisionInfo::new(0, None))]),
        }
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn head(&self) -> Result<Revision, StorageError> {
        Ok(self.revisions.read().len() as Revision - 1)
    }

    fn snapshot(&self, revision: Revision) -> Result<Arc<Snapshot>, StorageError> {
        self.revisions
            .read()
            .get(revision as usize)
            .map(|(snapshot, _)| Arc::clone(snapshot))
            .ok_or(StorageError::RevisionMissing(revision))
    }

    fn info(&self, revision: Revision) -> Result<RevisionInfo, StorageError> {
        self.revisions
            .read()
            .get(revision as usize)
            .map(|(_, info)| info.clone())
            .ok_or(StorageError::RevisionMissing(revision))
    }

    fn append(&self, snapshot: Snapshot, info: RevisionInfo) -> Result<Revision, StorageError> {
        let mut revisions = self.revisions.write();
        let expected = revisions.len() as Revision;
        if snapshot.revision() != expected || info.revision != expected {
            return Err(StorageError::Corrupt(format!(
                "appending r{} but next revision is r{}",
                snapshot.revision(),
                expected
            )));
        }
        revisions.push((Arc::new(snapshot), info));
        debug!(revision = expected, "Appended revision");
        Ok(expected)
    }
}
