//! Element Identity Registry
//!
//! Hands out element identities that are never reused for the lifetime of a
//! repository, and resolves paths to the identity bound there in a snapshot.

use crate::error::Result;
use crate::tree::{RepoPath, Snapshot};
use crate::types::ElementId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

#[derive(Debug)]
pub struct ElementRegistry {
    next: AtomicU64,
}

impl ElementRegistry {
    /// Registry whose first allocation is `first`.
    pub fn starting_at(first: u64) -> Self {
        ElementRegistry {
            next: AtomicU64::new(first),
        }
    }

    /// Registry resuming after everything a snapshot has ever seen issued.
    pub fn resume_from(snapshot: &Snapshot) -> Self {
        let floor = snapshot
            .index()
            .max_id()
            .map(|id| id.as_u64() + 1)
            .unwrap_or(0);
        Self::starting_at(snapshot.id_high_water().max(floor))
    }

    /// Allocate a fresh identity.
    pub fn allocate(&self) -> ElementId {
        let id = ElementId(self.next.fetch_add(1, Ordering::SeqCst));
        trace!(element = %id, "Allocated element id");
        id
    }

    /// First identity not yet handed out.
    pub fn high_water(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Identity bound at `path` in `snapshot`, or `NotFound`.
    pub fn resolve(snapshot: &Snapshot, path: &RepoPath) -> Result<ElementId> {
        snapshot.resolve(path)
    }
}
