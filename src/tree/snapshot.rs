//! Immutable, path-addressable view of the tree at one revision.

use crate::error::{EngineError, Result};
use crate::tree::element::{ElementRecord, Payload};
use crate::tree::index::TreeIndex;
use crate::tree::path::RepoPath;
use crate::types::{ElementId, Revision};

#[derive(Debug, Clone)]
pub struct Snapshot {
    revision: Revision,
    index: TreeIndex,
    /// First element id not yet handed out when this revision was committed.
    id_high_water: u64,
}

impl Snapshot {
    /// Revision 0: an empty root directory.
    pub fn initial(root: ElementId) -> Self {
        Snapshot {
            revision: 0,
            index: TreeIndex::new(root),
            id_high_water: root.as_u64() + 1,
        }
    }

    pub fn new(revision: Revision, index: TreeIndex, id_high_water: u64) -> Self {
        Snapshot {
            revision,
            index,
            id_high_water,
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn root(&self) -> ElementId {
        self.index.root()
    }

    pub fn id_high_water(&self) -> u64 {
        self.id_high_water
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    pub fn element(&self, id: ElementId) -> Option<&ElementRecord> {
        self.index.get(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.index.contains(id)
    }

    /// Element bound at `path`, or `NotFound`.
    pub fn resolve(&self, path: &RepoPath) -> Result<ElementId> {
        self.index
            .lookup(path)
            .ok_or_else(|| EngineError::not_found(path))
    }

    pub fn try_resolve(&self, path: &RepoPath) -> Option<ElementId> {
        self.index.lookup(path)
    }

    pub fn child_names(&self, id: ElementId) -> Vec<&str> {
        self.index.children(id).map(|(name, _)| name).collect()
    }

    pub fn parent_of(&self, id: ElementId) -> Option<ElementId> {
        self.index.get(id).and_then(|record| record.parent)
    }

    pub fn content_of(&self, id: ElementId) -> Option<&Payload> {
        self.index.get(id).map(|record| &record.payload)
    }

    pub fn path_of(&self, id: ElementId) -> Option<RepoPath> {
        self.index.path_of(id)
    }

    /// Paths of every element marked as a branch root, the repository root
    /// included, in path order.
    pub fn branch_roots(&self) -> Vec<RepoPath> {
        let mut roots: Vec<RepoPath> = self
            .index
            .records()
            .filter(|record| record.branch_root || record.parent.is_none())
            .filter_map(|record| self.index.path_of(record.id))
            .collect();
        roots.sort();
        roots
    }

    /// True if `path` names a branch root (the repository root always does).
    pub fn is_branch_root(&self, path: &RepoPath) -> bool {
        self.index
            .lookup(path)
            .and_then(|id| self.index.get(id))
            .map(|record| record.branch_root || record.parent.is_none())
            .unwrap_or(false)
    }
}
