//! Tree Views
//!
//! Key-addressed projections of a tree used by the diff and merge engines.
//! A snapshot view is keyed by element identity; a branch view is keyed by
//! lineage, so the same logical element correlates across branches.

use crate::error::{EngineError, Result};
use crate::tree::{Payload, RepoPath, Snapshot, TreeIndex};
use crate::types::{ElementId, Revision};
use std::collections::HashMap;

/// The state of one element as seen by a view: where it lives and what it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementState {
    /// Key of the parent; `None` for the view root.
    pub parent: Option<ElementId>,
    pub name: String,
    pub payload: Payload,
}

impl ElementState {
    pub fn same_location(&self, other: &ElementState) -> bool {
        self.parent == other.parent && self.name == other.name
    }
}

#[derive(Debug, Clone)]
pub struct TreeView {
    root: ElementId,
    revision: Revision,
    entries: HashMap<ElementId, ElementState>,
    /// View key -> element id in the underlying tree.
    elements: HashMap<ElementId, ElementId>,
    /// Branch roots nested directly inside the view, as (parent key, name).
    nested: Vec<(ElementId, String)>,
}

impl TreeView {
    /// Whole-snapshot view keyed by element identity.
    pub fn of_snapshot(snapshot: &Snapshot) -> Self {
        let index = snapshot.index();
        let entries = index
            .records()
            .map(|record| {
                (
                    record.id,
                    ElementState {
                        parent: record.parent,
                        name: record.name.clone(),
                        payload: record.payload.clone(),
                    },
                )
            })
            .collect();
        let elements = index.records().map(|record| (record.id, record.id)).collect();
        TreeView {
            root: index.root(),
            revision: snapshot.revision(),
            entries,
            elements,
            nested: Vec::new(),
        }
    }

    /// Lineage-keyed view of the branch rooted at `path` in `snapshot`.
    pub fn branch(snapshot: &Snapshot, path: &RepoPath) -> Result<Self> {
        Self::branch_of_index(snapshot.index(), snapshot.revision(), path)
    }

    /// Lineage-keyed view over any index (used on transaction working state).
    ///
    /// Descent stops at nested branch roots; their contents belong to the
    /// nested branch. The view root is normalized to an unnamed, parentless
    /// state so branches at different paths compare equal.
    pub fn branch_of_index(index: &TreeIndex, revision: Revision, path: &RepoPath) -> Result<Self> {
        let root_id = index
            .lookup(path)
            .ok_or_else(|| EngineError::not_found(path))?;
        let root_record = index
            .get(root_id)
            .ok_or_else(|| EngineError::Invariant(format!("{} vanished", root_id)))?;

        let mut entries = HashMap::new();
        let mut elements = HashMap::new();
        let mut nested = Vec::new();
        entries.insert(
            root_record.lineage,
            ElementState {
                parent: None,
                name: String::new(),
                payload: root_record.payload.clone(),
            },
        );
        elements.insert(root_record.lineage, root_id);

        let mut stack = vec![(root_id, root_record.lineage)];
        while let Some((node, node_key)) = stack.pop() {
            for (name, child) in index.children(node) {
                let Some(record) = index.get(child) else {
                    continue;
                };
                if record.branch_root {
                    nested.push((node_key, name.to_string()));
                    continue;
                }
                let key = record.lineage;
                if elements.insert(key, child).is_some() {
                    return Err(EngineError::Invariant(format!(
                        "lineage {} appears twice in branch '{}'",
                        key, path
                    )));
                }
                entries.insert(
                    key,
                    ElementState {
                        parent: Some(node_key),
                        name: name.to_string(),
                        payload: record.payload.clone(),
                    },
                );
                stack.push((child, key));
            }
        }

        Ok(TreeView {
            root: root_record.lineage,
            revision,
            entries,
            elements,
            nested,
        })
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: ElementId) -> Option<&ElementState> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: ElementId) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &ElementState)> {
        self.entries.iter().map(|(key, state)| (*key, state))
    }

    /// Element id in the underlying tree for a view key.
    pub fn element_id(&self, key: ElementId) -> Option<ElementId> {
        self.elements.get(&key).copied()
    }

    /// Names occupied by nested branch roots, which the view leaves out.
    ///
    /// A merge may neither bind another element to one of these slots nor
    /// delete the directory holding one.
    pub fn nested_branches(&self) -> impl Iterator<Item = (ElementId, &str)> {
        self.nested.iter().map(|(parent, name)| (*parent, name.as_str()))
    }

    /// Path of `key` relative to the view root.
    pub fn path_of(&self, key: ElementId) -> Option<RepoPath> {
        let mut names = Vec::new();
        let mut current = key;
        while current != self.root {
            let state = self.entries.get(&current)?;
            names.push(state.name.as_str());
            current = state.parent?;
            if names.len() > self.entries.len() {
                return None;
            }
        }
        Some(
            names
                .iter()
                .rev()
                .fold(RepoPath::root(), |path, name| path.child(name)),
        )
    }

    /// Path -> key index for every element of the view.
    pub fn path_index(&self) -> HashMap<RepoPath, ElementId> {
        self.entries
            .keys()
            .filter_map(|key| self.path_of(*key).map(|path| (path, *key)))
            .collect()
    }
}
