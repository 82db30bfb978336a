//! Identity-indexed element store with a derived name index
//!
//! Elements are keyed by [`ElementId`]; the `(parent, name) -> child` index is
//! derived from the records and rebuilt whenever records change in bulk.
//! Records are held behind `Arc`, so cloning an index shares every record and
//! only the records touched afterwards are copied.

use crate::error::{EngineError, Result};
use crate::tree::element::{ElementRecord, Payload};
use crate::tree::path::RepoPath;
use crate::types::ElementId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TreeIndex {
    root: ElementId,
    elements: HashMap<ElementId, Arc<ElementRecord>>,
    children: HashMap<ElementId, BTreeMap<String, ElementId>>,
}

impl TreeIndex {
    /// An index holding only an empty root directory.
    pub fn new(root: ElementId) -> Self {
        let mut elements = HashMap::new();
        elements.insert(root, Arc::new(ElementRecord::root(root)));
        let mut children = HashMap::new();
        children.insert(root, BTreeMap::new());
        TreeIndex {
            root,
            elements,
            children,
        }
    }

    /// Rebuild an index from stored records, validating the tree shape.
    pub fn from_records(records: impl IntoIterator<Item = ElementRecord>) -> Result<Self> {
        let mut root = None;
        let mut elements = HashMap::new();
        for record in records {
            let id = record.id;
            if record.parent.is_none() && root.replace(id).is_some() {
                return Err(EngineError::Invariant("multiple root elements".to_string()));
            }
            if elements.insert(id, Arc::new(record)).is_some() {
                return Err(EngineError::Invariant(format!("duplicate element {}", id)));
            }
        }
        let root = root.ok_or_else(|| EngineError::Invariant("no root element".to_string()))?;
        let mut index = TreeIndex {
            root,
            elements,
            children: HashMap::new(),
        };
        index.rebuild_children()?;
        index.validate()?;
        Ok(index)
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn get(&self, id: ElementId) -> Option<&ElementRecord> {
        self.elements.get(&id).map(|record| record.as_ref())
    }

    pub fn records(&self) -> impl Iterator<Item = &ElementRecord> {
        self.elements.values().map(|record| record.as_ref())
    }

    pub fn max_id(&self) -> Option<ElementId> {
        self.elements.keys().max().copied()
    }

    pub fn child(&self, parent: ElementId, name: &str) -> Option<ElementId> {
        self.children.get(&parent)?.get(name).copied()
    }

    /// Children of `parent` in name order. Empty for files.
    pub fn children(&self, parent: ElementId) -> impl Iterator<Item = (&str, ElementId)> {
        self.children
            .get(&parent)
            .into_iter()
            .flat_map(|siblings| siblings.iter().map(|(name, id)| (name.as_str(), *id)))
    }

    pub fn lookup(&self, path: &RepoPath) -> Option<ElementId> {
        self.lookup_from(self.root, path)
    }

    pub fn lookup_from(&self, start: ElementId, path: &RepoPath) -> Option<ElementId> {
        let mut current = start;
        for segment in path.segments() {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    /// Path of an element from the root, or `None` if it is not reachable.
    pub fn path_of(&self, id: ElementId) -> Option<RepoPath> {
        let mut names = Vec::new();
        let mut current = id;
        loop {
            let record = self.get(current)?;
            match record.parent {
                None if current == self.root => break,
                None => return None,
                Some(parent) => {
                    names.push(record.name.as_str());
                    current = parent;
                }
            }
            if names.len() > self.elements.len() {
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

    /// True if `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.elements.len() {
                return false;
            }
            current = self.get(node).and_then(|record| record.parent);
        }
        false
    }

    /// Preorder listing of `id` and its descendants, children in name order.
    pub fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut kids: Vec<ElementId> = self.children(node).map(|(_, child)| child).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    pub(crate) fn insert(&mut self, record: ElementRecord) -> Result<()> {
        let parent = record
            .parent
            .ok_or_else(|| EngineError::Invariant("cannot insert a second root".to_string()))?;
        if self.elements.contains_key(&record.id) {
            return Err(EngineError::Invariant(format!(
                "element {} already present",
                record.id
            )));
        }
        match self.get(parent) {
            Some(parent_record) if parent_record.payload.is_directory() => {}
            Some(_) => {
                return Err(EngineError::Invariant(format!(
                    "parent {} of {} is not a directory",
                    parent, record.id
                )))
            }
            None => {
                return Err(EngineError::Invariant(format!(
                    "parent {} of {} does not exist",
                    parent, record.id
                )))
            }
        }
        let siblings = self.children.entry(parent).or_default();
        if siblings.contains_key(&record.name) {
            return Err(EngineError::Invariant(format!(
                "name '{}' already bound under {}",
                record.name, parent
            )));
        }
        siblings.insert(record.name.clone(), record.id);
        if record.payload.is_directory() {
            self.children.insert(record.id, BTreeMap::new());
        }
        self.elements.insert(record.id, Arc::new(record));
        Ok(())
    }

    /// Remove an element and everything beneath it.
    pub(crate) fn remove_subtree(&mut self, id: ElementId) -> Result<Vec<ElementId>> {
        if id == self.root {
            return Err(EngineError::Invariant("cannot remove the root".to_string()));
        }
        let record = self
            .get(id)
            .ok_or_else(|| EngineError::Invariant(format!("element {} not present", id)))?;
        if let Some(parent) = record.parent {
            let name = record.name.clone();
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(&name);
            }
        }
        let removed = self.subtree(id);
        for node in &removed {
            self.elements.remove(node);
            self.children.remove(node);
        }
        Ok(removed)
    }

    /// Rebind an element under a new parent and name, keeping its identity.
    pub(crate) fn relocate(&mut self, id: ElementId, new_parent: ElementId, new_name: &str) -> Result<()> {
        if id == self.root {
            return Err(EngineError::Invariant("cannot relocate the root".to_string()));
        }
        if self.is_ancestor(id, new_parent) {
            return Err(EngineError::Invariant(format!(
                "relocating {} under {} would create a cycle",
                id, new_parent
            )));
        }
        if self.child(new_parent, new_name).is_some() {
            return Err(EngineError::Invariant(format!(
                "name '{}' already bound under {}",
                new_name, new_parent
            )));
        }
        if !self
            .get(new_parent)
            .map(|record| record.payload.is_directory())
            .unwrap_or(false)
        {
            return Err(EngineError::Invariant(format!(
                "{} is not a directory",
                new_parent
            )));
        }
        let record = self
            .elements
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or_else(|| EngineError::Invariant(format!("element {} not present", id)))?;
        let old_parent = record.parent;
        let old_name = std::mem::replace(&mut record.name, new_name.to_string());
        record.parent = Some(new_parent);

        if let Some(old_parent) = old_parent {
            if let Some(siblings) = self.children.get_mut(&old_parent) {
                siblings.remove(&old_name);
            }
        }
        self.children
            .entry(new_parent)
            .or_default()
            .insert(new_name.to_string(), id);
        Ok(())
    }

    /// Mutable access to an element's payload. Copies the record if it is
    /// still shared with another index.
    pub(crate) fn payload_mut(&mut self, id: ElementId) -> Option<&mut Payload> {
        self.elements
            .get_mut(&id)
            .map(Arc::make_mut)
            .map(|record| &mut record.payload)
    }

    /// Insert or overwrite a record without touching the name index.
    /// Callers must finish with [`rebuild_children`](Self::rebuild_children).
    pub(crate) fn put_raw(&mut self, record: ElementRecord) {
        self.elements.insert(record.id, Arc::new(record));
    }

    pub(crate) fn set_location_raw(&mut self, id: ElementId, parent: ElementId, name: &str) -> bool {
        match self.elements.get_mut(&id).map(Arc::make_mut) {
            Some(record) => {
                record.parent = Some(parent);
                record.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_raw(&mut self, id: ElementId) -> bool {
        self.children.remove(&id);
        self.elements.remove(&id).is_some()
    }

    /// Drop every element whose parent no longer exists, transitively.
    /// Fails without pruning anything further if a branch root would go.
    pub(crate) fn prune_detached(&mut self) -> Result<Vec<ElementId>> {
        let mut pruned = Vec::new();
        loop {
            let detached: Vec<ElementId> = self
                .elements
                .values()
                .filter(|record| {
                    record
                        .parent
                        .map(|parent| !self.elements.contains_key(&parent))
                        .unwrap_or(false)
                })
                .map(|record| record.id)
                .collect();
            if detached.is_empty() {
                break;
            }
            if let Some(root) = detached
                .iter()
                .find(|id| self.elements.get(*id).map(|record| record.branch_root).unwrap_or(false))
            {
                return Err(EngineError::Invariant(format!(
                    "nested branch {} would be dropped with its parent",
                    root
                )));
            }
            for id in detached {
                self.remove_raw(id);
                pruned.push(id);
            }
        }
        Ok(pruned)
    }

    /// Recompute the name index from the records.
    pub(crate) fn rebuild_children(&mut self) -> Result<()> {
        let mut children: HashMap<ElementId, BTreeMap<String, ElementId>> = HashMap::new();
        for record in self.elements.values() {
            if record.payload.is_directory() {
                children.entry(record.id).or_default();
            }
        }
        for record in self.elements.values() {
            if let Some(parent) = record.parent {
                let siblings = children.entry(parent).or_default();
                if let Some(existing) = siblings.insert(record.name.clone(), record.id) {
                    return Err(EngineError::Invariant(format!(
                        "{} and {} are both named '{}' under {}",
                        existing, record.id, record.name, parent
                    )));
                }
            }
        }
        self.children = children;
        Ok(())
    }

    /// Check the single-rooted-tree invariant: every element has an existing
    /// directory parent, the name index agrees with the records, and every
    /// element is reachable from the root (which rules out cycles).
    pub fn validate(&self) -> Result<()> {
        let root = self
            .get(self.root)
            .ok_or_else(|| EngineError::Invariant("root element missing".to_string()))?;
        if root.parent.is_some() || !root.payload.is_directory() {
            return Err(EngineError::Invariant(
                "root must be a parentless directory".to_string(),
            ));
        }

        for record in self.records() {
            let Some(parent) = record.parent else {
                if record.id != self.root {
                    return Err(EngineError::Invariant(format!(
                        "{} has no parent",
                        record.id
                    )));
                }
                continue;
            };
            let parent_record = self.get(parent).ok_or_else(|| {
                EngineError::Invariant(format!("{} refers to missing parent {}", record.id, parent))
            })?;
            if !parent_record.payload.is_directory() {
                return Err(EngineError::Invariant(format!(
                    "{} lives under file {}",
                    record.id, parent
                )));
            }
            if self.child(parent, &record.name) != Some(record.id) {
                return Err(EngineError::Invariant(format!(
                    "name index disagrees for {}",
                    record.id
                )));
            }
        }

        let mut visited = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                return Err(EngineError::Invariant(format!("{} reached twice", node)));
            }
            stack.extend(self.children(node).map(|(_, child)| child));
        }
        if visited.len() != self.elements.len() {
            return Err(EngineError::Invariant(format!(
                "{} element(s) unreachable from the root",
                self.elements.len() - visited.len()
            )));
        }
        Ok(())
    }
}
