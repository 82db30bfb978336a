//! Working tree for a transaction being committed.

use crate::error::{EngineError, Result};
use crate::identity::ElementRegistry;
use crate::merge::MergeAction;
use crate::revision::RevisionSpec;
use crate::store::RevisionStore;
use crate::tree::{CopyFrom, ElementRecord, Payload, RepoPath, Snapshot, TreeIndex};
use crate::txn::EditOp;
use crate::types::{ElementId, Revision};
use crate::views::TreeView;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) struct Stage<'a> {
    base: Arc<Snapshot>,
    store: &'a dyn RevisionStore,
    registry: &'a ElementRegistry,
    anchor: RepoPath,
    anchor_id: ElementId,
    index: TreeIndex,
    sources: HashMap<Revision, Arc<Snapshot>>,
}

impl<'a> Stage<'a> {
    pub(crate) fn new(
        base: Arc<Snapshot>,
        store: &'a dyn RevisionStore,
        registry: &'a ElementRegistry,
        anchor: RepoPath,
    ) -> Result<Self> {
        let anchor_id = base.resolve(&anchor)?;
        let index = base.index().clone();
        Ok(Stage {
            base,
            store,
            registry,
            anchor,
            anchor_id,
            index,
            sources: HashMap::new(),
        })
    }

    pub(crate) fn apply(&mut self, op: &EditOp) -> Result<()> {
        debug!(op = %op, "Applying edit");
        match op {
            EditOp::MakeDir { path } => self.make_dir(path, false),
            EditOp::MakeBranch { path } => self.make_dir(path, true),
            EditOp::PutFile { path, content } => self.put_file(path, content),
            EditOp::Copy {
                revision,
                src,
                dest,
            } => self.copy(*revision, src, dest, false),
            EditOp::Move { src, dest } => self.move_element(src, dest),
            EditOp::Delete { path } => self.delete(path),
            EditOp::Branch { src, dest } => self.copy(RevisionSpec::Head, src, dest, true),
            EditOp::SetProperty { path, name, value } => {
                self.set_property(path, name, value.as_deref())
            }
        }
    }

    fn working_element(&self, path: &RepoPath) -> Result<ElementId> {
        self.index
            .lookup_from(self.anchor_id, path)
            .ok_or_else(|| EngineError::not_found(path))
    }

    /// Parent directory and name for creating something at `path`.
    fn vacant_slot(&self, path: &RepoPath) -> Result<(ElementId, String)> {
        let (Some(parent_path), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(EngineError::already_exists(path));
        };
        let parent = self.working_element(&parent_path)?;
        let parent_is_dir = self
            .index
            .get(parent)
            .map(|record| record.payload.is_directory())
            .unwrap_or(false);
        if !parent_is_dir {
            return Err(EngineError::NotADirectory {
                path: parent_path.to_string(),
            });
        }
        if self.index.child(parent, name).is_some() {
            return Err(EngineError::already_exists(path));
        }
        Ok((parent, name.to_string()))
    }

    fn make_dir(&mut self, path: &RepoPath, branch_root: bool) -> Result<()> {
        let (parent, name) = self.vacant_slot(path)?;
        let mut record = ElementRecord::new(self.registry.allocate(), parent, &name, Payload::directory());
        record.branch_root = branch_root;
        self.index.insert(record)
    }

    fn put_file(&mut self, path: &RepoPath, content: &[u8]) -> Result<()> {
        if let Some(id) = self.index.lookup_from(self.anchor_id, path) {
            let payload = self
                .index
                .payload_mut(id)
                .ok_or_else(|| EngineError::Invariant(format!("{} vanished", id)))?;
            if payload.is_directory() {
                return Err(EngineError::already_exists(path));
            }
            if payload.set_content(content.to_vec()) {
                trace!(
                    element = %id,
                    content_hash = %payload.content_hash().map(hex::encode).unwrap_or_default(),
                    "Updated file content"
                );
            }
            return Ok(());
        }
        let (parent, name) = self.vacant_slot(path)?;
        let id = self.registry.allocate();
        let payload = Payload::file(content.to_vec());
        trace!(
            element = %id,
            content_hash = %payload.content_hash().map(hex::encode).unwrap_or_default(),
            "Created file"
        );
        self.index.insert(ElementRecord::new(id, parent, &name, payload))
    }

    fn source_snapshot(&mut self, revision: Revision) -> Result<Arc<Snapshot>> {
        if revision == self.base.revision() {
            return Ok(Arc::clone(&self.base));
        }
        if let Some(snapshot) = self.sources.get(&revision) {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = self.store.snapshot(revision)?;
        self.sources.insert(revision, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Instantiate a fresh copy of the subtree at `src` (in the committed
    /// snapshot `revision`) at `dest`. A branch keeps the source lineage.
    fn copy(&mut self, revision: RevisionSpec, src: &RepoPath, dest: &RepoPath, branch: bool) -> Result<()> {
        let revision = revision.resolve(self.base.revision())?;
        let source = self.source_snapshot(revision)?;
        let src_path = self.anchor.join(src);
        let src_id = source
            .try_resolve(&src_path)
            .ok_or_else(|| EngineError::not_found(src))?;
        let (parent, name) = self.vacant_slot(dest)?;

        let mut stack = vec![(src_id, src_path, parent, name, true)];
        let mut copied = 0usize;
        while let Some((source_id, source_path, new_parent, new_name, is_top)) = stack.pop() {
            let record = source.element(source_id).ok_or_else(|| {
                EngineError::Invariant(format!("{} missing from r{}", source_id, revision))
            })?;
            let id = self.registry.allocate();
            let copy = ElementRecord {
                id,
                lineage: if branch { record.lineage } else { id },
                parent: Some(new_parent),
                name: new_name,
                payload: record.payload.clone(),
                copy_from: Some(CopyFrom {
                    element: source_id,
                    path: source_path.clone(),
                    revision,
                }),
                branch_root: if is_top { branch } else { branch && record.branch_root },
            };
            self.index.insert(copy)?;
            copied += 1;
            for (child_name, child) in source.index().children(source_id) {
                stack.push((child, source_path.child(child_name), id, child_name.to_string(), false));
            }
        }
        debug!(src = %src, dest = %dest, revision, copied, branch, "Copied subtree");
        Ok(())
    }

    fn move_element(&mut self, src: &RepoPath, dest: &RepoPath) -> Result<()> {
        let id = self.working_element(src)?;
        if id == self.anchor_id || id == self.index.root() {
            return Err(EngineError::InvalidOperation(format!(
                "cannot move the anchor '{}'",
                src
            )));
        }
        let (parent, name) = self.vacant_slot(dest)?;
        if self.index.is_ancestor(id, parent) {
            return Err(EngineError::InvalidOperation(format!(
                "cannot move '{}' into its own subtree at '{}'",
                src, dest
            )));
        }
        self.index.relocate(id, parent, &name)
    }

    fn delete(&mut self, path: &RepoPath) -> Result<()> {
        let id = self.working_element(path)?;
        if id == self.anchor_id || id == self.index.root() {
            return Err(EngineError::InvalidOperation(format!(
                "cannot delete the anchor '{}'",
                path
            )));
        }
        let removed = self.index.remove_subtree(id)?;
        trace!(path = %path, removed = removed.len(), "Deleted subtree");
        Ok(())
    }

    fn set_property(&mut self, path: &RepoPath, name: &str, value: Option<&str>) -> Result<()> {
        let id = self.working_element(path)?;
        let payload = self
            .index
            .payload_mut(id)
            .ok_or_else(|| EngineError::Invariant(format!("{} vanished", id)))?;
        match value {
            Some(value) => {
                payload.props_mut().insert(name.to_string(), value.to_string());
            }
            None => {
                payload.props_mut().remove(name);
            }
        }
        Ok(())
    }

    /// Apply merge actions, keyed by lineage, to the branch rooted at the
    /// repository path `target`.
    pub(crate) fn apply_merge(&mut self, target: &RepoPath, actions: &[MergeAction]) -> Result<()> {
        let view = TreeView::branch_of_index(&self.index, self.base.revision(), target)?;
        let mut ids: HashMap<ElementId, ElementId> = view
            .keys()
            .filter_map(|key| view.element_id(key).map(|id| (key, id)))
            .collect();
        let lookup = |ids: &HashMap<ElementId, ElementId>, key: &ElementId| {
            ids.get(key).copied().ok_or_else(|| {
                EngineError::Invariant(format!("merge refers to {} missing from '{}'", key, target))
            })
        };

        for action in actions {
            match action {
                MergeAction::Add {
                    element,
                    parent,
                    name,
                    payload,
                } => {
                    let parent_id = lookup(&ids, parent)?;
                    let id = self.registry.allocate();
                    self.index.put_raw(ElementRecord {
                        id,
                        lineage: *element,
                        parent: Some(parent_id),
                        name: name.clone(),
                        payload: payload.clone(),
                        copy_from: None,
                        branch_root: false,
                    });
                    ids.insert(*element, id);
                }
                MergeAction::Relocate {
                    element,
                    parent,
                    name,
                } => {
                    let id = lookup(&ids, element)?;
                    let parent_id = lookup(&ids, parent)?;
                    if !self.index.set_location_raw(id, parent_id, name) {
                        return Err(EngineError::Invariant(format!(
                            "cannot relocate {}: already removed",
                            id
                        )));
                    }
                }
                MergeAction::Modify { element, payload } => {
                    let id = lookup(&ids, element)?;
                    let current = self
                        .index
                        .payload_mut(id)
                        .ok_or_else(|| {
                            EngineError::Invariant(format!("cannot modify {}: already removed", id))
                        })?;
                    *current = payload.clone();
                }
                MergeAction::Delete { element } => {
                    let id = lookup(&ids, element)?;
                    if !self.index.remove_raw(id) {
                        return Err(EngineError::Invariant(format!(
                            "cannot delete {}: already removed",
                            id
                        )));
                    }
                }
            }
        }

        let pruned = self.index.prune_detached()?;
        if !pruned.is_empty() {
            debug!(pruned = pruned.len(), "Dropped elements left under deleted parents");
        }
        self.index.rebuild_children()?;
        debug!(target = %target, actions = actions.len(), "Applied merge");
        Ok(())
    }

    /// Validate and hand back the working tree.
    pub(crate) fn finish(self) -> Result<TreeIndex> {
        self.index.validate()?;
        Ok(self.index)
    }
}
