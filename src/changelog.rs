//! Change-Log Renderer
//!
//! Turns a pair of snapshots into path-level change records in the style of
//! `svn log -v`. Each element of the new tree is compared against what its
//! parent's origin implies should sit at its path. Children of a copied or
//! moved directory that came along with it produce no record of their own.

use crate::error::{EngineError, Result};
use crate::store::RevisionStore;
use crate::tree::{ElementRecord, RepoPath, Snapshot};
use crate::types::{ElementId, Revision};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    Add,
    Delete,
    Replace,
    Modify,
}

impl ChangeAction {
    pub fn letter(&self) -> char {
        match self {
            ChangeAction::Add => 'A',
            ChangeAction::Delete => 'D',
            ChangeAction::Replace => 'R',
            ChangeAction::Modify => 'M',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopySource {
    pub path: RepoPath,
    pub revision: Revision,
}

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub action: ChangeAction,
    pub path: RepoPath,
    pub element: ElementId,
    pub copy_from: Option<CopySource>,
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action.letter(), self.path.to_absolute())?;
        if let Some(source) = &self.copy_from {
            write!(f, " (from {}:{})", source.path.to_absolute(), source.revision)?;
        }
        Ok(())
    }
}

struct Renderer<'a> {
    base: &'a Snapshot,
    target: &'a Snapshot,
    store: &'a dyn RevisionStore,
    snapshots: HashMap<Revision, Arc<Snapshot>>,
    records: Vec<ChangeRecord>,
}

impl<'a> Renderer<'a> {
    fn snapshot(&mut self, revision: Revision) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.snapshots.get(&revision) {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = self.store.snapshot(revision)?;
        self.snapshots.insert(revision, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn pre_existing(&self, id: ElementId) -> bool {
        self.base.contains(id)
    }

    /// Where an element's content came from: its old path if it existed in
    /// the base, its copy source otherwise.
    fn origin(&self, record: &ElementRecord) -> Option<CopySource> {
        if self.pre_existing(record.id) {
            return self.base.path_of(record.id).map(|path| CopySource {
                path,
                revision: self.base.revision(),
            });
        }
        record.copy_from.as_ref().map(|copy| CopySource {
            path: copy.path.clone(),
            revision: copy.revision,
        })
    }

    fn push(&mut self, action: ChangeAction, path: RepoPath, element: ElementId, copy_from: Option<CopySource>) {
        self.records.push(ChangeRecord {
            action,
            path,
            element,
            copy_from,
        });
    }

    fn walk(&mut self, node: ElementId, path: &RepoPath, context: Option<CopySource>) -> Result<()> {
        let target = self.target;
        // Baseline: what the context implies lives under this node.
        let (baseline, baseline_children): (Option<Arc<Snapshot>>, Vec<(String, ElementId)>) = match &context {
            Some(origin) => {
                let snapshot = self.snapshot(origin.revision)?;
                let children = snapshot
                    .try_resolve(&origin.path)
                    .map(|id| {
                        snapshot
                            .index()
                            .children(id)
                            .map(|(name, child)| (name.to_string(), child))
                            .collect()
                    })
                    .unwrap_or_default();
                (Some(snapshot), children)
            }
            None => (None, Vec::new()),
        };
        let baseline_of: HashMap<&str, ElementId> = baseline_children
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
            .collect();
        let node_pre_existing = self.pre_existing(node);

        for (name, child) in target.index().children(node) {
            let record = target
                .element(child)
                .ok_or_else(|| EngineError::Invariant(format!("{} has no record", child)))?;
            let child_path = path.child(name);
            let baseline_child = baseline_of.get(name).copied();
            let origin = self.origin(record);
            let implied = context.as_ref().map(|ctx| CopySource {
                path: ctx.path.child(name),
                revision: ctx.revision,
            });
            let child_pre_existing = self.pre_existing(child);
            let same_element = if child_pre_existing {
                baseline_child == Some(child)
            } else {
                record.copy_from.as_ref().map(|copy| copy.element) == baseline_child
            };
            let implicit = origin.is_some()
                && origin == implied
                && child_pre_existing == node_pre_existing
                && same_element;

            if implicit {
                let changed = match (&baseline, baseline_child) {
                    (Some(snapshot), Some(old)) => snapshot
                        .content_of(old)
                        .map(|payload| payload != &record.payload)
                        .unwrap_or(true),
                    _ => true,
                };
                if changed {
                    self.push(ChangeAction::Modify, child_path.clone(), child, None);
                }
            } else {
                let action = if baseline_child.is_some() {
                    ChangeAction::Replace
                } else {
                    ChangeAction::Add
                };
                self.push(action, child_path.clone(), child, origin.clone());
            }
            self.walk(child, &child_path, origin)?;
        }

        for (name, old) in &baseline_children {
            if target.index().child(node, name).is_none() {
                self.push(ChangeAction::Delete, path.child(name), *old, None);
            }
        }
        Ok(())
    }
}

/// Change records turning `base` into `target`, ordered by path.
///
/// `store` supplies the snapshots copies were taken from.
pub fn render(base: &Snapshot, target: &Snapshot, store: &dyn RevisionStore) -> Result<Vec<ChangeRecord>> {
    let mut renderer = Renderer {
        base,
        target,
        store,
        snapshots: HashMap::new(),
        records: Vec::new(),
    };
    renderer
        .snapshots
        .insert(base.revision(), Arc::new(base.clone()));

    let root = target.root();
    let context = Some(CopySource {
        path: RepoPath::root(),
        revision: base.revision(),
    });
    if let (Some(old), Some(new)) = (base.element(base.root()), target.element(root)) {
        if old.payload != new.payload {
            renderer.push(ChangeAction::Modify, RepoPath::root(), root, None);
        }
    }
    renderer.walk(root, &RepoPath::root(), context)?;

    let mut records = renderer.records;
    records.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        base = base.revision(),
        target = target.revision(),
        records = records.len(),
        "Rendered change log"
    );
    Ok(records)
}

/// JSON form of a change list for external consumers.
pub fn to_json(records: &[ChangeRecord]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| EngineError::Invariant(format!("Failed to encode change records: {}", e)))
}
