//! Diff Engine
//!
//! Computes per-element differences between two views, correlated strictly by
//! key (identity or lineage), never by path. A moved element yields a single
//! `Modify` entry with `relocated` set.

use crate::tree::{CopyFrom, RepoPath, Snapshot};
use crate::types::ElementId;
use crate::views::{ElementState, TreeView};
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Delete,
    /// Added at a path that `replaced` occupied in the base.
    Replace { replaced: ElementId },
    Modify { relocated: bool, payload_changed: bool },
}

impl ChangeKind {
    fn rank(&self) -> u8 {
        match self {
            ChangeKind::Delete => 0,
            ChangeKind::Replace { .. } => 1,
            ChangeKind::Add => 2,
            ChangeKind::Modify { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDiff {
    pub element: ElementId,
    pub kind: ChangeKind,
    pub old: Option<ElementState>,
    pub new: Option<ElementState>,
    pub old_path: Option<RepoPath>,
    pub new_path: Option<RepoPath>,
    /// Provenance for added elements, when their lineage records one.
    pub copy_from: Option<CopyFrom>,
}

impl ElementDiff {
    pub fn is_relocation(&self) -> bool {
        matches!(self.kind, ChangeKind::Modify { relocated: true, .. })
    }

    /// Path used for ordering: the new path, or the old one for deletions.
    pub fn path(&self) -> Option<&RepoPath> {
        self.new_path.as_ref().or(self.old_path.as_ref())
    }
}

fn order(a: &ElementDiff, b: &ElementDiff) -> Ordering {
    a.path()
        .cmp(&b.path())
        .then(a.kind.rank().cmp(&b.kind.rank()))
        .then(a.element.cmp(&b.element))
}

/// Differences from `base` to `target`, ordered by path.
pub fn diff(base: &TreeView, target: &TreeView) -> Vec<ElementDiff> {
    let base_paths = base.path_index();
    let mut changes = Vec::new();

    for (key, old) in base.iter() {
        match target.get(key) {
            None => changes.push(ElementDiff {
                element: key,
                kind: ChangeKind::Delete,
                old: Some(old.clone()),
                new: None,
                old_path: base.path_of(key),
                new_path: None,
                copy_from: None,
            }),
            Some(new) if new != old => changes.push(ElementDiff {
                element: key,
                kind: ChangeKind::Modify {
                    relocated: !old.same_location(new),
                    payload_changed: old.payload != new.payload,
                },
                old: Some(old.clone()),
                new: Some(new.clone()),
                old_path: base.path_of(key),
                new_path: target.path_of(key),
                copy_from: None,
            }),
            Some(_) => {}
        }
    }

    for (key, new) in target.iter() {
        if base.contains(key) {
            continue;
        }
        let new_path = target.path_of(key);
        let kind = match new_path.as_ref().and_then(|path| base_paths.get(path)) {
            Some(&replaced) if replaced != key => ChangeKind::Replace { replaced },
            _ => ChangeKind::Add,
        };
        changes.push(ElementDiff {
            element: key,
            kind,
            old: None,
            new: Some(new.clone()),
            old_path: None,
            new_path,
            copy_from: None,
        });
    }

    changes.sort_by(order);
    changes
}

/// Identity-level differences between two snapshots, with copy-from
/// provenance filled in for added elements.
pub fn diff_snapshots(base: &Snapshot, target: &Snapshot) -> Vec<ElementDiff> {
    let mut changes = diff(&TreeView::of_snapshot(base), &TreeView::of_snapshot(target));
    for change in &mut changes {
        if matches!(change.kind, ChangeKind::Add | ChangeKind::Replace { .. }) {
            change.copy_from = target
                .element(change.element)
                .and_then(|record| record.copy_from.clone());
        }
    }
    debug!(
        base = base.revision(),
        target = target.revision(),
        changes = changes.len(),
        "Computed snapshot diff"
    );
    changes
}
