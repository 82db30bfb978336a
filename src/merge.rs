//! Merge Engine
//!
//! Three-way merge of two views against their common ancestor. Views are
//! correlated by key, so a moved element is recognised on every side. The
//! engine is pure: it proposes actions and reports conflicts, and never
//! touches a snapshot itself.

use crate::diff::diff;
use crate::error::{EngineError, Result};
use crate::tree::{Payload, RepoPath};
use crate::types::ElementId;
use crate::views::{ElementState, TreeView};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictReason {
    EditDelete,
    MoveMoveDivergent,
    AddAdd,
    DeleteMove,
    EditEdit,
    NameClash,
    Orphan,
    Cycle,
}

impl ConflictReason {
    pub fn tag(&self) -> &'static str {
        match self {
            ConflictReason::EditDelete => "edit/delete",
            ConflictReason::MoveMoveDivergent => "move/move-divergent",
            ConflictReason::AddAdd => "add/add",
            ConflictReason::DeleteMove => "delete/move",
            ConflictReason::EditEdit => "edit/edit",
            ConflictReason::NameClash => "name-clash",
            ConflictReason::Orphan => "orphan",
            ConflictReason::Cycle => "cycle",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An irreconcilable divergence on one element, with all three of its states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub element: ElementId,
    pub path: Option<RepoPath>,
    pub reason: ConflictReason,
    pub ancestor: Option<ElementState>,
    pub source: Option<ElementState>,
    pub target: Option<ElementState>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} conflict on {} ({})", self.reason, path.to_absolute(), self.element),
            None => write!(f, "{} conflict on {}", self.reason, self.element),
        }
    }
}

/// A change to apply to the target branch. Element and parent fields are
/// view keys, not element ids of any particular tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
    Add {
        element: ElementId,
        parent: ElementId,
        name: String,
        payload: Payload,
    },
    Delete {
        element: ElementId,
    },
    Relocate {
        element: ElementId,
        parent: ElementId,
        name: String,
    },
    Modify {
        element: ElementId,
        payload: Payload,
    },
}

impl MergeAction {
    pub fn element(&self) -> ElementId {
        match self {
            MergeAction::Add { element, .. }
            | MergeAction::Delete { element }
            | MergeAction::Relocate { element, .. }
            | MergeAction::Modify { element, .. } => *element,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Adds (parents first), then relocations, modifications and deletions.
    pub actions: Vec<MergeAction>,
    pub conflicts: Vec<Conflict>,
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.conflicts.is_empty()
    }
}

enum Resolution {
    Keep,
    Take(Option<ElementState>),
    Conflict(ConflictReason),
}

/// Pick one side of a single field, or `None` if both sides changed it
/// differently.
fn merge_field<'a, T: PartialEq>(y: &'a T, s: &'a T, t: &'a T) -> Option<&'a T> {
    if s == y || s == t {
        Some(t)
    } else if t == y {
        Some(s)
    } else {
        None
    }
}

fn resolve(
    y: Option<&ElementState>,
    s: Option<&ElementState>,
    t: Option<&ElementState>,
) -> Resolution {
    if s == t {
        return Resolution::Keep;
    }
    if t == y {
        return Resolution::Take(s.cloned());
    }
    if s == y {
        return Resolution::Keep;
    }
    match (y, s, t) {
        (None, Some(_), Some(_)) => Resolution::Conflict(ConflictReason::AddAdd),
        (Some(y), None, Some(changed)) | (Some(y), Some(changed), None) => {
            if changed.payload == y.payload {
                Resolution::Conflict(ConflictReason::DeleteMove)
            } else {
                Resolution::Conflict(ConflictReason::EditDelete)
            }
        }
        (Some(y), Some(s), Some(t)) => {
            let (y_at, s_at, t_at) = (
                (y.parent, y.name.as_str()),
                (s.parent, s.name.as_str()),
                (t.parent, t.name.as_str()),
            );
            let Some(&(parent, name)) = merge_field(&y_at, &s_at, &t_at) else {
                return Resolution::Conflict(ConflictReason::MoveMoveDivergent);
            };
            let Some(payload) = merge_field(&y.payload, &s.payload, &t.payload) else {
                return Resolution::Conflict(ConflictReason::EditEdit);
            };
            let merged = ElementState {
                parent,
                name: name.to_string(),
                payload: payload.clone(),
            };
            if &merged == t {
                Resolution::Keep
            } else {
                Resolution::Take(Some(merged))
            }
        }
        // Remaining shapes are caught by the equality checks above.
        _ => Resolution::Keep,
    }
}

/// Working state of a merge: proposed final states layered over the target.
struct Proposal<'a> {
    ancestor: &'a TreeView,
    source: &'a TreeView,
    target: &'a TreeView,
    proposed: HashMap<ElementId, Option<ElementState>>,
    conflicts: BTreeMap<ElementId, Conflict>,
}

impl<'a> Proposal<'a> {
    fn final_state(&self, key: ElementId) -> Option<&ElementState> {
        match self.proposed.get(&key) {
            Some(state) => state.as_ref(),
            None => self.target.get(key),
        }
    }

    fn final_keys(&self) -> Vec<ElementId> {
        let mut keys: HashSet<ElementId> = self.target.keys().collect();
        for (key, state) in &self.proposed {
            if state.is_some() {
                keys.insert(*key);
            } else {
                keys.remove(key);
            }
        }
        let mut keys: Vec<ElementId> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    fn path_of(&self, key: ElementId) -> Option<RepoPath> {
        self.target
            .path_of(key)
            .or_else(|| self.source.path_of(key))
            .or_else(|| self.ancestor.path_of(key))
    }

    fn record_conflict(&mut self, key: ElementId, reason: ConflictReason) {
        if self.conflicts.contains_key(&key) {
            return;
        }
        let conflict = Conflict {
            element: key,
            path: self.path_of(key),
            reason,
            ancestor: self.ancestor.get(key).cloned(),
            source: self.source.get(key).cloned(),
            target: self.target.get(key).cloned(),
        };
        self.conflicts.insert(key, conflict);
    }

    /// Drop a proposed change so the element keeps its target state.
    /// Returns false if nothing was proposed for `key`.
    fn retract(&mut self, key: ElementId, reason: ConflictReason) -> bool {
        if self.proposed.remove(&key).is_none() {
            return false;
        }
        debug!(element = %key, reason = reason.tag(), "Retracting merge change");
        self.record_conflict(key, reason);
        true
    }

    fn check_name_clashes(&mut self) -> bool {
        let mut bindings: BTreeMap<(ElementId, String), Vec<ElementId>> = BTreeMap::new();
        for key in self.final_keys() {
            if let Some(state) = self.final_state(key) {
                if let Some(parent) = state.parent {
                    bindings
                        .entry((parent, state.name.clone()))
                        .or_default()
                        .push(key);
                }
            }
        }

        // Slots held by the target's nested branches count as occupied.
        let nested: HashSet<(ElementId, String)> = self
            .target
            .nested_branches()
            .map(|(parent, name)| (parent, name.to_string()))
            .collect();

        let mut retracted = false;
        for (slot, keys) in bindings {
            if keys.len() < 2 && !nested.contains(&slot) {
                continue;
            }
            let reason = if keys.iter().all(|key| !self.ancestor.contains(*key)) {
                ConflictReason::AddAdd
            } else {
                ConflictReason::NameClash
            };
            for key in keys {
                retracted |= self.retract(key, reason);
            }
        }
        retracted
    }

    fn check_orphans(&mut self) -> bool {
        let mut retracted = false;
        for key in self.final_keys() {
            let Some(parent) = self.final_state(key).and_then(|state| state.parent) else {
                continue;
            };
            let parent_ok = self
                .final_state(parent)
                .map(|state| state.payload.is_directory())
                .unwrap_or(false);
            if parent_ok {
                continue;
            }
            retracted |= if self.proposed.contains_key(&key) {
                self.retract(key, ConflictReason::Orphan)
            } else {
                self.retract(parent, ConflictReason::Orphan)
            };
        }

        // A nested branch keeps its parent directory alive.
        let holders: Vec<ElementId> = self.target.nested_branches().map(|(parent, _)| parent).collect();
        for parent in holders {
            let parent_ok = self
                .final_state(parent)
                .map(|state| state.payload.is_directory())
                .unwrap_or(false);
            if !parent_ok {
                retracted |= self.retract(parent, ConflictReason::Orphan);
            }
        }
        retracted
    }

    fn check_cycles(&mut self) -> bool {
        let limit = self.proposed.len() + self.target.len() + 1;
        let mut cyclic = Vec::new();
        for (key, state) in &self.proposed {
            let Some(state) = state else {
                continue;
            };
            let mut current = state.parent;
            let mut steps = 0;
            while let Some(node) = current {
                if node == *key || steps > limit {
                    cyclic.push(*key);
                    break;
                }
                current = self.final_state(node).and_then(|state| state.parent);
                steps += 1;
            }
        }
        cyclic.sort();
        let mut retracted = false;
        for key in cyclic {
            retracted |= self.retract(key, ConflictReason::Cycle);
        }
        retracted
    }

    fn depth(&self, key: ElementId) -> usize {
        let mut depth = 0;
        let mut current = self.final_state(key).and_then(|state| state.parent);
        while let Some(node) = current {
            depth += 1;
            if depth > self.proposed.len() + self.target.len() {
                break;
            }
            current = self.final_state(node).and_then(|state| state.parent);
        }
        depth
    }

    fn into_result(self) -> MergeResult {
        let mut adds = Vec::new();
        let mut relocations = Vec::new();
        let mut modifications = Vec::new();
        let mut deletions = Vec::new();

        let mut keys: Vec<ElementId> = self.proposed.keys().copied().collect();
        keys.sort();
        for key in keys {
            let Some(proposed) = self.proposed.get(&key) else {
                continue;
            };
            match (proposed, self.target.get(key)) {
                (None, Some(_)) => deletions.push(MergeAction::Delete { element: key }),
                (Some(state), None) => {
                    if let Some(parent) = state.parent {
                        adds.push((
                            self.depth(key),
                            MergeAction::Add {
                                element: key,
                                parent,
                                name: state.name.clone(),
                                payload: state.payload.clone(),
                            },
                        ));
                    }
                }
                (Some(state), Some(current)) => {
                    if !state.same_location(current) {
                        if let Some(parent) = state.parent {
                            relocations.push(MergeAction::Relocate {
                                element: key,
                                parent,
                                name: state.name.clone(),
                            });
                        }
                    }
                    if state.payload != current.payload {
                        modifications.push(MergeAction::Modify {
                            element: key,
                            payload: state.payload.clone(),
                        });
                    }
                }
                (None, None) => {}
            }
        }
        adds.sort_by_key(|(depth, action)| (*depth, action.element()));

        let mut actions: Vec<MergeAction> = adds.into_iter().map(|(_, action)| action).collect();
        actions.extend(relocations);
        actions.extend(modifications);
        actions.extend(deletions);

        let mut conflicts: Vec<Conflict> = self.conflicts.into_values().collect();
        conflicts.sort_by(|a, b| a.path.cmp(&b.path).then(a.element.cmp(&b.element)));
        MergeResult { actions, conflicts }
    }
}

/// Merge the changes from `ancestor` to `source` into `target`.
///
/// All three views must share a root key; branch views of a branch and its
/// copies do, snapshot views of one repository always do.
pub fn merge(ancestor: &TreeView, source: &TreeView, target: &TreeView) -> Result<MergeResult> {
    if ancestor.root() != source.root() || source.root() != target.root() {
        return Err(EngineError::UnrelatedBranches);
    }

    let mut proposal = Proposal {
        ancestor,
        source,
        target,
        proposed: HashMap::new(),
        conflicts: BTreeMap::new(),
    };

    let incoming = diff(ancestor, source);
    for change in &incoming {
        let key = change.element;
        match resolve(ancestor.get(key), source.get(key), target.get(key)) {
            Resolution::Keep => {}
            Resolution::Take(state) => {
                proposal.proposed.insert(key, state);
            }
            Resolution::Conflict(reason) => proposal.record_conflict(key, reason),
        }
    }

    loop {
        let clashed = proposal.check_name_clashes();
        let orphaned = proposal.check_orphans();
        let cycled = proposal.check_cycles();
        if !(clashed || orphaned || cycled) {
            break;
        }
    }

    let result = proposal.into_result();
    debug!(
        incoming = incoming.len(),
        actions = result.actions.len(),
        conflicts = result.conflicts.len(),
        "Merged views"
    );
    for conflict in &result.conflicts {
        warn!(element = %conflict.element, reason = conflict.reason.tag(), "Merge conflict");
    }
    Ok(result)
}
