//! Edit Transaction
//!
//! A transaction queues edit operations against a base snapshot and an
//! anchor path. Nothing is applied until commit, when every operation is
//! replayed in issue order on a copy-on-write working tree. The first failure
//! discards the working tree, so a transaction takes effect whole or not at
//! all.

pub mod stage;

use crate::error::{EngineError, Result};
use crate::identity::ElementRegistry;
use crate::merge::MergeAction;
use crate::revision::RevisionSpec;
use crate::store::RevisionStore;
use crate::tree::{RepoPath, Snapshot, TreeIndex};
use crate::types::Revision;
use stage::Stage;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One structural edit. Paths are relative to the transaction anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    MakeDir {
        path: RepoPath,
    },
    /// A new empty directory marked as a branch root.
    MakeBranch {
        path: RepoPath,
    },
    PutFile {
        path: RepoPath,
        content: Vec<u8>,
    },
    Copy {
        revision: RevisionSpec,
        src: RepoPath,
        dest: RepoPath,
    },
    Move {
        src: RepoPath,
        dest: RepoPath,
    },
    Delete {
        path: RepoPath,
    },
    Branch {
        src: RepoPath,
        dest: RepoPath,
    },
    /// Set (`Some`) or remove (`None`) a property.
    SetProperty {
        path: RepoPath,
        name: String,
        value: Option<String>,
    },
}

impl EditOp {
    pub fn mkdir(path: &str) -> Self {
        EditOp::MakeDir {
            path: RepoPath::new(path),
        }
    }

    pub fn mkbranch(path: &str) -> Self {
        EditOp::MakeBranch {
            path: RepoPath::new(path),
        }
    }

    pub fn put(path: &str, content: impl Into<Vec<u8>>) -> Self {
        EditOp::PutFile {
            path: RepoPath::new(path),
            content: content.into(),
        }
    }

    /// Copy `src` as of `revision` (a number, `HEAD` or `head`) to `dest`.
    pub fn copy(revision: &str, src: &str, dest: &str) -> Result<Self> {
        Ok(EditOp::Copy {
            revision: revision.parse()?,
            src: RepoPath::new(src),
            dest: RepoPath::new(dest),
        })
    }

    pub fn mv(src: &str, dest: &str) -> Self {
        EditOp::Move {
            src: RepoPath::new(src),
            dest: RepoPath::new(dest),
        }
    }

    pub fn rm(path: &str) -> Self {
        EditOp::Delete {
            path: RepoPath::new(path),
        }
    }

    pub fn branch(src: &str, dest: &str) -> Self {
        EditOp::Branch {
            src: RepoPath::new(src),
            dest: RepoPath::new(dest),
        }
    }

    pub fn propset(path: &str, name: &str, value: &str) -> Self {
        EditOp::SetProperty {
            path: RepoPath::new(path),
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn propdel(path: &str, name: &str) -> Self {
        EditOp::SetProperty {
            path: RepoPath::new(path),
            name: name.to_string(),
            value: None,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            EditOp::MakeDir { .. } => "mkdir",
            EditOp::MakeBranch { .. } => "mkbranch",
            EditOp::PutFile { .. } => "put",
            EditOp::Copy { .. } => "cp",
            EditOp::Move { .. } => "mv",
            EditOp::Delete { .. } => "rm",
            EditOp::Branch { .. } => "branch",
            EditOp::SetProperty { value: Some(_), .. } => "propset",
            EditOp::SetProperty { value: None, .. } => "propdel",
        }
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::MakeDir { path } | EditOp::MakeBranch { path } | EditOp::Delete { path } => {
                write!(f, "{} {}", self.verb(), path)
            }
            EditOp::PutFile { path, content } => {
                write!(f, "put <{} bytes> {}", content.len(), path)
            }
            EditOp::Copy {
                revision,
                src,
                dest,
            } => write!(f, "cp {} {} {}", revision, src, dest),
            EditOp::Move { src, dest } | EditOp::Branch { src, dest } => {
                write!(f, "{} {} {}", self.verb(), src, dest)
            }
            EditOp::SetProperty { path, name, value } => match value {
                Some(value) => write!(f, "propset {} {} {}", name, value, path),
                None => write!(f, "propdel {} {}", name, path),
            },
        }
    }
}

/// Work queued in a transaction.
#[derive(Debug, Clone)]
pub(crate) enum Pending {
    Edit(EditOp),
    /// Merge actions for the branch rooted at `target` (a repository path).
    Merge {
        target: RepoPath,
        actions: Vec<MergeAction>,
    },
}

#[derive(Debug, Clone)]
pub struct EditTransaction {
    base: Arc<Snapshot>,
    anchor: RepoPath,
    pending: Vec<Pending>,
}

impl EditTransaction {
    /// Open a transaction on `base`. The anchor must name a directory.
    pub fn new(base: Arc<Snapshot>, anchor: RepoPath) -> Result<Self> {
        let anchor_id = base.resolve(&anchor)?;
        let is_dir = base
            .element(anchor_id)
            .map(|record| record.payload.is_directory())
            .unwrap_or(false);
        if !is_dir {
            return Err(EngineError::NotADirectory {
                path: anchor.to_string(),
            });
        }
        debug!(base = base.revision(), anchor = %anchor, "Opened transaction");
        Ok(EditTransaction {
            base,
            anchor,
            pending: Vec::new(),
        })
    }

    pub fn base(&self) -> &Arc<Snapshot> {
        &self.base
    }

    pub fn base_revision(&self) -> Revision {
        self.base.revision()
    }

    pub fn anchor(&self) -> &RepoPath {
        &self.anchor
    }

    pub fn push(&mut self, op: EditOp) -> &mut Self {
        self.pending.push(Pending::Edit(op));
        self
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = EditOp>) -> &mut Self {
        self.pending.extend(ops.into_iter().map(Pending::Edit));
        self
    }

    pub(crate) fn push_merge(&mut self, target: RepoPath, actions: Vec<MergeAction>) {
        self.pending.push(Pending::Merge { target, actions });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The queued edit operations, in issue order.
    pub fn ops(&self) -> impl Iterator<Item = &EditOp> {
        self.pending.iter().filter_map(|pending| match pending {
            Pending::Edit(op) => Some(op),
            Pending::Merge { .. } => None,
        })
    }

    /// Replay every queued operation on a working copy of the base and
    /// return the resulting tree. The base is never modified.
    pub fn stage(&self, store: &dyn RevisionStore, registry: &ElementRegistry) -> Result<TreeIndex> {
        let mut stage = Stage::new(Arc::clone(&self.base), store, registry, self.anchor.clone())?;
        for pending in &self.pending {
            match pending {
                Pending::Edit(op) => stage.apply(op)?,
                Pending::Merge { target, actions } => stage.apply_merge(target, actions)?,
            }
        }
        stage.finish()
    }
}
