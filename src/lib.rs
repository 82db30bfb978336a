//! Treemover: Versioned Tree Mutation and Move-Aware Merge
//!
//! Applies batches of structural edits to a versioned tree, commits them
//! atomically as new revisions, and merges divergent branches while keeping
//! track of element identity across moves, renames and copies.

pub mod changelog;
pub mod config;
pub mod diff;
pub mod error;
pub mod identity;
pub mod logging;
pub mod merge;
pub mod repository;
pub mod revision;
pub mod store;
pub mod tree;
pub mod txn;
pub mod types;
pub mod views;

pub use changelog::{ChangeAction, ChangeRecord, CopySource};
pub use error::{EngineError, Result, StorageError};
pub use merge::{Conflict, ConflictReason, MergeAction, MergeResult};
pub use repository::{CommitInfo, LogEntry, MergeOutcome, MergeRequest, Repository};
pub use revision::{PegPath, RevisionSpec};
pub use tree::RepoPath;
pub use txn::{EditOp, EditTransaction};
pub use types::{ElementId, Revision};
