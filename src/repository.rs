//! Repository
//!
//! Owns the revision store and the identity registry, serializes commits, and
//! orchestrates merges between branches. The head revision always comes from
//! the store.

use crate::changelog::{self, ChangeRecord};
use crate::config::{ConflictPolicy, EngineConfig, MergeConfig, StorageBackend};
use crate::diff::{diff_snapshots, ElementDiff};
use crate::error::{EngineError, Result};
use crate::identity::ElementRegistry;
use crate::merge::{merge, MergeResult};
use crate::revision::{PegPath, RevisionInfo};
use crate::store::{MemoryRevisionStore, RevisionStore, SledRevisionStore};
use crate::tree::{RepoPath, Snapshot};
use crate::txn::{EditOp, EditTransaction};
use crate::types::Revision;
use crate::views::TreeView;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A committed revision and its change records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub revision: Revision,
    pub changes: Vec<ChangeRecord>,
}

/// Log entry for one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub info: RevisionInfo,
    pub changes: Vec<ChangeRecord>,
}

/// Merge the changes from `ancestor` to `source` into the head of `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub source: PegPath,
    pub target: RepoPath,
    pub ancestor: PegPath,
}

impl MergeRequest {
    /// Parse `path[@rev]` locations; the target is always at head.
    pub fn parse(source: &str, target: &str, ancestor: &str) -> Result<Self> {
        Ok(MergeRequest {
            source: source.parse()?,
            target: RepoPath::new(target),
            ancestor: ancestor.parse()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// `None` when there was nothing to commit.
    pub commit: Option<CommitInfo>,
    pub result: MergeResult,
}

pub struct Repository {
    store: Arc<dyn RevisionStore>,
    registry: ElementRegistry,
    commit_lock: Mutex<()>,
    merge_config: MergeConfig,
}

impl Repository {
    /// A fresh in-memory repository at revision 0.
    pub fn in_memory() -> Self {
        let store: Arc<dyn RevisionStore> = Arc::new(MemoryRevisionStore::new());
        let registry = ElementRegistry::starting_at(1);
        Repository {
            store,
            registry,
            commit_lock: Mutex::new(()),
            merge_config: MergeConfig::default(),
        }
    }

    /// Wrap an existing store; id allocation resumes above everything the
    /// head revision has seen issued.
    pub fn with_store(store: Arc<dyn RevisionStore>) -> Result<Self> {
        let head = store.head()?;
        let head_snapshot = store.snapshot(head)?;
        let registry = ElementRegistry::resume_from(head_snapshot.as_ref());
        Ok(Repository {
            store,
            registry,
            commit_lock: Mutex::new(()),
            merge_config: MergeConfig::default(),
        })
    }

    pub fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn RevisionStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryRevisionStore::new()),
            StorageBackend::Sled => Arc::new(SledRevisionStore::open(&config.storage.path)?),
        };
        let mut repository = Self::with_store(store)?;
        repository.merge_config = config.merge.clone();
        info!(backend = ?config.storage.backend, head = repository.head()?, "Opened repository");
        Ok(repository)
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.merge_config.conflict_policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn RevisionStore> {
        &self.store
    }

    /// Flush the store and release it.
    pub fn close(self) -> Result<()> {
        self.store.flush()?;
        debug!("Closed repository");
        Ok(())
    }

    pub fn head(&self) -> Result<Revision> {
        Ok(self.store.head()?)
    }

    pub fn snapshot(&self, revision: Revision) -> Result<Arc<Snapshot>> {
        if revision > self.head()? {
            return Err(EngineError::NoSuchRevision { revision });
        }
        Ok(self.store.snapshot(revision)?)
    }

    pub fn head_snapshot(&self) -> Result<Arc<Snapshot>> {
        Ok(self.store.snapshot(self.head()?)?)
    }

    /// Resolve a revision specifier (`12`, `HEAD`, `head`).
    pub fn resolve_revision(&self, spec: &str) -> Result<Revision> {
        crate::revision::resolve_revision(spec, self.head()?)
    }

    /// Open a transaction on the current head.
    pub fn begin(&self, anchor: &str) -> Result<EditTransaction> {
        EditTransaction::new(self.head_snapshot()?, RepoPath::new(anchor))
    }

    /// Open a transaction on an older revision. Committing it fails with
    /// `StaleBase` unless `revision` is still the head.
    pub fn begin_at(&self, revision: Revision, anchor: &str) -> Result<EditTransaction> {
        EditTransaction::new(self.snapshot(revision)?, RepoPath::new(anchor))
    }

    /// Apply a transaction and publish it as the next revision.
    #[instrument(skip_all, fields(base = txn.base_revision(), ops = txn.len()))]
    pub fn commit(&self, txn: EditTransaction, message: Option<&str>) -> Result<CommitInfo> {
        let _guard = self.commit_lock.lock();
        let head = self.head()?;
        if txn.base_revision() != head {
            warn!(base = txn.base_revision(), head, "Rejecting commit on stale base");
            return Err(EngineError::StaleBase {
                base: txn.base_revision(),
                head,
            });
        }

        let index = txn.stage(self.store.as_ref(), &self.registry)?;
        let revision = head + 1;
        let snapshot = Snapshot::new(revision, index, self.registry.high_water());
        let changes = changelog::render(txn.base(), &snapshot, self.store.as_ref())?;
        self.store.append(snapshot, RevisionInfo::new(revision, message))?;

        info!(revision, changes = changes.len(), "Committed revision");
        Ok(CommitInfo { revision, changes })
    }

    /// Open, fill and commit a transaction on the head in one call.
    pub fn execute(
        &self,
        anchor: &str,
        ops: impl IntoIterator<Item = EditOp>,
        message: Option<&str>,
    ) -> Result<CommitInfo> {
        let mut txn = self.begin(anchor)?;
        txn.extend(ops);
        self.commit(txn, message)
    }

    /// Identity-level diff between two revisions.
    pub fn diff(&self, base: Revision, target: Revision) -> Result<Vec<ElementDiff>> {
        let base = self.snapshot(base)?;
        let target = self.snapshot(target)?;
        Ok(diff_snapshots(&base, &target))
    }

    pub fn log(&self, revision: Revision) -> Result<LogEntry> {
        let target = self.snapshot(revision)?;
        let info = self.store.info(revision)?;
        let changes = match revision.checked_sub(1) {
            Some(previous) => {
                let base = self.store.snapshot(previous)?;
                changelog::render(&base, &target, self.store.as_ref())?
            }
            None => Vec::new(),
        };
        Ok(LogEntry { info, changes })
    }

    /// Paths of every branch root at `revision`.
    pub fn branches(&self, revision: Revision) -> Result<Vec<RepoPath>> {
        Ok(self.snapshot(revision)?.branch_roots())
    }

    fn branch_snapshot(&self, location: &PegPath) -> Result<Arc<Snapshot>> {
        let revision = location.revision.resolve(self.head()?)?;
        let snapshot = self.snapshot(revision)?;
        if !snapshot.is_branch_root(&location.path) {
            return Err(match snapshot.try_resolve(&location.path) {
                None => EngineError::not_found(&location.path),
                Some(_) => EngineError::NotABranch {
                    path: location.path.to_string(),
                },
            });
        }
        Ok(snapshot)
    }

    /// Lineage-keyed view of the branch at `location`.
    pub fn branch_view(&self, location: &PegPath) -> Result<TreeView> {
        let snapshot = self.branch_snapshot(location)?;
        TreeView::branch(&snapshot, &location.path)
    }

    /// Merge per the configured conflict policy.
    ///
    /// With `Abort`, any conflict fails the merge with `Conflict` and nothing
    /// is committed. With `ApplyNonConflicting`, the clean actions are
    /// committed and the conflicts are returned in the outcome.
    #[instrument(skip_all, fields(source = %request.source, target = %request.target, ancestor = %request.ancestor))]
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome> {
        let ancestor = self.branch_view(&request.ancestor)?;
        let source = self.branch_view(&request.source)?;
        let target_location = PegPath::head(request.target.clone());
        let head_snapshot = self.branch_snapshot(&target_location)?;
        let target = TreeView::branch(&head_snapshot, &request.target)?;

        let result = merge(&ancestor, &source, &target)?;
        if !result.is_clean() && self.merge_config.conflict_policy == ConflictPolicy::Abort {
            warn!(conflicts = result.conflicts.len(), "Merge aborted on conflicts");
            return Err(EngineError::Conflict(result.conflicts));
        }
        if result.actions.is_empty() {
            info!(conflicts = result.conflicts.len(), "Nothing to merge");
            return Ok(MergeOutcome {
                commit: None,
                result,
            });
        }

        let mut txn = EditTransaction::new(head_snapshot, RepoPath::root())?;
        txn.push_merge(request.target.clone(), result.actions.clone());
        let message = format!(
            "Merge {} into {} (ancestor {})",
            request.source, request.target.to_absolute(), request.ancestor
        );
        let commit = self.commit(txn, Some(&message))?;
        Ok(MergeOutcome {
            commit: Some(commit),
            result,
        })
    }
}
