//! Branch merges: no-op merges, fast-forward style merges, delete/move
//! conflicts, edits merged across a move, and branches nested in the target

use super::test_utils::{assert_changes, commit, trunk_tags_branches};
use treemover::config::ConflictPolicy;
use treemover::{ConflictReason, EditOp, EngineError, MergeRequest, Repository};

fn merge_request(source: &str, target: &str, ancestor: &str) -> MergeRequest {
    MergeRequest::parse(source, target, ancestor).unwrap()
}

fn merge_lines(repo: &Repository, source: &str, target: &str, ancestor: &str) -> Vec<String> {
    let outcome = repo.merge(&merge_request(source, target, ancestor)).unwrap();
    assert!(outcome.result.is_clean());
    let commit = outcome.commit.expect("merge should commit");
    let mut lines: Vec<String> = commit.changes.iter().map(ToString::to_string).collect();
    lines.sort();
    lines
}

/// r5: trunk and branches/br1 each carry one side of every
/// add/delete/move combination.
fn diverged_branches() -> Repository {
    let repo = trunk_tags_branches();

    // r2
    commit(
        &repo,
        "trunk",
        ["no_no", "rm_no", "no_rm", "mv_no", "no_mv", "rm_mv", "mv_rm"]
            .into_iter()
            .map(EditOp::mkdir)
            .collect(),
    );

    // r3
    commit(&repo, "", vec![EditOp::branch("trunk", "branches/br1")]);

    // r4
    commit(
        &repo,
        "trunk",
        vec![
            EditOp::mkdir("add_no"),
            EditOp::rm("rm_no"),
            EditOp::rm("rm_mv"),
            EditOp::mkdir("D1"),
            EditOp::mv("mv_no", "D1/mv_no"),
            EditOp::mv("mv_rm", "mv_rm_D1"),
        ],
    );

    // r5
    commit(
        &repo,
        "branches/br1",
        vec![
            EditOp::mkdir("no_add"),
            EditOp::rm("no_rm"),
            EditOp::rm("mv_rm"),
            EditOp::mkdir("D2"),
            EditOp::mv("no_mv", "D2/no_mv_B"),
            EditOp::mv("rm_mv", "D2/rm_mv_B"),
        ],
    );

    assert_eq!(repo.head().unwrap(), 5);
    repo
}

#[test]
fn test_branch_creates_branch_root() {
    let repo = diverged_branches();
    let branches: Vec<String> = repo
        .branches(5)
        .unwrap()
        .iter()
        .map(|path| path.to_absolute())
        .collect();
    assert_eq!(branches, vec!["/", "/branches/br1", "/trunk"]);
}

#[test]
fn test_merge_without_source_changes_commits_nothing() {
    let repo = diverged_branches();
    let outcome = repo
        .merge(&merge_request("trunk", "branches/br1", "trunk@4"))
        .unwrap();
    assert!(outcome.commit.is_none());
    assert!(outcome.result.is_empty());
    assert_eq!(repo.head().unwrap(), 5);
}

#[test]
fn test_merge_into_unchanged_target_takes_source() {
    let repo = diverged_branches();
    let outcome = repo
        .merge(&merge_request("branches/br1", "trunk", "trunk@4"))
        .unwrap();
    assert!(outcome.result.conflicts.is_empty());
    assert_eq!(outcome.commit.unwrap().revision, 6);

    let trunk = repo.branch_view(&"trunk".parse().unwrap()).unwrap();
    let br1 = repo.branch_view(&"branches/br1".parse().unwrap()).unwrap();
    assert_eq!(trunk.path_index(), br1.path_index());
}

#[test]
fn test_delete_move_conflicts_abort_merge() {
    let repo = diverged_branches();
    let err = repo
        .merge(&merge_request("trunk@5", "branches/br1", "trunk@2"))
        .unwrap_err();
    assert_eq!(err.code(), "Conflict");
    let EngineError::Conflict(conflicts) = err else {
        panic!("expected a conflict error");
    };
    assert_eq!(conflicts.len(), 2);
    assert!(conflicts
        .iter()
        .all(|conflict| conflict.reason == ConflictReason::DeleteMove));
    assert_eq!(repo.head().unwrap(), 5);
}

#[test]
fn test_apply_non_conflicting_commits_the_rest() {
    let repo = diverged_branches().with_conflict_policy(ConflictPolicy::ApplyNonConflicting);
    let outcome = repo
        .merge(&merge_request("trunk@5", "branches/br1", "trunk@2"))
        .unwrap();
    assert_eq!(outcome.result.conflicts.len(), 2);
    let commit = outcome.commit.expect("clean actions should commit");
    assert_eq!(commit.revision, 6);

    let head = repo.head_snapshot().unwrap();
    for path in ["add_no", "D1/mv_no", "no_add", "D2/no_mv_B", "D2/rm_mv_B", "no_no"] {
        let full = format!("branches/br1/{}", path);
        assert!(head.try_resolve(&full.as_str().into()).is_some(), "{} missing", full);
    }
    for path in ["rm_no", "no_rm", "mv_no", "mv_rm", "mv_rm_D1"] {
        let full = format!("branches/br1/{}", path);
        assert!(head.try_resolve(&full.as_str().into()).is_none(), "{} present", full);
    }
}

#[test]
fn test_merge_edits_with_move() {
    let repo = trunk_tags_branches();

    // r2
    assert_changes(
        &repo,
        "trunk",
        vec![
            EditOp::mkdir("lib"),
            EditOp::mkdir("lib/foo"),
            EditOp::mkdir("lib/foo/x"),
            EditOp::mkdir("lib/foo/y"),
        ],
        &[
            "A /trunk/lib",
            "A /trunk/lib/foo",
            "A /trunk/lib/foo/x",
            "A /trunk/lib/foo/y",
        ],
    );

    // r3
    assert_changes(
        &repo,
        "",
        vec![EditOp::branch("trunk", "branches/br1")],
        &["A /branches/br1 (from /trunk:2)"],
    );

    // r4
    assert_changes(
        &repo,
        "trunk",
        vec![
            EditOp::rm("lib/foo/x"),
            EditOp::mv("lib/foo/y", "lib/foo/y2"),
            EditOp::mkdir("lib/foo/z"),
        ],
        &[
            "D /trunk/lib/foo/x",
            "D /trunk/lib/foo/y",
            "A /trunk/lib/foo/y2 (from /trunk/lib/foo/y:3)",
            "A /trunk/lib/foo/z",
        ],
    );

    // r5
    assert_changes(
        &repo,
        "branches/br1",
        vec![EditOp::mv("lib/foo", "bar")],
        &[
            "A /branches/br1/bar (from /branches/br1/lib/foo:4)",
            "D /branches/br1/lib/foo",
        ],
    );

    // r6
    assert_eq!(
        merge_lines(&repo, "branches/br1@5", "trunk", "trunk@2"),
        vec!["A /trunk/bar (from /trunk/lib/foo:5)", "D /trunk/lib/foo"]
    );

    // r7
    assert_eq!(
        merge_lines(&repo, "trunk@5", "branches/br1", "trunk@2"),
        vec![
            "A /branches/br1/bar/y2 (from /branches/br1/bar/y:6)",
            "A /branches/br1/bar/z",
            "D /branches/br1/bar/x",
            "D /branches/br1/bar/y",
        ]
    );

    let trunk = repo.branch_view(&"trunk".parse().unwrap()).unwrap();
    let br1 = repo.branch_view(&"branches/br1".parse().unwrap()).unwrap();
    assert_eq!(trunk.path_index(), br1.path_index());
}

#[test]
fn test_divergent_moves_conflict() {
    let repo = trunk_tags_branches();
    commit(&repo, "trunk", vec![EditOp::mkdir("lib"), EditOp::mkdir("lib/x")]);
    commit(&repo, "", vec![EditOp::branch("trunk", "branches/br1")]);
    commit(&repo, "trunk", vec![EditOp::mv("lib/x", "x1")]);
    commit(&repo, "branches/br1", vec![EditOp::mv("lib/x", "x2")]);

    let err = repo
        .merge(&merge_request("branches/br1", "trunk", "trunk@3"))
        .unwrap_err();
    let EngineError::Conflict(conflicts) = err else {
        panic!("expected a conflict error");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].reason, ConflictReason::MoveMoveDivergent);
    assert_eq!(conflicts[0].to_string().split(' ').next(), Some("move/move-divergent"));
    assert_eq!(repo.head().unwrap(), 5);

    let repo = repo.with_conflict_policy(ConflictPolicy::ApplyNonConflicting);
    let outcome = repo
        .merge(&merge_request("branches/br1", "trunk", "trunk@3"))
        .unwrap();
    assert!(outcome.commit.is_none());
    assert_eq!(outcome.result.conflicts.len(), 1);
}

fn branch_paths(repo: &Repository, revision: u64) -> Vec<String> {
    repo.branches(revision)
        .unwrap()
        .iter()
        .map(|path| path.to_absolute())
        .collect()
}

#[test]
fn test_add_over_nested_branch_conflicts() {
    let repo = trunk_tags_branches();
    commit(&repo, "trunk", vec![EditOp::mkdir("lib")]);
    commit(&repo, "", vec![EditOp::branch("trunk", "branches/b")]);
    commit(&repo, "trunk", vec![EditOp::mkbranch("sub")]);
    commit(&repo, "branches/b", vec![EditOp::mkdir("sub")]);

    let err = repo
        .merge(&merge_request("branches/b", "trunk", "trunk@3"))
        .unwrap_err();
    let EngineError::Conflict(conflicts) = err else {
        panic!("expected a conflict error, not an internal failure");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].reason, ConflictReason::AddAdd);
    assert_eq!(repo.head().unwrap(), 5);

    let repo = repo.with_conflict_policy(ConflictPolicy::ApplyNonConflicting);
    let outcome = repo
        .merge(&merge_request("branches/b", "trunk", "trunk@3"))
        .unwrap();
    assert!(outcome.commit.is_none());
    assert_eq!(outcome.result.conflicts.len(), 1);
    assert!(branch_paths(&repo, 5).contains(&"/trunk/sub".to_string()));
}

#[test]
fn test_delete_above_nested_branch_conflicts() {
    let repo = trunk_tags_branches();
    commit(&repo, "trunk", vec![EditOp::mkdir("d")]);
    commit(&repo, "", vec![EditOp::branch("trunk", "branches/b")]);
    commit(
        &repo,
        "trunk",
        vec![EditOp::mkbranch("d/nb"), EditOp::put("d/nb/work", "keep me")],
    );
    commit(&repo, "branches/b", vec![EditOp::rm("d"), EditOp::mkdir("other")]);

    let err = repo
        .merge(&merge_request("branches/b", "trunk", "trunk@3"))
        .unwrap_err();
    let EngineError::Conflict(conflicts) = err else {
        panic!("expected a conflict error");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].reason, ConflictReason::Orphan);

    let repo = repo.with_conflict_policy(ConflictPolicy::ApplyNonConflicting);
    let outcome = repo
        .merge(&merge_request("branches/b", "trunk", "trunk@3"))
        .unwrap();
    let commit = outcome.commit.expect("the unrelated add should commit");
    let lines: Vec<String> = commit.changes.iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec!["A /trunk/other"]);

    let head = repo.head_snapshot().unwrap();
    let work = head.try_resolve(&"trunk/d/nb/work".into()).unwrap();
    assert_eq!(head.content_of(work).unwrap().content(), Some(&b"keep me"[..]));
    assert!(branch_paths(&repo, 6).contains(&"/trunk/d/nb".to_string()));
}

#[test]
fn test_nested_branch_travels_with_merged_move() {
    let repo = trunk_tags_branches();
    commit(
        &repo,
        "trunk",
        vec![
            EditOp::mkdir("lib"),
            EditOp::mkbranch("lib/nb"),
            EditOp::put("lib/nb/f", "nested"),
        ],
    );
    commit(&repo, "", vec![EditOp::branch("trunk", "branches/b")]);
    commit(&repo, "branches/b", vec![EditOp::mv("lib", "lib2")]);

    assert_eq!(
        merge_lines(&repo, "branches/b", "trunk", "trunk@3"),
        vec!["A /trunk/lib2 (from /trunk/lib:4)", "D /trunk/lib"]
    );

    let branches = branch_paths(&repo, 5);
    assert!(branches.contains(&"/trunk/lib2/nb".to_string()));
    assert!(!branches.contains(&"/trunk/lib/nb".to_string()));
    let head = repo.head_snapshot().unwrap();
    let f = head.try_resolve(&"trunk/lib2/nb/f".into()).unwrap();
    assert_eq!(head.content_of(f).unwrap().content(), Some(&b"nested"[..]));
}
