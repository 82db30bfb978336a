//! Moves and renames within one branch keep element identity

use super::test_utils::{assert_changes, commit, trunk_tags_branches};
use treemover::diff::ChangeKind;
use treemover::{EditOp, Repository};

/// r2: a populated trunk.
fn populated_trunk() -> Repository {
    let repo = trunk_tags_branches();
    commit(
        &repo,
        "trunk",
        vec![
            EditOp::put("README", "This is the README.\n"),
            EditOp::mkdir("lib"),
            EditOp::mkdir("lib/foo"),
            EditOp::mkdir("lib/foo/x"),
            EditOp::mkdir("lib/foo/y"),
            EditOp::put("lib/foo/file", "This is lib/foo/file.\n"),
        ],
    );
    repo
}

#[test]
fn test_simple_moves_within_a_branch() {
    let repo = populated_trunk();

    // rename only, file
    assert_changes(
        &repo,
        "trunk",
        vec![EditOp::mv("README", "README.txt")],
        &["A /trunk/README.txt (from /trunk/README:2)", "D /trunk/README"],
    );

    // move only, file
    assert_changes(
        &repo,
        "trunk",
        vec![EditOp::mv("README.txt", "lib/README.txt")],
        &["A /trunk/lib/README.txt (from /trunk/README.txt:3)", "D /trunk/README.txt"],
    );

    // rename only, empty dir
    assert_changes(
        &repo,
        "trunk",
        vec![EditOp::mv("lib/foo/y", "lib/foo/y2")],
        &["A /trunk/lib/foo/y2 (from /trunk/lib/foo/y:4)", "D /trunk/lib/foo/y"],
    );

    // move only, empty dir
    assert_changes(
        &repo,
        "trunk",
        vec![EditOp::mv("lib/foo/y2", "y2")],
        &["A /trunk/y2 (from /trunk/lib/foo/y2:5)", "D /trunk/lib/foo/y2"],
    );

    // move and rename, dir with children
    assert_changes(
        &repo,
        "trunk",
        vec![EditOp::mkdir("subdir"), EditOp::mv("lib", "subdir/lib2")],
        &[
            "A /trunk/subdir",
            "A /trunk/subdir/lib2 (from /trunk/lib:6)",
            "D /trunk/lib",
        ],
    );

    // put it all back in one commit
    assert_changes(
        &repo,
        "trunk",
        vec![
            EditOp::mv("subdir/lib2/README.txt", "README"),
            EditOp::mv("subdir/lib2", "lib"),
            EditOp::mv("y2", "lib/foo/y"),
            EditOp::rm("subdir"),
        ],
        &[
            "A /trunk/README (from /trunk/subdir/lib2/README.txt:7)",
            "A /trunk/lib (from /trunk/subdir/lib2:7)",
            "A /trunk/lib/foo/y (from /trunk/y2:7)",
            "D /trunk/lib/README.txt",
            "D /trunk/subdir",
            "D /trunk/y2",
        ],
    );

    let before = repo.branch_view(&"trunk@2".parse().unwrap()).unwrap();
    let after = repo.branch_view(&"trunk".parse().unwrap()).unwrap();
    assert_eq!(before.path_index(), after.path_index());
}

#[test]
fn test_move_is_one_relocation_in_diff() {
    let repo = populated_trunk();
    commit(&repo, "trunk", vec![EditOp::mv("lib/foo", "foo2")]);

    let diffs = repo.diff(2, 3).unwrap();
    assert_eq!(diffs.len(), 1);
    let moved = &diffs[0];
    assert!(moved.is_relocation());
    assert!(matches!(
        moved.kind,
        ChangeKind::Modify {
            relocated: true,
            payload_changed: false
        }
    ));
    assert_eq!(moved.old_path.as_ref().map(|p| p.as_str()), Some("trunk/lib/foo"));
    assert_eq!(moved.new_path.as_ref().map(|p| p.as_str()), Some("trunk/foo2"));
}

#[test]
fn test_edit_and_move_in_one_commit() {
    let repo = populated_trunk();
    assert_changes(
        &repo,
        "trunk",
        vec![
            EditOp::put("lib/foo/file", "changed\n"),
            EditOp::mv("lib/foo/file", "file"),
        ],
        &["A /trunk/file (from /trunk/lib/foo/file:2)", "D /trunk/lib/foo/file"],
    );

    let diffs = repo.diff(2, 3).unwrap();
    assert_eq!(diffs.len(), 1);
    assert!(matches!(
        diffs[0].kind,
        ChangeKind::Modify {
            relocated: true,
            payload_changed: true
        }
    ));
}

#[test]
fn test_in_place_edit_is_modify() {
    let repo = populated_trunk();
    assert_changes(
        &repo,
        "trunk",
        vec![
            EditOp::put("lib/foo/file", "changed\n"),
            EditOp::propset("lib", "svn:ignore", "*.o"),
        ],
        &["M /trunk/lib", "M /trunk/lib/foo/file"],
    );
    assert_changes(
        &repo,
        "trunk",
        vec![EditOp::propdel("lib", "svn:ignore")],
        &["M /trunk/lib"],
    );
}

#[test]
fn test_move_into_own_subtree_is_rejected() {
    let repo = populated_trunk();
    let err = repo
        .execute("trunk", vec![EditOp::mv("lib", "lib/foo/lib")], None)
        .unwrap_err();
    assert_eq!(err.code(), "InvalidOperation");
    assert_eq!(repo.head().unwrap(), 2);
}
