//! Replacing directories with copies of their own nested children

use super::test_utils::{assert_changes, commit, cp};
use treemover::{EditOp, Repository};

#[test]
fn test_nested_replaces() {
    let repo = Repository::in_memory();
    commit(
        &repo,
        "",
        ["A", "A/B", "A/B/C", "M", "M/N", "M/N/O", "X", "X/Y", "X/Y/Z"]
            .into_iter()
            .map(EditOp::mkdir)
            .collect(),
    );

    assert_changes(
        &repo,
        "",
        vec![
            EditOp::rm("A"),
            EditOp::rm("M"),
            EditOp::rm("X"),
            cp("HEAD", "X/Y/Z", "A"),
            cp("HEAD", "A/B/C", "M"),
            cp("HEAD", "M/N/O", "X"),
            cp("HEAD", "A/B", "A/B"),
            cp("HEAD", "M/N", "M/N"),
            cp("HEAD", "X/Y", "X/Y"),
            EditOp::rm("A/B/C"),
            EditOp::rm("M/N/O"),
            EditOp::rm("X/Y/Z"),
            cp("HEAD", "X", "A/B/C"),
            cp("HEAD", "A", "M/N/O"),
            cp("HEAD", "M", "X/Y/Z"),
            EditOp::rm("A/B/C/Y"),
        ],
        &[
            "R /A (from /X/Y/Z:1)",
            "A /A/B (from /A/B:1)",
            "R /A/B/C (from /X:1)",
            "R /M (from /A/B/C:1)",
            "A /M/N (from /M/N:1)",
            "R /M/N/O (from /A:1)",
            "R /X (from /M/N/O:1)",
            "A /X/Y (from /X/Y:1)",
            "R /X/Y/Z (from /M:1)",
            "D /A/B/C/Y",
        ],
    );

    // Every directory in r2 is a fresh element.
    let r1 = repo.snapshot(1).unwrap();
    let r2 = repo.snapshot(2).unwrap();
    for path in ["A", "A/B", "A/B/C", "M", "M/N/O", "X/Y/Z"] {
        let old = r1.try_resolve(&path.into()).unwrap();
        let new = r2.try_resolve(&path.into()).unwrap();
        assert_ne!(old, new, "{} kept its identity", path);
    }
}
