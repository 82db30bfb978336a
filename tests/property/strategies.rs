//! Generators for edit batches over a small, collision-prone path set

use proptest::prelude::*;
use treemover::EditOp;

/// Few enough paths that random ops regularly hit each other.
pub const PATHS: &[&str] = &["a", "b", "f", "a/x", "a/g", "b/y", "a/x/z"];

pub fn path() -> impl Strategy<Value = &'static str> {
    prop::sample::select(PATHS.to_vec())
}

pub fn edit_op() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        path().prop_map(EditOp::mkdir),
        (path(), "[a-z]{0,8}").prop_map(|(p, content)| EditOp::put(p, content)),
        (path(), path()).prop_map(|(src, dest)| EditOp::mv(src, dest)),
        path().prop_map(EditOp::rm),
        (path(), path()).prop_map(|(src, dest)| EditOp::copy("HEAD", src, dest).unwrap()),
        (path(), "[a-z]{1,4}").prop_map(|(p, value)| EditOp::propset(p, "color", &value)),
    ]
}

/// Several batches, each committed (or rejected) as a unit.
pub fn batches() -> impl Strategy<Value = Vec<Vec<EditOp>>> {
    prop::collection::vec(prop::collection::vec(edit_op(), 1..6), 1..5)
}
