//! Versioned Tree
//!
//! Identity-indexed elements, the derived path index, and the immutable
//! per-revision [`Snapshot`](snapshot::Snapshot).

pub mod element;
pub mod hasher;
pub mod index;
pub mod path;
pub mod snapshot;

pub use element::{CopyFrom, ElementKind, ElementRecord, Payload};
pub use index::TreeIndex;
pub use path::RepoPath;
pub use snapshot::Snapshot;
