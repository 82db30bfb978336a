//! Core identifier types shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte BLAKE3 digest
pub type Hash = [u8; 32];

/// Revision number. Revision 0 is the empty repository.
pub type Revision = u64;

/// Stable identity of a tree element.
///
/// Allocated once by the [`ElementRegistry`](crate::identity::ElementRegistry)
/// and never reused, independent of where the element currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl ElementId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}
