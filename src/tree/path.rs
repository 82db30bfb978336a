//! Repository path normalization

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Normalize a repository path string
///
/// This function:
/// 1. Normalizes Unicode to NFC
/// 2. Drops leading, trailing and repeated separators
/// 3. Drops `.` segments
pub fn normalize_path_string(path: &str) -> String {
    let normalized: String = path.nfc().collect();
    normalized
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// A path inside the versioned tree, relative to some anchor.
///
/// The empty path denotes the anchor itself. Segments are plain element
/// names; no escaping is applied (`y%20y.c` is a literal name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPath(String);

impl RepoPath {
    pub fn new(path: &str) -> Self {
        RepoPath(normalize_path_string(path))
    }

    pub fn root() -> Self {
        RepoPath(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Append a single element name.
    pub fn child(&self, name: &str) -> RepoPath {
        if self.is_root() {
            RepoPath(name.to_string())
        } else {
            RepoPath(format!("{}/{}", self.0, name))
        }
    }

    pub fn join(&self, other: &RepoPath) -> RepoPath {
        if other.is_root() {
            self.clone()
        } else if self.is_root() {
            other.clone()
        } else {
            RepoPath(format!("{}/{}", self.0, other.0))
        }
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(RepoPath(self.0[..idx].to_string())),
            None => Some(RepoPath::root()),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        })
    }

    /// Segment-wise prefix test (`a/b` is under `a`, `ab` is not).
    pub fn starts_with(&self, prefix: &RepoPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Absolute rendering with a leading slash, as used in change logs.
    pub fn to_absolute(&self) -> String {
        format!("/{}", self.0)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoPath {
    fn from(path: &str) -> Self {
        RepoPath::new(path)
    }
}

impl From<String> for RepoPath {
    fn from(path: String) -> Self {
        RepoPath::new(&path)
    }
}
