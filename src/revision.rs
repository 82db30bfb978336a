//! Revision specifiers and per-revision metadata.

use crate::error::{EngineError, Result};
use crate::tree::RepoPath;
use crate::types::Revision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A revision as written by a caller: a number or `HEAD`/`head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionSpec {
    Number(Revision),
    Head,
}

impl RevisionSpec {
    /// Resolve against the current head.
    pub fn resolve(&self, head: Revision) -> Result<Revision> {
        match *self {
            RevisionSpec::Head => Ok(head),
            RevisionSpec::Number(revision) if revision <= head => Ok(revision),
            RevisionSpec::Number(revision) => Err(EngineError::NoSuchRevision { revision }),
        }
    }
}

impl FromStr for RevisionSpec {
    type Err = EngineError;

    fn from_str(spec: &str) -> Result<Self> {
        match spec {
            "HEAD" | "head" => Ok(RevisionSpec::Head),
            _ if !spec.is_empty() && spec.bytes().all(|b| b.is_ascii_digit()) => spec
                .parse::<Revision>()
                .map(RevisionSpec::Number)
                .map_err(|_| EngineError::SyntaxError {
                    spec: spec.to_string(),
                }),
            _ => Err(EngineError::SyntaxError {
                spec: spec.to_string(),
            }),
        }
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSpec::Number(revision) => write!(f, "{}", revision),
            RevisionSpec::Head => f.write_str("HEAD"),
        }
    }
}

/// Parse a revision specifier and resolve it against `head`.
pub fn resolve_revision(spec: &str, head: Revision) -> Result<Revision> {
    spec.parse::<RevisionSpec>()?.resolve(head)
}

/// A path pinned to a revision, written `path@rev` (`path` alone means HEAD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PegPath {
    pub path: RepoPath,
    pub revision: RevisionSpec,
}

impl PegPath {
    pub fn new(path: impl Into<RepoPath>, revision: RevisionSpec) -> Self {
        PegPath {
            path: path.into(),
            revision,
        }
    }

    pub fn head(path: impl Into<RepoPath>) -> Self {
        Self::new(path, RevisionSpec::Head)
    }
}

impl FromStr for PegPath {
    type Err = EngineError;

    fn from_str(text: &str) -> Result<Self> {
        match text.rsplit_once('@') {
            Some((path, revision)) => Ok(PegPath::new(path, revision.parse()?)),
            None => Ok(PegPath::head(text)),
        }
    }
}

impl fmt::Display for PegPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path.to_absolute(), self.revision)
    }
}

/// Metadata recorded with each committed revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub revision: Revision,
    pub log_message: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl RevisionInfo {
    pub fn new(revision: Revision, log_message: Option<&str>) -> Self {
        RevisionInfo {
            revision,
            log_message: log_message.map(str::to_string),
            committed_at: Utc::now(),
        }
    }
}
