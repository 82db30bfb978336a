//! Element records: the identity-bearing nodes of the versioned tree.

use crate::tree::hasher;
use crate::tree::path::RepoPath;
use crate::types::{ElementId, Hash, Revision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Directory,
    File,
}

/// Element content: nothing but properties for directories, bytes plus
/// properties for files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Directory {
        props: BTreeMap<String, String>,
    },
    File {
        content: Vec<u8>,
        content_hash: Hash,
        props: BTreeMap<String, String>,
    },
}

impl Payload {
    pub fn directory() -> Self {
        Payload::Directory {
            props: BTreeMap::new(),
        }
    }

    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let content_hash = hasher::compute_content_hash(&content);
        Payload::File {
            content,
            content_hash,
            props: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Payload::Directory { .. } => ElementKind::Directory,
            Payload::File { .. } => ElementKind::File,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Payload::Directory { .. })
    }

    pub fn content(&self) -> Option<&[u8]> {
        match self {
            Payload::File { content, .. } => Some(content),
            Payload::Directory { .. } => None,
        }
    }

    pub fn content_hash(&self) -> Option<&Hash> {
        match self {
            Payload::File { content_hash, .. } => Some(content_hash),
            Payload::Directory { .. } => None,
        }
    }

    pub fn props(&self) -> &BTreeMap<String, String> {
        match self {
            Payload::Directory { props } | Payload::File { props, .. } => props,
        }
    }

    pub fn props_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            Payload::Directory { props } | Payload::File { props, .. } => props,
        }
    }

    /// Replace file content in place, keeping properties. Returns false for
    /// directories.
    pub fn set_content(&mut self, new_content: Vec<u8>) -> bool {
        match self {
            Payload::File {
                content,
                content_hash,
                ..
            } => {
                *content_hash = hasher::compute_content_hash(&new_content);
                *content = new_content;
                true
            }
            Payload::Directory { .. } => false,
        }
    }

    /// Digest over kind, content and properties.
    pub fn digest(&self) -> Hash {
        let kind = match self.kind() {
            ElementKind::Directory => "directory",
            ElementKind::File => "file",
        };
        hasher::compute_payload_digest(kind, self.content_hash(), self.props())
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.content_hash() == other.content_hash()
            && self.props() == other.props()
    }
}

impl Eq for Payload {}

/// Provenance of a copied element: the element it mirrors, where that
/// element lived, and in which revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFrom {
    pub element: ElementId,
    pub path: RepoPath,
    pub revision: Revision,
}

/// One element as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: ElementId,
    /// Family identity shared by the same logical element across branches.
    pub lineage: ElementId,
    /// `None` only for the repository root.
    pub parent: Option<ElementId>,
    pub name: String,
    pub payload: Payload,
    pub copy_from: Option<CopyFrom>,
    pub branch_root: bool,
}

impl ElementRecord {
    pub fn new(id: ElementId, parent: ElementId, name: &str, payload: Payload) -> Self {
        ElementRecord {
            id,
            lineage: id,
            parent: Some(parent),
            name: name.to_string(),
            payload,
            copy_from: None,
            branch_root: false,
        }
    }

    pub fn root(id: ElementId) -> Self {
        ElementRecord {
            id,
            lineage: id,
            parent: None,
            name: String::new(),
            payload: Payload::directory(),
            copy_from: None,
            branch_root: true,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.payload.kind()
    }
}
