//! Error types for the tree mutation and merge engine.

use crate::merge::Conflict;
use crate::types::Revision;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Revision not found: r{0}")]
    RevisionMissing(Revision),

    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Engine errors surfaced to the commit layer and CLI.
///
/// Input errors (`NotFound`, `AlreadyExists`, `SyntaxError`, `NoSuchRevision`,
/// `NotADirectory`, `InvalidOperation`) are detected before anything is
/// published. `StaleBase` is recoverable by re-reading the head. `Invariant`
/// is fatal and never expected from well-formed input.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("'{path}' not found")]
    NotFound { path: String },

    #[error("'{path}' already exists")]
    AlreadyExists { path: String },

    #[error("Syntax error parsing peg revision '{spec}'")]
    SyntaxError { spec: String },

    #[error("No such revision {revision}")]
    NoSuchRevision { revision: Revision },

    #[error("Transaction base r{base} is out of date (head is r{head})")]
    StaleBase { base: Revision, head: Revision },

    #[error("Merge produced {} conflict(s)", .0.len())]
    Conflict(Vec<Conflict>),

    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },

    #[error("'{path}' is not a branch root")]
    NotABranch { path: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Branches do not share a common root element")]
    UnrelatedBranches,

    #[error("Tree invariant violated: {0}")]
    Invariant(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// String-stable identifier for mapping errors to user-facing text.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NotFound",
            EngineError::AlreadyExists { .. } => "AlreadyExists",
            EngineError::SyntaxError { .. } => "SyntaxError",
            EngineError::NoSuchRevision { .. } => "NoSuchRevision",
            EngineError::StaleBase { .. } => "StaleBase",
            EngineError::Conflict(_) => "Conflict",
            EngineError::NotADirectory { .. } => "NotADirectory",
            EngineError::NotABranch { .. } => "NotABranch",
            EngineError::InvalidOperation(_) => "InvalidOperation",
            EngineError::UnrelatedBranches => "UnrelatedBranches",
            EngineError::Invariant(_) => "Invariant",
            EngineError::Config(_) => "Config",
            EngineError::Storage(_) => "Storage",
        }
    }

    pub(crate) fn not_found(path: impl ToString) -> Self {
        EngineError::NotFound {
            path: path.to_string(),
        }
    }

    pub(crate) fn already_exists(path: impl ToString) -> Self {
        EngineError::AlreadyExists {
            path: path.to_string(),
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
