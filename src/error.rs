//! Error types.
//!
//! Read paths never fail: precondition violations are reported through [`report`] and the
//! call degrades to an absent result. Only the consistency checker returns hard errors.

use thiserror::Error;

use crate::vfs::FileRef;
use crate::view::ViewKind;

/// Internal-consistency problems reported as diagnostics.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid file: {0}")]
    StaleIdentity(String),

    #[error("Lifecycle misuse: {0}")]
    LifecycleMisuse(String),

    #[error("Access violation: {0}")]
    AccessViolation(String),
}

impl CacheError {
    pub fn stale(file: &FileRef) -> Self {
        CacheError::StaleIdentity(file.path())
    }

    fn kind(&self) -> &'static str {
        match self {
            CacheError::StaleIdentity(_) => "stale_identity",
            CacheError::LifecycleMisuse(_) => "lifecycle_misuse",
            CacheError::AccessViolation(_) => "access_violation",
        }
    }
}

/// Log an internal error without interrupting the caller.
pub fn report(error: CacheError) {
    tracing::error!(kind = error.kind(), "{}", error);
}

/// Violations found by the consistency checker.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Cached view for invalid file: {0}")]
    InvalidViewFile(String),

    #[error("Physical view of {file} has no {language} tree")]
    MissingTree { file: String, language: String },

    #[error("View kind mismatch for {file}: cached {cached}, fresh {fresh}")]
    KindMismatch { file: String, cached: ViewKind, fresh: ViewKind },

    #[error("Cached directory for invalid file: {0}")]
    InvalidDirectory(String),

    #[error("Directory lookup no longer produces {0}")]
    DirectoryNotReproduced(String),

    #[error("Directory {dir} is cached without its parent {parent}")]
    OrphanDirectory { dir: String, parent: String },

    #[error("Consistency check needs exclusive access")]
    AccessDenied,
}

pub type ConsistencyResult<T> = Result<T, ConsistencyError>;
