//! File identity layer.
//!
//! The caches only ever see [`FileRef`] handles. This module defines the identity contract
//! and ships an in-memory implementation together with a simple project index.

pub mod content_type;
pub mod error;
pub mod identity;
pub mod index;
pub mod memory;
pub mod path;

pub use content_type::{ContentType, FileTypeTable, Language};
pub use error::{VfsError, VfsResult};
pub use identity::{FileId, FileIdentity, FileRef, InjectedCoordinate, visit_recursively};
#[cfg(any(test, feature = "mockall"))]
pub use index::MockFileIndexFacade;
pub use index::{FileIndexFacade, StaticFileIndex};
pub use memory::{MemoryFile, MemoryFileSystem};
