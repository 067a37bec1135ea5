// File identity abstraction
//
// The caches never own identities. They hold `FileRef` handles, compare them by `FileId`,
// and re-check `is_valid()` on every access.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::content_type::ContentType;

/// Stable identifier of a file identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Virtual coordinate of a fragment embedded in a host file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InjectedCoordinate {
    pub host: FileId,
    pub start: u32,
    pub end: u32,
}

/// Handle to a file or directory in the backing store.
///
/// Implemented by the file-system layer. Every method must be cheap: the caches call
/// `is_valid()` on each read.
pub trait FileIdentity: Send + Sync + fmt::Debug {
    fn id(&self) -> FileId;
    fn is_valid(&self) -> bool;
    fn is_directory(&self) -> bool;
    fn parent(&self) -> Option<FileRef>;
    fn children(&self) -> Vec<FileRef>;
    fn name(&self) -> String;
    fn path(&self) -> String;
    fn content_type(&self) -> ContentType;

    /// Ephemeral buffers that exist only in memory.
    fn is_in_memory(&self) -> bool {
        false
    }

    /// Set when the identity is a fragment injected into another file.
    fn injection(&self) -> Option<InjectedCoordinate> {
        None
    }
}

/// Shared handle to a [`FileIdentity`], hashed and compared by [`FileId`].
#[derive(Clone)]
pub struct FileRef(Arc<dyn FileIdentity>);

impl FileRef {
    pub fn new(identity: Arc<dyn FileIdentity>) -> Self {
        Self(identity)
    }
}

impl std::ops::Deref for FileRef {
    type Target = dyn FileIdentity;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for FileRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for FileRef {}

impl Hash for FileRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.id(), self.0.path())
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.path())
    }
}

/// Depth-first walk over `root` and all its descendants, `root` included.
///
/// `visit` returns `false` to skip the children of the node it was given.
pub fn visit_recursively(root: &FileRef, mut visit: impl FnMut(&FileRef) -> bool) {
    let mut stack = vec![root.clone()];
    while let Some(file) = stack.pop() {
        if !visit(&file) || !file.is_directory() {
            continue;
        }
        // Reverse so that children are visited in their natural order.
        stack.extend(file.children().into_iter().rev());
    }
}
