// Document layer hooks
//
// Editable buffers may be bound to the view of their file. The cache tells the document
// layer when that binding has to go, and asks it to reload buffers from disk.

use std::collections::HashSet;

use dashmap::DashMap;
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use tracing::debug;

use crate::vfs::{FileId, FileRef};

#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait DocumentBinding: Send + Sync {
    /// An editable buffer is open for `file`.
    fn has_cached_document(&self, file: &FileRef) -> bool;

    /// Re-read the buffer of `file` from the backing store.
    fn reload_document(&self, file: &FileRef);

    /// Drop any buffer-to-view binding for `file`.
    fn unbind_view(&self, file: &FileRef);
}

/// Document layer that has no documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDocuments;

impl DocumentBinding for NoDocuments {
    fn has_cached_document(&self, _file: &FileRef) -> bool {
        false
    }

    fn reload_document(&self, _file: &FileRef) {}

    fn unbind_view(&self, _file: &FileRef) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DocumentState {
    bound: bool,
    reloads: u64,
}

/// Bookkeeping document layer: tracks open buffers and their bindings.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: DashMap<FileId, DocumentState>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer for `file` and bind it to the file's view.
    pub fn open(&self, file: &FileRef) {
        self.documents.insert(file.id(), DocumentState { bound: true, reloads: 0 });
    }

    pub fn close(&self, file: &FileRef) {
        self.documents.remove(&file.id());
    }

    pub fn is_bound(&self, file: &FileRef) -> bool {
        self.documents.get(&file.id()).map(|state| state.bound).unwrap_or(false)
    }

    pub fn reload_count(&self, file: &FileRef) -> u64 {
        self.documents.get(&file.id()).map(|state| state.reloads).unwrap_or(0)
    }

    pub fn open_files(&self) -> HashSet<FileId> {
        self.documents.iter().map(|entry| *entry.key()).collect()
    }
}

impl DocumentBinding for DocumentRegistry {
    fn has_cached_document(&self, file: &FileRef) -> bool {
        self.documents.contains_key(&file.id())
    }

    fn reload_document(&self, file: &FileRef) {
        if let Some(mut state) = self.documents.get_mut(&file.id()) {
            state.reloads += 1;
            debug!(file = %file, "Document reloaded from disk");
        }
    }

    fn unbind_view(&self, file: &FileRef) {
        if let Some(mut state) = self.documents.get_mut(&file.id()) {
            state.bound = false;
        }
    }
}
