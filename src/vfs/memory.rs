//! In-memory file system.
//!
//! A small tree of [`MemoryFile`] nodes implementing [`FileIdentity`]. It supports the
//! out-of-band changes the caches must survive: deletion (which invalidates the whole
//! subtree), rename, move, explicit retyping and swapping of the file-type table.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::content_type::{ContentType, FileTypeTable};
use super::error::{VfsError, VfsResult};
use super::identity::{FileId, FileIdentity, FileRef, InjectedCoordinate};
use super::path::{join, path_components, validate_name};

struct Shared {
    nodes: DashMap<FileId, Arc<MemoryFile>>,
    next_id: AtomicU64,
}

impl Shared {
    fn allocate_id(&self) -> FileId {
        FileId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node of a [`MemoryFileSystem`].
#[derive(Debug)]
pub struct MemoryFile {
    id: FileId,
    name: RwLock<String>,
    directory: bool,
    valid: AtomicBool,
    in_memory: bool,
    injection: Option<InjectedCoordinate>,
    explicit_type: RwLock<Option<ContentType>>,
    parent: RwLock<Weak<MemoryFile>>,
    children: RwLock<Vec<Arc<MemoryFile>>>,
    table: Weak<RwLock<Arc<FileTypeTable>>>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").field("nodes", &self.nodes.len()).finish()
    }
}

impl MemoryFile {
    fn to_ref(self: &Arc<Self>) -> FileRef {
        FileRef::new(self.clone() as Arc<dyn FileIdentity>)
    }

    fn invalidate_subtree(&self) {
        self.valid.store(false, Ordering::Release);
        for child in self.children.read().iter() {
            child.invalidate_subtree();
        }
    }

    fn is_ancestor_of(self: &Arc<Self>, other: &Arc<MemoryFile>) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if Arc::ptr_eq(self, &node) {
                return true;
            }
            current = node.parent.read().upgrade();
        }
        false
    }
}

impl FileIdentity for MemoryFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn is_directory(&self) -> bool {
        self.directory
    }

    fn parent(&self) -> Option<FileRef> {
        self.parent.read().upgrade().map(|parent| parent.to_ref())
    }

    fn children(&self) -> Vec<FileRef> {
        self.children.read().iter().map(|child| child.to_ref()).collect()
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn path(&self) -> String {
        let parent = self.parent.read().upgrade();
        match parent {
            Some(parent) => join(&parent.path(), &self.name.read()),
            None if self.in_memory || self.injection.is_some() => self.name.read().clone(),
            None if self.name.read().is_empty() => "/".to_string(),
            None => format!("/{}", self.name.read()),
        }
    }

    fn content_type(&self) -> ContentType {
        if self.directory {
            return ContentType::directory();
        }
        if let Some(explicit) = self.explicit_type.read().as_ref() {
            return explicit.clone();
        }
        match self.table.upgrade() {
            Some(table) => table.read().classify(&self.name.read()),
            None => ContentType::unknown(),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    fn injection(&self) -> Option<InjectedCoordinate> {
        self.injection
    }
}

/// Cheaply cloneable in-memory file system.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    shared: Arc<Shared>,
    table: Arc<RwLock<Arc<FileTypeTable>>>,
    root: Arc<MemoryFile>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::with_file_types(FileTypeTable::new())
    }

    pub fn with_file_types(table: FileTypeTable) -> Self {
        let shared = Arc::new(Shared {
            nodes: DashMap::new(),
            next_id: AtomicU64::new(1),
        });
        let table = Arc::new(RwLock::new(Arc::new(table)));
        let root = Arc::new(MemoryFile {
            id: shared.allocate_id(),
            name: RwLock::new(String::new()),
            directory: true,
            valid: AtomicBool::new(true),
            in_memory: false,
            injection: None,
            explicit_type: RwLock::new(None),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            table: Arc::downgrade(&table),
        });
        shared.nodes.insert(root.id, root.clone());
        Self { shared, table, root }
    }

    pub fn root(&self) -> FileRef {
        self.root.to_ref()
    }

    /// Current file-type table.
    pub fn file_types(&self) -> Arc<FileTypeTable> {
        self.table.read().clone()
    }

    /// Replace the file-type table. Every file without an explicit content type is
    /// reclassified on its next `content_type()` call.
    pub fn set_file_types(&self, table: FileTypeTable) {
        *self.table.write() = Arc::new(table);
        debug!("File type table replaced");
    }

    pub fn create_dir(&self, parent: &FileRef, name: &str) -> VfsResult<FileRef> {
        self.create_child(parent, name, true)
    }

    pub fn create_file(&self, parent: &FileRef, name: &str) -> VfsResult<FileRef> {
        self.create_child(parent, name, false)
    }

    /// Create every missing directory along `path` and return the last one.
    pub fn create_dirs(&self, path: &str) -> VfsResult<FileRef> {
        let mut current = self.root();
        for part in path_components(path)? {
            let existing = self.child_named(&current, &part)?;
            current = match existing {
                Some(child) if child.is_directory() => child,
                Some(child) => return Err(VfsError::NotDirectory(child.path())),
                None => self.create_dir(&current, &part)?,
            };
        }
        Ok(current)
    }

    /// Ephemeral buffer that lives outside the tree.
    pub fn create_in_memory_file(&self, name: &str, content_type: ContentType) -> FileRef {
        let node = self.new_node(name, false, true, None, Some(content_type));
        node.to_ref()
    }

    /// Fragment embedded in `host` between `start` and `end`.
    pub fn create_injected_file(
        &self,
        host: &FileRef,
        start: u32,
        end: u32,
        content_type: ContentType,
    ) -> FileRef {
        let coordinate = InjectedCoordinate { host: host.id(), start, end };
        let name = format!("{}[{}..{}]", host.name(), start, end);
        let node = self.new_node(&name, false, true, Some(coordinate), Some(content_type));
        node.to_ref()
    }

    pub fn find_by_path(&self, path: &str) -> Option<FileRef> {
        let mut current = self.root.clone();
        for part in path_components(path).ok()? {
            let next = current.children.read().iter().find(|c| *c.name.read() == part).cloned()?;
            current = next;
        }
        Some(current.to_ref())
    }

    pub fn resolve(&self, id: FileId) -> Option<FileRef> {
        self.shared.nodes.get(&id).map(|node| node.to_ref())
    }

    /// Delete `file` and its subtree. Every identity in the subtree becomes invalid; the
    /// subtree stays walkable so that caches can still evict it.
    pub fn delete(&self, file: &FileRef) -> VfsResult<()> {
        let node = self.node(file)?;
        if Arc::ptr_eq(&node, &self.root) {
            return Err(VfsError::InvalidPath("Cannot delete the root".to_string()));
        }

        let parent = node.parent.read().upgrade();
        if let Some(parent) = parent {
            parent.children.write().retain(|child| !Arc::ptr_eq(child, &node));
        }
        node.invalidate_subtree();
        self.forget_subtree(&node);

        debug!(file = %file, "Deleted file");
        Ok(())
    }

    /// Drop an in-memory or injected file. Its identity becomes invalid.
    pub fn discard(&self, file: &FileRef) -> VfsResult<()> {
        let node = self.node(file)?;
        if !node.in_memory {
            return Err(VfsError::InvalidPath(format!("{} is part of the tree", file.path())));
        }
        node.valid.store(false, Ordering::Release);
        self.shared.nodes.remove(&node.id);
        debug!(file = %file, "Discarded ephemeral file");
        Ok(())
    }

    /// Mark `file` invalid without touching the tree, as if it disappeared behind the
    /// file system's back.
    pub fn invalidate(&self, file: &FileRef) -> VfsResult<()> {
        let node = self.node(file)?;
        node.invalidate_subtree();
        Ok(())
    }

    pub fn rename(&self, file: &FileRef, new_name: &str) -> VfsResult<()> {
        validate_name(new_name)?;
        let node = self.node(file)?;
        let parent = node.parent.read().upgrade();
        if let Some(parent) = parent {
            let parent_ref = parent.to_ref();
            if self.child_named(&parent_ref, new_name)?.is_some() {
                return Err(VfsError::AlreadyExists(join(&parent.path(), new_name)));
            }
        }
        *node.name.write() = new_name.to_string();
        debug!(file = %file, "Renamed file");
        Ok(())
    }

    pub fn move_to(&self, file: &FileRef, new_parent: &FileRef) -> VfsResult<()> {
        let node = self.node(file)?;
        let target = self.node(new_parent)?;
        if !target.directory {
            return Err(VfsError::NotDirectory(new_parent.path()));
        }
        if node.is_ancestor_of(&target) {
            return Err(VfsError::CyclicMove(file.path()));
        }
        let name = node.name.read().clone();
        if self.child_named(new_parent, &name)?.is_some() {
            return Err(VfsError::AlreadyExists(join(&target.path(), &name)));
        }

        let old_parent = node.parent.read().upgrade();
        if let Some(old_parent) = old_parent {
            old_parent.children.write().retain(|child| !Arc::ptr_eq(child, &node));
        }
        target.children.write().push(node.clone());
        *node.parent.write() = Arc::downgrade(&target);
        debug!(file = %file, "Moved file");
        Ok(())
    }

    /// Pin a content type on `file`, or go back to table classification with `None`.
    pub fn set_content_type(
        &self,
        file: &FileRef,
        content_type: Option<ContentType>,
    ) -> VfsResult<()> {
        let node = self.node(file)?;
        *node.explicit_type.write() = content_type;
        Ok(())
    }

    fn node(&self, file: &FileRef) -> VfsResult<Arc<MemoryFile>> {
        let node = self
            .shared
            .nodes
            .get(&file.id())
            .map(|node| node.clone())
            .ok_or_else(|| VfsError::PathNotFound(file.path()))?;
        if !node.is_valid() {
            return Err(VfsError::InvalidFile(file.path()));
        }
        Ok(node)
    }

    fn child_named(&self, parent: &FileRef, name: &str) -> VfsResult<Option<FileRef>> {
        let node = self.node(parent)?;
        let children = node.children.read();
        Ok(children.iter().find(|child| *child.name.read() == name).map(|child| child.to_ref()))
    }

    fn create_child(&self, parent: &FileRef, name: &str, directory: bool) -> VfsResult<FileRef> {
        validate_name(name)?;
        let parent_node = self.node(parent)?;
        if !parent_node.directory {
            return Err(VfsError::NotDirectory(parent.path()));
        }
        if self.child_named(parent, name)?.is_some() {
            return Err(VfsError::AlreadyExists(join(&parent.path(), name)));
        }

        let node = self.new_node(name, directory, false, None, None);
        *node.parent.write() = Arc::downgrade(&parent_node);
        parent_node.children.write().push(node.clone());
        Ok(node.to_ref())
    }

    fn new_node(
        &self,
        name: &str,
        directory: bool,
        in_memory: bool,
        injection: Option<InjectedCoordinate>,
        explicit_type: Option<ContentType>,
    ) -> Arc<MemoryFile> {
        let node = Arc::new(MemoryFile {
            id: self.shared.allocate_id(),
            name: RwLock::new(name.to_string()),
            directory,
            valid: AtomicBool::new(true),
            in_memory,
            injection,
            explicit_type: RwLock::new(explicit_type),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            table: Arc::downgrade(&self.table),
        });
        self.shared.nodes.insert(node.id, node.clone());
        node
    }

    fn forget_subtree(&self, node: &Arc<MemoryFile>) {
        self.shared.nodes.remove(&node.id);
        for child in node.children.read().iter() {
            self.forget_subtree(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Language;

    fn table() -> FileTypeTable {
        FileTypeTable::new()
            .with_extension("rs", ContentType::language("RUST", Language::new("Rust")))
            .with_extension("txt", ContentType::plain_text())
    }

    #[test]
    fn test_create_and_find() {
        let fs = MemoryFileSystem::with_file_types(table());
        let src = fs.create_dir(&fs.root(), "src").unwrap();
        let main = fs.create_file(&src, "main.rs").unwrap();

        assert_eq!(main.path(), "/src/main.rs");
        assert_eq!(fs.find_by_path("/src/main.rs"), Some(main.clone()));
        assert_eq!(main.parent(), Some(src));
        assert_eq!(main.content_type().language, Some(Language::new("Rust")));
        assert_eq!(fs.root().path(), "/");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let fs = MemoryFileSystem::new();
        fs.create_file(&fs.root(), "a.txt").unwrap();
        assert!(matches!(fs.create_file(&fs.root(), "a.txt"), Err(VfsError::AlreadyExists(_))));
    }

    #[test]
    fn test_create_under_file_rejected() {
        let fs = MemoryFileSystem::new();
        let file = fs.create_file(&fs.root(), "a.txt").unwrap();
        assert!(matches!(fs.create_file(&file, "b.txt"), Err(VfsError::NotDirectory(_))));
    }

    #[test]
    fn test_create_dirs() {
        let fs = MemoryFileSystem::new();
        let deep = fs.create_dirs("/a/b/c").unwrap();
        assert_eq!(deep.path(), "/a/b/c");
        let again = fs.create_dirs("/a/b/c").unwrap();
        assert_eq!(deep, again);
    }

    #[test]
    fn test_delete_invalidates_subtree() {
        let fs = MemoryFileSystem::new();
        let dir = fs.create_dir(&fs.root(), "dir").unwrap();
        let file = fs.create_file(&dir, "a.txt").unwrap();

        fs.delete(&dir).unwrap();

        assert!(!dir.is_valid());
        assert!(!file.is_valid());
        assert!(fs.find_by_path("/dir").is_none());
        assert_eq!(dir.children(), vec![file.clone()]);
        assert!(fs.resolve(file.id()).is_none());
    }

    #[test]
    fn test_rename_retypes() {
        let fs = MemoryFileSystem::with_file_types(table());
        let file = fs.create_file(&fs.root(), "notes.txt").unwrap();
        assert_eq!(file.content_type(), ContentType::plain_text());

        fs.rename(&file, "notes.rs").unwrap();

        assert!(file.is_valid());
        assert_eq!(file.content_type().language, Some(Language::new("Rust")));
    }

    #[test]
    fn test_set_file_types_reclassifies() {
        let fs = MemoryFileSystem::new();
        let file = fs.create_file(&fs.root(), "a.rs").unwrap();
        assert_eq!(file.content_type(), ContentType::unknown());

        fs.set_file_types(table());

        assert_eq!(file.content_type().name, "RUST");
    }

    #[test]
    fn test_move_rejects_cycles() {
        let fs = MemoryFileSystem::new();
        let a = fs.create_dir(&fs.root(), "a").unwrap();
        let b = fs.create_dir(&a, "b").unwrap();

        assert!(matches!(fs.move_to(&a, &b), Err(VfsError::CyclicMove(_))));

        let c = fs.create_dir(&fs.root(), "c").unwrap();
        fs.move_to(&b, &c).unwrap();
        assert_eq!(b.path(), "/c/b");
    }

    #[test]
    fn test_in_memory_and_injected_files() {
        let fs = MemoryFileSystem::new();
        let host = fs.create_file(&fs.root(), "page.html").unwrap();
        let scratch = fs.create_in_memory_file("scratch.txt", ContentType::plain_text());
        let fragment = fs.create_injected_file(&host, 10, 20, ContentType::plain_text());

        assert!(scratch.is_in_memory());
        assert!(scratch.parent().is_none());
        assert_eq!(scratch.path(), "scratch.txt");
        let coordinate = fragment.injection().unwrap();
        assert_eq!(coordinate.host, host.id());
        assert_eq!((coordinate.start, coordinate.end), (10, 20));
    }

    #[test]
    fn test_discard_forgets_ephemeral_files() {
        let fs = MemoryFileSystem::new();
        let host = fs.create_file(&fs.root(), "page.html").unwrap();
        let scratch = fs.create_in_memory_file("scratch.txt", ContentType::plain_text());
        let fragment = fs.create_injected_file(&host, 0, 4, ContentType::plain_text());

        fs.discard(&scratch).unwrap();
        fs.discard(&fragment).unwrap();

        assert!(!scratch.is_valid());
        assert!(fs.resolve(scratch.id()).is_none());
        assert!(fs.resolve(fragment.id()).is_none());
        assert!(matches!(fs.discard(&scratch), Err(VfsError::PathNotFound(_))));
        assert!(matches!(fs.discard(&host), Err(VfsError::InvalidPath(_))));
        assert!(host.is_valid());
    }
}
