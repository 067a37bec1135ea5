//! Directory identity to [`Directory`] cache.
//!
//! A directory is only installed after its parent has been looked up, so every cached
//! directory whose parent is not filtered out has a cached parent.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use super::MemoryPressure;
use crate::metrics::{CacheMetrics, DIRECTORIES};
use crate::vfs::{FileIndexFacade, FileRef};
use crate::view::Directory;

pub struct DirectoryCache {
    directories: DashMap<FileRef, Arc<Directory>>,
    index: Arc<dyn FileIndexFacade>,
    hide_excluded: bool,
    metrics: CacheMetrics,
}

impl DirectoryCache {
    pub fn new(index: Arc<dyn FileIndexFacade>, hide_excluded: bool, metrics: CacheMetrics) -> Self {
        Self { directories: DashMap::new(), index, hide_excluded, metrics }
    }

    /// Cached directory of `file`, created on a miss.
    ///
    /// `None` for non-directories, invalid identities and directories the index hides.
    pub fn find(&self, file: &FileRef) -> Option<Arc<Directory>> {
        if !file.is_directory() {
            return None;
        }
        if !file.is_valid() {
            self.evict_stale(file);
            return None;
        }
        if let Some(directory) = self.directories.get(file).map(|entry| entry.clone()) {
            self.metrics.record_lookup(DIRECTORIES, "hit");
            return Some(directory);
        }
        if self.is_filtered(file) {
            return None;
        }

        self.metrics.record_lookup(DIRECTORIES, "miss");
        if let Some(parent) = file.parent() {
            self.find(&parent);
        }

        let fresh = Arc::new(Directory::new(file.clone()));
        match self.directories.entry(file.clone()) {
            Entry::Occupied(entry) => {
                self.metrics.record_race_lost(DIRECTORIES);
                trace!(file = %file, "Lost directory install race");
                Some(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh.clone());
                Some(fresh)
            }
        }
    }

    /// Cached directory of `file`, never created.
    pub fn get_cached(&self, file: &FileRef) -> Option<Arc<Directory>> {
        if !file.is_valid() {
            self.evict_stale(file);
            return None;
        }
        self.directories.get(file).map(|entry| entry.clone())
    }

    /// Cached entry without validity checks.
    pub fn get_raw(&self, file: &FileRef) -> Option<Arc<Directory>> {
        self.directories.get(file).map(|entry| entry.clone())
    }

    pub fn remove(&self, file: &FileRef) -> Option<Arc<Directory>> {
        self.directories.remove(file).map(|(_, directory)| directory)
    }

    pub fn contains(&self, file: &FileRef) -> bool {
        self.directories.contains_key(file)
    }

    pub fn snapshot(&self) -> HashMap<FileRef, Arc<Directory>> {
        self.directories.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    pub fn replace_all(&self, entries: HashMap<FileRef, Arc<Directory>>) {
        self.directories.clear();
        for (file, directory) in entries {
            self.directories.insert(file, directory);
        }
        self.metrics.update_entries(DIRECTORIES, self.directories.len());
    }

    pub fn clear(&self) {
        self.directories.clear();
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Drop unreferenced directories. Moderate pressure only trims above `soft_limit`.
    pub fn trim_collectable(&self, pressure: MemoryPressure, soft_limit: usize) -> usize {
        let before = self.directories.len();
        if pressure == MemoryPressure::Moderate && before <= soft_limit {
            return 0;
        }

        self.directories.retain(|_, directory| Arc::strong_count(directory) > 1);
        let trimmed = before.saturating_sub(self.directories.len());
        self.metrics.record_evictions(DIRECTORIES, "collected", trimmed);
        self.metrics.update_entries(DIRECTORIES, self.directories.len());
        trimmed
    }

    fn is_filtered(&self, file: &FileRef) -> bool {
        if self.hide_excluded {
            self.index.is_excluded_file(file)
        } else {
            self.index.is_under_ignored(file)
        }
    }

    fn evict_stale(&self, file: &FileRef) {
        if self.directories.remove(file).is_some() {
            self.metrics.record_evictions(DIRECTORIES, "stale", 1);
            trace!(file = %file, "Evicted directory of invalid file");
        }
        self.metrics.record_lookup(DIRECTORIES, "stale");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{MemoryFileSystem, MockFileIndexFacade, StaticFileIndex};

    fn cache_with(index: Arc<dyn FileIndexFacade>, hide_excluded: bool) -> DirectoryCache {
        DirectoryCache::new(index, hide_excluded, CacheMetrics::unregistered().unwrap())
    }

    fn cache() -> DirectoryCache {
        cache_with(Arc::new(StaticFileIndex::new()), true)
    }

    #[test]
    fn test_find_installs_parents_first() {
        let fs = MemoryFileSystem::new();
        let deep = fs.create_dirs("/a/b/c").unwrap();
        let cache = cache();

        let directory = cache.find(&deep).unwrap();

        assert_eq!(directory.file(), &deep);
        assert_eq!(cache.len(), 4);
        let mut current = deep.parent();
        while let Some(parent) = current {
            assert!(cache.contains(&parent), "missing {}", parent);
            current = parent.parent();
        }
    }

    #[test]
    fn test_find_is_stable() {
        let fs = MemoryFileSystem::new();
        let dir = fs.create_dir(&fs.root(), "src").unwrap();
        let cache = cache();

        let first = cache.find(&dir).unwrap();
        let second = cache.find(&dir).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_files_have_no_directory() {
        let fs = MemoryFileSystem::new();
        let file = fs.create_file(&fs.root(), "a.txt").unwrap();
        assert!(cache().find(&file).is_none());
    }

    #[test]
    fn test_excluded_directories_hidden() {
        let fs = MemoryFileSystem::new();
        let target = fs.create_dirs("/target").unwrap();
        let index = Arc::new(StaticFileIndex::new());
        index.exclude("/target");
        let cache = cache_with(index, true);

        assert!(cache.find(&target).is_none());
        assert!(!cache.contains(&target));
    }

    #[test]
    fn test_ignored_policy_when_not_hiding_excluded() {
        let fs = MemoryFileSystem::new();
        let git = fs.create_dirs("/.git/objects").unwrap();
        let target = fs.create_dirs("/target").unwrap();
        let mut index = MockFileIndexFacade::new();
        index.expect_is_excluded_file().never();
        index.expect_is_under_ignored().returning(|file| file.path().starts_with("/.git"));
        let cache = cache_with(Arc::new(index), false);

        assert!(cache.find(&git).is_none());
        assert!(cache.find(&target).is_some());
    }

    #[test]
    fn test_invalid_directory_evicted() {
        let fs = MemoryFileSystem::new();
        let dir = fs.create_dir(&fs.root(), "gone").unwrap();
        let cache = cache();
        cache.find(&dir);

        fs.delete(&dir).unwrap();

        assert!(cache.get_cached(&dir).is_none());
        assert!(!cache.contains(&dir));
        assert!(cache.find(&dir).is_none());
    }

    #[test]
    fn test_trim_respects_pressure() {
        let fs = MemoryFileSystem::new();
        let cache = cache();
        for name in ["a", "b", "c"] {
            let dir = fs.create_dir(&fs.root(), name).unwrap();
            cache.find(&dir);
        }
        let held = cache.find(&fs.root()).unwrap();
        assert_eq!(cache.len(), 4);

        assert_eq!(cache.trim_collectable(MemoryPressure::Moderate, 10), 0);
        assert_eq!(cache.trim_collectable(MemoryPressure::Moderate, 2), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(held.file()));

        drop(held);
        assert_eq!(cache.trim_collectable(MemoryPressure::Severe, 10), 1);
        assert!(cache.is_empty());
    }
}
