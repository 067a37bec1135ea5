// Project file index
//
// Decides which directories are hidden from the directory cache. Two policies exist:
// "excluded" roots configured by the user and "ignored" names such as VCS metadata.

use std::collections::HashSet;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use parking_lot::RwLock;

use super::identity::FileRef;

#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FileIndexFacade: Send + Sync {
    /// `file` is an excluded root or lies below one.
    fn is_excluded_file(&self, file: &FileRef) -> bool;

    /// `file` or one of its ancestors has an ignored name.
    fn is_under_ignored(&self, file: &FileRef) -> bool;
}

/// Index backed by a set of excluded path prefixes and ignored names.
#[derive(Debug, Default)]
pub struct StaticFileIndex {
    excluded_roots: RwLock<HashSet<String>>,
    ignored_names: RwLock<HashSet<String>>,
}

impl StaticFileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(&self, path: impl Into<String>) {
        self.excluded_roots.write().insert(path.into());
    }

    pub fn include(&self, path: &str) {
        self.excluded_roots.write().remove(path);
    }

    pub fn ignore_name(&self, name: impl Into<String>) {
        self.ignored_names.write().insert(name.into());
    }
}

impl FileIndexFacade for StaticFileIndex {
    fn is_excluded_file(&self, file: &FileRef) -> bool {
        let roots = self.excluded_roots.read();
        if roots.is_empty() {
            return false;
        }
        let path = file.path();
        roots.iter().any(|root| {
            path == *root || (path.starts_with(root.as_str()) && path[root.len()..].starts_with('/'))
        })
    }

    fn is_under_ignored(&self, file: &FileRef) -> bool {
        let names = self.ignored_names.read();
        if names.is_empty() {
            return false;
        }
        let mut current = Some(file.clone());
        while let Some(node) = current {
            if names.contains(&node.name()) {
                return true;
            }
            current = node.parent();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFileSystem;

    #[test]
    fn test_excluded_prefix_matching() {
        let fs = MemoryFileSystem::new();
        let target = fs.create_dirs("/target/debug").unwrap();
        let targets = fs.create_dirs("/targets").unwrap();
        let index = StaticFileIndex::new();
        index.exclude("/target");

        assert!(index.is_excluded_file(&target));
        assert!(index.is_excluded_file(&fs.find_by_path("/target").unwrap()));
        assert!(!index.is_excluded_file(&targets));

        index.include("/target");
        assert!(!index.is_excluded_file(&target));
    }

    #[test]
    fn test_ignored_names_apply_to_descendants() {
        let fs = MemoryFileSystem::new();
        let objects = fs.create_dirs("/.git/objects").unwrap();
        let src = fs.create_dirs("/src").unwrap();
        let index = StaticFileIndex::new();
        index.ignore_name(".git");

        assert!(index.is_under_ignored(&objects));
        assert!(!index.is_under_ignored(&src));
    }
}
