// Consistency checker
//
// Diagnostic walk that re-derives every cached entry from scratch and compares it with the
// cached one. The live maps are restored afterwards, so the cached instances survive.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use super::FileManager;
use crate::error::{ConsistencyError, ConsistencyResult, report};
use crate::vfs::FileRef;
use crate::view::{Directory, View};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub views_checked: usize,
    pub directories_checked: usize,
}

impl FileManager {
    /// Verify that every cached entry is what a fresh lookup would produce.
    pub fn check_consistency(&self) -> ConsistencyResult<ConsistencyReport> {
        let _write = match self.access.write() {
            Ok(write) => write,
            Err(e) => {
                report(e);
                return Err(ConsistencyError::AccessDenied);
            }
        };

        let views = self.views.snapshot();
        let directories = self.directories.snapshot();

        self.views.clear();
        let result = self.check_views(&views).and_then(|views_checked| {
            self.directories.clear();
            let directories_checked = self.check_directories(&directories)?;
            Ok(ConsistencyReport { views_checked, directories_checked })
        });

        self.views.replace_all(views);
        self.directories.replace_all(directories);

        match &result {
            Ok(checked) => debug!(
                views = checked.views_checked,
                directories = checked.directories_checked,
                "Caches consistent"
            ),
            Err(e) => error!(error = %e, "Cache consistency violation"),
        }
        result
    }

    fn check_views(&self, views: &HashMap<FileRef, Arc<View>>) -> ConsistencyResult<usize> {
        for (file, view) in views {
            if !file.is_valid() {
                return Err(ConsistencyError::InvalidViewFile(file.path()));
            }
            if file.is_directory() || !view.is_physical() {
                continue;
            }

            let fresh = self.views.find(file);
            let Some(tree) = view.base_tree() else {
                return Err(ConsistencyError::MissingTree {
                    file: file.path(),
                    language: view.base_language().to_string(),
                });
            };
            if tree.kind() != fresh.kind() {
                return Err(ConsistencyError::KindMismatch {
                    file: file.path(),
                    cached: tree.kind(),
                    fresh: fresh.kind(),
                });
            }
        }
        Ok(views.len())
    }

    fn check_directories(
        &self,
        directories: &HashMap<FileRef, Arc<Directory>>,
    ) -> ConsistencyResult<usize> {
        for file in directories.keys() {
            if !file.is_valid() {
                return Err(ConsistencyError::InvalidDirectory(file.path()));
            }
            if self.directories.find(file).is_none() {
                return Err(ConsistencyError::DirectoryNotReproduced(file.path()));
            }
            if let Some(parent) = file.parent()
                && parent.is_valid()
                && !self.directories.contains(&parent)
            {
                return Err(ConsistencyError::OrphanDirectory {
                    dir: file.path(),
                    parent: parent.path(),
                });
            }
        }
        Ok(directories.len())
    }
}
