// Reconciliation passes
//
// Whole-cache passes run when the meaning of a file may have changed. Each pass holds the
// pass token and exclusive access for its whole duration and is bracketed by one
// before/after notification pair.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use super::{AnalysisMode, FileManager};
use crate::error::report;
use crate::metrics::{DIRECTORIES, VIEWS};
use crate::notify::ChangePayload;
use crate::vfs::{FileRef, visit_recursively};
use crate::view::{ParsedTree, ViewKind};

const UPDATE_ALL_VIEWS: &str = "update_all_views";
const FILE_TYPES_CHANGED: &str = "file_types_changed";
const SUBTREE_REMOVED: &str = "subtree_removed";

impl FileManager {
    /// Re-evaluate every cached view after a language or analysis-mode change.
    ///
    /// Returns `false` when the pass was dropped because another one was running.
    pub fn update_all_views(&self) -> bool {
        self.run_pass(UPDATE_ALL_VIEWS, ChangePayload::FileTypes, |manager| {
            for view in manager.views.values() {
                if view.file().is_valid() {
                    view.clear_caches();
                }
            }
            manager.sweep_invalid(false);
            manager.check_language_change();
        })
    }

    /// Re-derive every cached entry after the file-type table changed.
    pub fn process_file_types_changed(&self) -> bool {
        self.run_pass(FILE_TYPES_CHANGED, ChangePayload::FileTypes, |manager| {
            manager.sweep_invalid(true);
        })
    }

    /// Evict a deleted or moved subtree, with one notification pair for the whole subtree.
    pub fn process_subtree_removed(&self, root: &FileRef) -> bool {
        let payload = ChangePayload::SubtreeRemoved { root: root.clone() };
        self.run_pass(SUBTREE_REMOVED, payload, |manager| {
            manager.evict_subtree(root);
        })
    }

    /// Drop entries of invalid identities.
    ///
    /// With `use_find` the live maps are cleared first and every entry is re-derived;
    /// views whose fresh kind or base language differs from the cached one are dropped.
    pub fn remove_invalid_files_and_dirs(&self, use_find: bool) {
        match self.access.write() {
            Ok(_write) => self.sweep_invalid(use_find),
            Err(e) => report(e),
        }
    }

    /// Evict `root` and every descendant from both caches. Fires no notifications.
    pub fn remove_files_and_dirs_recursively(&self, root: &FileRef) {
        match self.access.write() {
            Ok(_write) => self.evict_subtree(root),
            Err(e) => report(e),
        }
    }

    /// Drop the cached view of `file` and announce it. No-op when nothing is cached.
    pub fn force_reload(&self, file: &FileRef) -> bool {
        let _write = match self.access.write() {
            Ok(write) => write,
            Err(e) => {
                report(e);
                return false;
            }
        };
        if self.views.find_cached(file).is_none() {
            return false;
        }

        let parent = file.parent().and_then(|dir| self.directories.get_cached(&dir));
        let payload = match parent {
            Some(parent) => ChangePayload::ChildrenChanged { parent },
            None => ChangePayload::UnloadedView { file: file.clone() },
        };

        self.hub.fire_before(payload.clone());
        self.views.set(file, None);
        self.hub.fire_after(payload);
        self.bump_modifications();

        debug!(file = %file, "Forced view reload");
        true
    }

    /// Refresh `tree` from the backing store.
    pub fn reload_from_disk(&self, tree: &Arc<ParsedTree>, ignore_document: bool) {
        let _write = match self.access.write() {
            Ok(write) => write,
            Err(e) => {
                report(e);
                return;
            }
        };
        if tree.is_binary() {
            return;
        }

        let file = tree.file();
        if !ignore_document && self.documents.has_cached_document(file) {
            self.documents.reload_document(file);
            return;
        }

        let latest = self.views.create_view(file, false);
        if latest.kind() == ViewKind::Binary {
            self.force_reload(file);
            return;
        }

        let payload = ChangePayload::ContentReloaded { file: file.clone() };
        self.hub.fire_before(payload.clone());
        tree.on_content_reload();
        self.hub.fire_after(payload);
        debug!(file = %file, "Reloaded from disk");
    }

    pub fn analysis_mode(&self) -> AnalysisMode {
        *self.analysis_mode.lock()
    }

    /// Switch analysis mode. Every transition re-evaluates all views.
    pub fn set_analysis_mode(&self, mode: AnalysisMode) -> bool {
        {
            let mut current = self.analysis_mode.lock();
            if *current == mode {
                return false;
            }
            *current = mode;
        }
        info!(mode = ?mode, "Analysis mode changed");
        self.update_all_views()
    }

    fn run_pass(
        &self,
        pass: &'static str,
        payload: ChangePayload,
        body: impl FnOnce(&Self),
    ) -> bool {
        let Some(_token) = self.pass_token.try_lock() else {
            debug!(pass, "Reconciliation pass already running, dropping");
            self.metrics.record_pass_dropped(pass);
            return false;
        };
        let _write = match self.access.write() {
            Ok(write) => write,
            Err(e) => {
                report(e);
                self.metrics.record_pass_dropped(pass);
                return false;
            }
        };

        let started = Instant::now();
        let views_before = self.views.len();
        let directories_before = self.directories.len();

        self.hub.fire_before(payload.clone());
        body(self);
        self.hub.fire_after(payload);

        self.bump_modifications();
        self.update_entry_gauges();
        self.metrics.record_pass(pass, started.elapsed().as_secs_f64());
        debug!(
            pass,
            views_before,
            views_after = self.views.len(),
            directories_before,
            directories_after = self.directories.len(),
            "Reconciliation pass finished"
        );

        if self.config.cache.check_consistency_after_passes
            && let Err(e) = self.check_consistency()
        {
            error!(pass, error = %e, "Cache inconsistent after reconciliation pass");
        }
        true
    }

    // Directories first: view lookups may consult the directory cache.
    fn sweep_invalid(&self, use_find: bool) {
        let mut directories = self.directories.snapshot();
        let directories_before = directories.len();
        if use_find {
            self.directories.clear();
        }
        directories.retain(|file, _| file.is_valid() && self.directories.find(file).is_some());
        self.metrics.record_evictions(
            DIRECTORIES,
            "invalid",
            directories_before - directories.len(),
        );
        self.directories.replace_all(directories);

        let mut views = self.views.snapshot();
        let views_before = views.len();
        if use_find {
            self.views.clear();
        }
        views.retain(|file, view| {
            if !file.is_valid() {
                return false;
            }
            if !use_find {
                return true;
            }
            if file.is_directory() {
                return false;
            }

            let fresh = self.views.find(file);
            if fresh.kind() != view.kind() || fresh.base_language() != view.base_language() {
                debug!(
                    file = %file,
                    cached_kind = %view.kind(),
                    fresh_kind = %fresh.kind(),
                    cached_language = %view.base_language(),
                    fresh_language = %fresh.base_language(),
                    "Dropping outdated view"
                );
                return false;
            }
            view.clear_caches();
            true
        });
        self.metrics.record_evictions(VIEWS, "invalid", views_before - views.len());
        self.views.replace_all(views);
    }

    // Entries whose file now resolves to another language are dropped. Files that lost
    // their language keep their view.
    fn check_language_change(&self) {
        let mut views = self.views.snapshot();
        let before = views.len();
        self.views.clear();
        views.retain(|file, view| match self.views.resolve_language(file) {
            Some(language) => &language == view.base_language(),
            None => true,
        });
        self.metrics.record_evictions(VIEWS, "language_changed", before - views.len());
        self.views.replace_all(views);
    }

    fn evict_subtree(&self, root: &FileRef) {
        let mut views = 0;
        let mut directories = 0;
        visit_recursively(root, |file| {
            if file.is_directory() {
                directories += usize::from(self.directories.remove(file).is_some());
            } else {
                views += usize::from(self.views.remove(file).is_some());
            }
            true
        });
        self.metrics.record_evictions(VIEWS, "removed", views);
        self.metrics.record_evictions(DIRECTORIES, "removed", directories);
        debug!(root = %root, views, directories, "Evicted subtree");
    }
}
