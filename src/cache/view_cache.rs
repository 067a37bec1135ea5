//! File identity to view cache.
//!
//! The primary map is a `DashMap`; concurrent misses on the same identity each build a
//! view, and the first one to install wins. In-memory identities installed through
//! [`ViewCache::set`] live in a separate pinned map that is never trimmed.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::metrics::{CacheMetrics, VIEWS};
use crate::vfs::{FileRef, Language};
use crate::view::{DocumentBinding, InjectedViewLookup, ParsedTree, View, ViewKind, ViewResolver};

pub struct ViewCache {
    views: DashMap<FileRef, Arc<View>>,
    pinned: DashMap<FileRef, Arc<View>>,
    resolver: ViewResolver,
    injections: Arc<dyn InjectedViewLookup>,
    documents: Arc<dyn DocumentBinding>,
    metrics: CacheMetrics,
}

impl ViewCache {
    pub fn new(
        resolver: ViewResolver,
        injections: Arc<dyn InjectedViewLookup>,
        documents: Arc<dyn DocumentBinding>,
        metrics: CacheMetrics,
    ) -> Self {
        Self {
            views: DashMap::new(),
            pinned: DashMap::new(),
            resolver,
            injections,
            documents,
            metrics,
        }
    }

    pub fn resolver(&self) -> &ViewResolver {
        &self.resolver
    }

    /// Cached view of `file`, or a freshly built one installed with compare-and-swap.
    pub fn find(&self, file: &FileRef) -> Arc<View> {
        if let Some(view) = self.find_cached(file) {
            return view;
        }

        self.metrics.record_lookup(VIEWS, "miss");
        let fresh = self.create_view(file, true);
        match self.views.entry(file.clone()) {
            Entry::Occupied(entry) => {
                self.metrics.record_race_lost(VIEWS);
                trace!(file = %file, discarded = fresh.id(), "Lost view install race");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh.clone());
                fresh
            }
        }
    }

    /// Injected override, then primary map, then pinned slot. Never builds anything.
    ///
    /// Entries of invalid identities are evicted and reported as absent.
    pub fn find_cached(&self, file: &FileRef) -> Option<Arc<View>> {
        if !file.is_valid() {
            self.evict_stale(file);
            return None;
        }

        let view = self.lookup(file);
        if view.is_some() {
            self.metrics.record_lookup(VIEWS, "hit");
        }
        view
    }

    /// Replace or remove the cache-of-record for `file`.
    pub fn set(&self, file: &FileRef, view: Option<Arc<View>>) {
        if let Some(previous) = self.lookup(file) {
            let same = view.as_ref().is_some_and(|view| Arc::ptr_eq(view, &previous));
            if !same {
                previous.mark_invalidated();
            }
        }

        if file.injection().is_some() {
            return;
        }

        match view {
            None => {
                self.views.remove(file);
                self.pinned.remove(file);
                self.documents.unbind_view(file);
            }
            Some(view) if file.is_in_memory() => {
                self.pinned.insert(file.clone(), view);
            }
            Some(view) => {
                self.views.insert(file.clone(), view);
            }
        }
    }

    pub fn create_view(&self, file: &FileRef, event_system_enabled: bool) -> Arc<View> {
        Arc::new(self.resolver.create_view(file, event_system_enabled))
    }

    pub fn resolve_language(&self, file: &FileRef) -> Option<Language> {
        self.resolver.resolve_language(file)
    }

    /// Primary-map entry without validity checks.
    pub fn get_primary(&self, file: &FileRef) -> Option<Arc<View>> {
        self.views.get(file).map(|view| view.clone())
    }

    /// Primary-map entry, then pinned slot, without validity checks.
    pub fn get_raw(&self, file: &FileRef) -> Option<Arc<View>> {
        self.get_primary(file).or_else(|| self.pinned.get(file).map(|view| view.clone()))
    }

    pub fn remove(&self, file: &FileRef) -> Option<Arc<View>> {
        self.views.remove(file).map(|(_, view)| view)
    }

    pub fn contains_primary(&self, file: &FileRef) -> bool {
        self.views.contains_key(file)
    }

    pub fn is_pinned(&self, file: &FileRef) -> bool {
        self.pinned.contains_key(file)
    }

    /// Copy of the primary map.
    pub fn snapshot(&self) -> HashMap<FileRef, Arc<View>> {
        self.views.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    pub fn values(&self) -> Vec<Arc<View>> {
        self.views.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Replace the primary map with `entries`.
    pub fn replace_all(&self, entries: HashMap<FileRef, Arc<View>>) {
        self.views.clear();
        for (file, view) in entries {
            self.views.insert(file, view);
        }
        self.metrics.update_entries(VIEWS, self.views.len());
    }

    /// Clear the primary map. Pinned views stay.
    pub fn clear(&self) {
        self.views.clear();
    }

    pub fn clear_pinned(&self) {
        self.pinned.clear();
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn pinned_len(&self) -> usize {
        self.pinned.len()
    }

    /// Drop every primary entry nothing outside the cache still references, either
    /// directly or through one of its trees.
    pub fn trim_collectable(&self) -> usize {
        let before = self.views.len();
        self.views.retain(|_, view| Arc::strong_count(view) > 1 || view.has_external_trees());
        let trimmed = before.saturating_sub(self.views.len());
        self.metrics.record_evictions(VIEWS, "collected", trimmed);
        self.metrics.update_entries(VIEWS, self.views.len());
        trimmed
    }

    /// Base-language trees already built for single-root views.
    pub fn all_cached_trees(&self) -> Vec<Arc<ParsedTree>> {
        self.views
            .iter()
            .filter(|entry| entry.value().kind() == ViewKind::SingleRoot)
            .filter_map(|entry| entry.value().cached_base_tree())
            .collect()
    }

    fn lookup(&self, file: &FileRef) -> Option<Arc<View>> {
        if let Some(coordinate) = file.injection() {
            return self.injections.cached_view(&coordinate);
        }
        self.get_raw(file)
    }

    fn evict_stale(&self, file: &FileRef) {
        let evicted = self.views.remove(file).is_some() | self.pinned.remove(file).is_some();
        if evicted {
            self.metrics.record_evictions(VIEWS, "stale", 1);
            trace!(file = %file, "Evicted view of invalid file");
        }
        self.metrics.record_lookup(VIEWS, "stale");
    }
}
