//! The file manager service.
//!
//! [`FileManager`] owns the view and directory caches and is the only entry point for
//! lookups and structural changes. Reads run under shared access; reconciliation passes,
//! forced reloads and trimming run under exclusive access.

mod access;
mod consistency;
mod reconcile;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use prometheus::Registry;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{DirectoryCache, MemoryPressure, ViewCache};
use crate::config::Config;
use crate::error::{CacheError, report};
use crate::metrics::{CacheMetrics, DIRECTORIES, VIEWS};
use crate::notify::{NotificationHub, StructureListener, SubscriptionId};
use crate::vfs::{FileIndexFacade, FileRef, StaticFileIndex};
use crate::view::{
    Directory, DocumentBinding, FactoryRegistry, InjectedViewLookup, InjectionRegistry,
    NoDocuments, ParsedTree, ProjectContext, SubstitutorRegistry, View, ViewKind, ViewResolver,
};

pub use access::{AccessArbiter, ReadAccess, WriteAccess};
pub use consistency::ConsistencyReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Created,
    Initialized,
    Disposed,
}

/// Analysis mode of the host. Switching modes re-evaluates every cached view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AnalysisMode {
    #[default]
    Full,
    /// Indexes are being rebuilt; some languages resolve differently meanwhile.
    Reduced,
}

/// File-system events queued for the next lookup.
#[derive(Debug, Clone)]
pub enum PendingEvent {
    FileTypesChanged,
    LanguagesChanged,
    ModeChanged(AnalysisMode),
    SubtreeRemoved(FileRef),
    Reload(FileRef),
}

/// External services the manager consults.
#[derive(Clone)]
pub struct Collaborators {
    pub factories: Arc<FactoryRegistry>,
    pub substitutors: Arc<SubstitutorRegistry>,
    pub project: Arc<ProjectContext>,
    pub index: Arc<dyn FileIndexFacade>,
    pub injections: Arc<dyn InjectedViewLookup>,
    pub documents: Arc<dyn DocumentBinding>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            factories: Arc::new(FactoryRegistry::new()),
            substitutors: Arc::new(SubstitutorRegistry::new()),
            project: Arc::new(ProjectContext::new("default")),
            index: Arc::new(StaticFileIndex::new()),
            injections: Arc::new(InjectionRegistry::new()),
            documents: Arc::new(NoDocuments),
        }
    }
}

/// Entries dropped by [`FileManager::trim_collectable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    pub views: usize,
    pub directories: usize,
}

pub struct FileManager {
    config: Config,
    views: ViewCache,
    directories: DirectoryCache,
    hub: NotificationHub,
    access: AccessArbiter,
    pass_token: Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
    pending: Mutex<VecDeque<PendingEvent>>,
    documents: Arc<dyn DocumentBinding>,
    analysis_mode: Mutex<AnalysisMode>,
    modifications: AtomicU64,
    metrics: CacheMetrics,
    registry: Arc<Registry>,
}

impl FileManager {
    pub fn new(config: Config, collaborators: Collaborators) -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = CacheMetrics::new(registry.clone())?;

        let resolver = ViewResolver::new(
            collaborators.factories,
            collaborators.substitutors,
            collaborators.project,
        );
        let views = ViewCache::new(
            resolver,
            collaborators.injections,
            collaborators.documents.clone(),
            metrics.clone(),
        );
        let directories = DirectoryCache::new(
            collaborators.index,
            config.index.hide_excluded_files,
            metrics.clone(),
        );

        debug!(
            hide_excluded_files = config.index.hide_excluded_files,
            directory_soft_limit = config.cache.directory_soft_limit,
            "File manager created"
        );

        Ok(Self {
            config,
            views,
            directories,
            hub: NotificationHub::new(),
            access: AccessArbiter::new(),
            pass_token: Mutex::new(()),
            lifecycle: Mutex::new(Lifecycle::Created),
            pending: Mutex::new(VecDeque::new()),
            documents: collaborators.documents,
            analysis_mode: Mutex::new(AnalysisMode::default()),
            modifications: AtomicU64::new(0),
            metrics,
            registry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &ViewResolver {
        self.views.resolver()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn access(&self) -> &AccessArbiter {
        &self.access
    }

    pub fn view_cache(&self) -> &ViewCache {
        &self.views
    }

    pub fn directory_cache(&self) -> &DirectoryCache {
        &self.directories
    }

    pub fn subscribe(&self, listener: Arc<dyn StructureListener>) -> SubscriptionId {
        self.hub.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    // Lifecycle

    pub fn mark_initialized(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Initialized {
            report(CacheError::LifecycleMisuse("already initialized".to_string()));
        }
        *lifecycle = Lifecycle::Initialized;
        info!("File manager initialized");
    }

    pub fn dispose(&self) {
        let _write = match self.access.write() {
            Ok(write) => Some(write),
            Err(e) => {
                report(e);
                None
            }
        };
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Initialized {
            self.hub.clear();
        }
        *lifecycle = Lifecycle::Disposed;
        info!("File manager disposed");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle() == Lifecycle::Initialized
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle() == Lifecycle::Disposed
    }

    fn check_not_disposed(&self, operation: &str) {
        if self.is_disposed() {
            report(CacheError::LifecycleMisuse(format!("{} after disposal", operation)));
        }
    }

    // Lookups

    /// Base-language tree of `file`, building its view on a miss.
    pub fn find_file(&self, file: &FileRef) -> Option<Arc<ParsedTree>> {
        if file.is_directory() {
            return None;
        }
        if !file.is_valid() {
            report(CacheError::stale(file));
            return None;
        }

        self.dispatch_pending_events();
        let _read = self.access.read();
        self.views.find(file).base_tree()
    }

    pub fn find_view(&self, file: &FileRef) -> Option<Arc<View>> {
        if file.is_directory() {
            report(CacheError::AccessViolation(format!("view requested for directory {}", file)));
            return None;
        }
        if !file.is_valid() {
            report(CacheError::stale(file));
            return None;
        }

        self.dispatch_pending_events();
        let _read = self.access.read();
        Some(self.views.find(file))
    }

    /// Cached view of `file`. Never builds anything.
    pub fn find_cached_view(&self, file: &FileRef) -> Option<Arc<View>> {
        let _read = self.access.read();
        self.views.find_cached(file)
    }

    pub fn set_view(&self, file: &FileRef, view: Option<Arc<View>>) {
        let _read = self.access.read();
        self.views.set(file, view);
    }

    pub fn create_view(&self, file: &FileRef, event_system_enabled: bool) -> Arc<View> {
        self.views.create_view(file, event_system_enabled)
    }

    pub fn find_directory(&self, file: &FileRef) -> Option<Arc<Directory>> {
        match self.lifecycle() {
            Lifecycle::Created => report(CacheError::LifecycleMisuse(
                "directory lookup before initialization".to_string(),
            )),
            Lifecycle::Disposed => report(CacheError::LifecycleMisuse(
                "directory lookup after disposal".to_string(),
            )),
            Lifecycle::Initialized => {}
        }
        if !file.is_valid() {
            report(CacheError::stale(file));
        }
        if !file.is_directory() {
            return None;
        }

        self.dispatch_pending_events();
        let _read = self.access.read();
        self.directories.find(file)
    }

    pub fn get_cached_directory(&self, file: &FileRef) -> Option<Arc<Directory>> {
        let _read = self.access.read();
        self.directories.get_cached(file)
    }

    /// Already-built base tree of a single-root view. `None` before initialization.
    pub fn get_cached_tree(&self, file: &FileRef) -> Option<Arc<ParsedTree>> {
        if !file.is_valid() {
            report(CacheError::stale(file));
            return None;
        }
        self.check_not_disposed("cached tree lookup");
        if !self.is_initialized() {
            return None;
        }

        self.dispatch_pending_events();
        let _read = self.access.read();
        self.views
            .get_raw(file)
            .filter(|view| view.kind() == ViewKind::SingleRoot)
            .and_then(|view| view.cached_base_tree())
    }

    pub fn all_cached_trees(&self) -> Vec<Arc<ParsedTree>> {
        let _read = self.access.read();
        self.views.all_cached_trees()
    }

    // Pending events

    pub fn post_event(&self, event: PendingEvent) {
        debug!(event = ?event, "Queued file system event");
        self.pending.lock().push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.pending.lock().len()
    }

    /// Process queued events. Skipped while the current thread holds any access, since
    /// passes need exclusive access and the queue is drained again by the next lookup.
    pub fn dispatch_pending_events(&self) {
        match self.lifecycle() {
            Lifecycle::Created => {
                report(CacheError::LifecycleMisuse("lookup before initialization".to_string()))
            }
            Lifecycle::Disposed => {
                report(CacheError::LifecycleMisuse("lookup after disposal".to_string()))
            }
            Lifecycle::Initialized => {}
        }
        if self.access.is_read_allowed() {
            return;
        }

        loop {
            let Some(event) = self.pending.lock().pop_front() else {
                break;
            };
            if let Some(retry) = self.handle_pending_event(event) {
                // Another thread owns the pass token. Keep the trigger for the next lookup.
                debug!(event = ?retry, "Pass busy, requeueing event");
                self.pending.lock().push_front(retry);
                break;
            }
        }
    }

    /// Run the pass behind `event`. Returns the event to retry when the pass was dropped.
    /// This thread holds no access here, so a dropped pass means a concurrent one.
    fn handle_pending_event(&self, event: PendingEvent) -> Option<PendingEvent> {
        match event {
            PendingEvent::FileTypesChanged => {
                (!self.process_file_types_changed()).then_some(PendingEvent::FileTypesChanged)
            }
            PendingEvent::LanguagesChanged => {
                (!self.update_all_views()).then_some(PendingEvent::LanguagesChanged)
            }
            // The mode sticks even when its pass is dropped; only the views need a retry.
            PendingEvent::ModeChanged(mode) => {
                let dropped = self.analysis_mode() != mode && !self.set_analysis_mode(mode);
                dropped.then_some(PendingEvent::LanguagesChanged)
            }
            PendingEvent::SubtreeRemoved(root) => {
                (!self.process_subtree_removed(&root)).then_some(PendingEvent::SubtreeRemoved(root))
            }
            PendingEvent::Reload(file) => {
                self.force_reload(&file);
                None
            }
        }
    }

    // Memory pressure

    pub fn trim_collectable(&self, pressure: MemoryPressure) -> TrimReport {
        let _write = match self.access.write() {
            Ok(write) => write,
            Err(e) => {
                report(e);
                return TrimReport::default();
            }
        };

        let trimmed = TrimReport {
            views: self.views.trim_collectable(),
            directories: self
                .directories
                .trim_collectable(pressure, self.config.cache.directory_soft_limit),
        };
        debug!(
            pressure = ?pressure,
            views = trimmed.views,
            directories = trimmed.directories,
            "Trimmed caches"
        );
        trimmed
    }

    pub fn on_low_memory(&self) -> TrimReport {
        self.trim_collectable(MemoryPressure::Severe)
    }

    // Test support

    /// Drop every cached entry, pinned views included.
    pub fn cleanup_for_next_test(&self) {
        self.views.clear();
        self.views.clear_pinned();
        self.directories.clear();
        self.pending.lock().clear();
        self.bump_modifications();
    }

    pub fn modification_count(&self) -> u64 {
        self.modifications.load(Ordering::Acquire)
    }

    fn bump_modifications(&self) {
        self.modifications.fetch_add(1, Ordering::AcqRel);
    }

    fn update_entry_gauges(&self) {
        self.metrics.update_entries(VIEWS, self.views.len());
        self.metrics.update_entries(DIRECTORIES, self.directories.len());
    }
}
