//! Derived objects held by the caches.
//!
//! A [`View`] is the language-aware interpretation of one file. It owns one lazily built
//! [`ParsedTree`] per supported language. A [`Directory`] is the derived object of a
//! directory identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::vfs::{FileRef, Language};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Concrete kind of a view. Reconciliation compares kinds to decide whether a cached view
/// still matches what a fresh lookup would build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    PlainText,
    Binary,
    /// One language, one tree.
    SingleRoot,
    /// Several languages share the file, e.g. templates.
    MultiRoot,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::PlainText => write!(f, "plain-text"),
            ViewKind::Binary => write!(f, "binary"),
            ViewKind::SingleRoot => write!(f, "single-root"),
            ViewKind::MultiRoot => write!(f, "multi-root"),
        }
    }
}

/// Parsed representation of a file under one language.
#[derive(Debug)]
pub struct ParsedTree {
    file: FileRef,
    language: Language,
    kind: ViewKind,
    /// Derived analysis results; dropped by `clear_caches`.
    derived: Mutex<HashMap<String, Arc<str>>>,
    generation: AtomicU64,
    reloads: AtomicU64,
}

impl ParsedTree {
    fn new(file: FileRef, language: Language, kind: ViewKind) -> Self {
        Self {
            file,
            language,
            kind,
            derived: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
        }
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn is_binary(&self) -> bool {
        self.kind == ViewKind::Binary
    }

    /// Memoized derived value for `key`.
    pub fn derived(&self, key: &str, compute: impl FnOnce() -> String) -> Arc<str> {
        let mut derived = self.derived.lock();
        derived.entry(key.to_string()).or_insert_with(|| Arc::from(compute())).clone()
    }

    pub fn cached_derived(&self, key: &str) -> Option<Arc<str>> {
        self.derived.lock().get(key).cloned()
    }

    /// Drop derived analysis state. The tree itself stays.
    pub fn clear_caches(&self) {
        self.derived.lock().clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of `clear_caches` calls so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Content was reloaded from the backing store.
    pub fn on_content_reload(&self) {
        self.clear_caches();
        self.reloads.fetch_add(1, Ordering::AcqRel);
    }

    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Acquire)
    }
}

/// Language-aware view of one file.
pub struct View {
    id: u64,
    file: FileRef,
    base_language: Language,
    languages: Vec<Language>,
    kind: ViewKind,
    physical: bool,
    trees: RwLock<HashMap<Language, Arc<ParsedTree>>>,
    invalidated: AtomicBool,
}

impl View {
    pub fn new(file: FileRef, base_language: Language, kind: ViewKind, physical: bool) -> Self {
        Self {
            id: NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed),
            file,
            languages: vec![base_language.clone()],
            base_language,
            kind,
            physical,
            trees: RwLock::new(HashMap::new()),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Add auxiliary languages that share this view.
    pub fn with_languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        for language in languages {
            if !self.languages.contains(&language) {
                self.languages.push(language);
            }
        }
        self
    }

    /// Process-unique id, handy in logs and identity assertions.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn base_language(&self) -> &Language {
        &self.base_language
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn is_physical(&self) -> bool {
        self.physical
    }

    /// Tree for `language`, built on first access. `None` for unsupported languages.
    pub fn tree(&self, language: &Language) -> Option<Arc<ParsedTree>> {
        if let Some(tree) = self.cached_tree(language) {
            return Some(tree);
        }
        if !self.languages.contains(language) {
            return None;
        }

        let mut trees = self.trees.write();
        let tree = trees.entry(language.clone()).or_insert_with(|| {
            Arc::new(ParsedTree::new(self.file.clone(), language.clone(), self.kind))
        });
        Some(tree.clone())
    }

    /// Tree for `language` only if it was already built.
    pub fn cached_tree(&self, language: &Language) -> Option<Arc<ParsedTree>> {
        self.trees.read().get(language).cloned()
    }

    pub fn base_tree(&self) -> Option<Arc<ParsedTree>> {
        self.tree(&self.base_language)
    }

    pub fn cached_base_tree(&self) -> Option<Arc<ParsedTree>> {
        self.cached_tree(&self.base_language)
    }

    /// Trees built so far, in no particular order.
    pub fn materialized_trees(&self) -> Vec<Arc<ParsedTree>> {
        self.trees.read().values().cloned().collect()
    }

    /// Some tree of this view is referenced from outside it. Such a view is reachable
    /// through the tree and must not be collected.
    pub fn has_external_trees(&self) -> bool {
        self.trees.read().values().any(|tree| Arc::strong_count(tree) > 1)
    }

    /// Clear derived caches of every tree built so far.
    pub fn clear_caches(&self) {
        for tree in self.materialized_trees() {
            tree.clear_caches();
        }
    }

    /// Called when the view stops being the cache-of-record for its file.
    pub fn mark_invalidated(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("base_language", &self.base_language)
            .field("kind", &self.kind)
            .field("physical", &self.physical)
            .finish()
    }
}

/// Derived object of a directory identity.
#[derive(Debug)]
pub struct Directory {
    file: FileRef,
    created_at: DateTime<Utc>,
}

impl Directory {
    pub fn new(file: FileRef) -> Self {
        Self { file, created_at: Utc::now() }
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{ContentType, MemoryFileSystem};

    fn sample_file() -> FileRef {
        let fs = MemoryFileSystem::new();
        fs.create_in_memory_file("page.tpl", ContentType::plain_text())
    }

    #[test]
    fn test_tree_materializes_lazily() {
        let view = View::new(sample_file(), Language::new("Tpl"), ViewKind::MultiRoot, true)
            .with_languages([Language::new("Html"), Language::new("Tpl")]);

        assert_eq!(view.languages().len(), 2);
        assert!(view.cached_base_tree().is_none());

        let tree = view.base_tree().unwrap();
        assert_eq!(tree.kind(), ViewKind::MultiRoot);
        assert!(Arc::ptr_eq(&tree, &view.cached_base_tree().unwrap()));
        assert!(view.tree(&Language::new("Css")).is_none());
    }

    #[test]
    fn test_clear_caches_drops_derived_state() {
        let view = View::new(sample_file(), Language::new("Tpl"), ViewKind::SingleRoot, true);
        let tree = view.base_tree().unwrap();
        tree.derived("outline", || "a,b".to_string());
        assert!(tree.cached_derived("outline").is_some());

        view.clear_caches();

        assert!(tree.cached_derived("outline").is_none());
        assert_eq!(tree.generation(), 1);
    }

    #[test]
    fn test_derived_is_memoized() {
        let view = View::new(sample_file(), Language::plain_text(), ViewKind::PlainText, true);
        let tree = view.base_tree().unwrap();
        let first = tree.derived("words", || "1".to_string());
        let second = tree.derived("words", || "2".to_string());
        assert_eq!(&*first, "1");
        assert_eq!(&*second, "1");
    }

    #[test]
    fn test_content_reload_counts() {
        let view = View::new(sample_file(), Language::plain_text(), ViewKind::PlainText, false);
        let tree = view.base_tree().unwrap();
        tree.on_content_reload();
        assert_eq!(tree.reload_count(), 1);
        assert_eq!(tree.generation(), 1);
        assert!(!view.is_physical());
    }

    #[test]
    fn test_external_tree_references_tracked() {
        let view = View::new(sample_file(), Language::new("Rust"), ViewKind::SingleRoot, true);
        assert!(!view.has_external_trees());

        let tree = view.base_tree().unwrap();
        assert!(view.has_external_trees());

        drop(tree);
        assert!(!view.has_external_trees());
    }

    #[test]
    fn test_view_ids_are_unique() {
        let file = sample_file();
        let a = View::new(file.clone(), Language::plain_text(), ViewKind::PlainText, true);
        let b = View::new(file, Language::plain_text(), ViewKind::PlainText, true);
        assert_ne!(a.id(), b.id());
        assert!(!a.is_invalidated());
        a.mark_invalidated();
        assert!(a.is_invalidated());
    }
}
