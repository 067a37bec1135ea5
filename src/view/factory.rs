//! View construction.
//!
//! [`ViewResolver`] turns a file identity into a [`View`]: it resolves the file's language
//! (applying substitution rules on every call), then asks the language factory, then the
//! content-type factory, and finally falls back to a generic single-root view. Declining is
//! never an error.

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::model::{View, ViewKind};
use crate::vfs::{ContentType, FileRef, Language};

/// Builds specialized views. Returning `None` declines.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ViewFactory: Send + Sync {
    fn create_view(
        &self,
        file: &FileRef,
        language: Option<Language>,
        event_system_enabled: bool,
    ) -> Option<View>;
}

/// Rewrites the language of a file, possibly based on project configuration.
pub trait LanguageSubstitutor: Send + Sync {
    fn substitute(
        &self,
        language: &Language,
        file: &FileRef,
        project: &ProjectContext,
    ) -> Option<Language>;
}

impl<F> LanguageSubstitutor for F
where
    F: Fn(&Language, &FileRef, &ProjectContext) -> Option<Language> + Send + Sync,
{
    fn substitute(
        &self,
        language: &Language,
        file: &FileRef,
        project: &ProjectContext,
    ) -> Option<Language> {
        self(language, file, project)
    }
}

/// Mutable project configuration visible to substitution rules.
#[derive(Debug, Default)]
pub struct ProjectContext {
    name: String,
    settings: RwLock<HashMap<String, String>>,
}

impl ProjectContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), settings: RwLock::new(HashMap::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.read().get(key).cloned()
    }

    pub fn set_setting(&self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.write().insert(key.into(), value.into());
    }

    pub fn remove_setting(&self, key: &str) {
        self.settings.write().remove(key);
    }
}

/// Factories keyed by language and by content-type name.
#[derive(Default)]
pub struct FactoryRegistry {
    by_language: RwLock<HashMap<Language, Arc<dyn ViewFactory>>>,
    by_content_type: RwLock<HashMap<String, Arc<dyn ViewFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_for_language(&self, language: Language, factory: Arc<dyn ViewFactory>) {
        self.by_language.write().insert(language, factory);
    }

    pub fn register_for_content_type(&self, name: impl Into<String>, factory: Arc<dyn ViewFactory>) {
        self.by_content_type.write().insert(name.into(), factory);
    }

    pub fn unregister_language(&self, language: &Language) {
        self.by_language.write().remove(language);
    }

    pub fn for_language(&self, language: &Language) -> Option<Arc<dyn ViewFactory>> {
        self.by_language.read().get(language).cloned()
    }

    pub fn for_content_type(&self, name: &str) -> Option<Arc<dyn ViewFactory>> {
        self.by_content_type.read().get(name).cloned()
    }
}

/// Substitution rules keyed by the language they rewrite.
#[derive(Default)]
pub struct SubstitutorRegistry {
    by_language: RwLock<HashMap<Language, Vec<Arc<dyn LanguageSubstitutor>>>>,
}

impl SubstitutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, language: Language, substitutor: Arc<dyn LanguageSubstitutor>) {
        self.by_language.write().entry(language).or_default().push(substitutor);
    }

    /// First substitution any rule produces, or `language` itself.
    pub fn substitute(&self, language: Language, file: &FileRef, project: &ProjectContext) -> Language {
        let rules = self.by_language.read().get(&language).cloned().unwrap_or_default();
        for rule in rules {
            if let Some(substituted) = rule.substitute(&language, file, project) {
                trace!(file = %file, from = %language, to = %substituted, "Language substituted");
                return substituted;
            }
        }
        language
    }
}

/// Resolves languages and builds views.
#[derive(Clone)]
pub struct ViewResolver {
    factories: Arc<FactoryRegistry>,
    substitutors: Arc<SubstitutorRegistry>,
    project: Arc<ProjectContext>,
}

impl ViewResolver {
    pub fn new(
        factories: Arc<FactoryRegistry>,
        substitutors: Arc<SubstitutorRegistry>,
        project: Arc<ProjectContext>,
    ) -> Self {
        Self { factories, substitutors, project }
    }

    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    pub fn substitutors(&self) -> &Arc<SubstitutorRegistry> {
        &self.substitutors
    }

    pub fn project(&self) -> &Arc<ProjectContext> {
        &self.project
    }

    /// Current language of `file`, or `None` for content types without a language.
    ///
    /// Never memoized: substitution rules may read mutable project settings.
    pub fn resolve_language(&self, file: &FileRef) -> Option<Language> {
        let language = file.content_type().language?;
        Some(self.substitutors.substitute(language, file, &self.project))
    }

    pub fn create_view(&self, file: &FileRef, event_system_enabled: bool) -> View {
        let content_type = file.content_type();
        let language = content_type
            .language
            .clone()
            .map(|language| self.substitutors.substitute(language, file, &self.project));

        if let Some(language) = &language
            && let Some(factory) = self.factories.for_language(language)
        {
            match factory.create_view(file, Some(language.clone()), event_system_enabled) {
                Some(view) => return view,
                None => debug!(file = %file, language = %language, "Language factory declined"),
            }
        }

        if let Some(factory) = self.factories.for_content_type(&content_type.name) {
            match factory.create_view(file, language.clone(), event_system_enabled) {
                Some(view) => return view,
                None => {
                    debug!(file = %file, content_type = %content_type.name, "Content type factory declined")
                }
            }
        }

        generic_view(file, language, &content_type, event_system_enabled)
    }
}

/// Fallback view. Always succeeds.
fn generic_view(
    file: &FileRef,
    language: Option<Language>,
    content_type: &ContentType,
    event_system_enabled: bool,
) -> View {
    let kind = match (&language, content_type.binary) {
        (_, true) => ViewKind::Binary,
        (None, false) => ViewKind::PlainText,
        (Some(_), false) => ViewKind::SingleRoot,
    };
    let base_language = language.unwrap_or_else(Language::plain_text);
    View::new(file.clone(), base_language, kind, event_system_enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{FileTypeTable, MemoryFileSystem};

    fn resolver() -> ViewResolver {
        ViewResolver::new(
            Arc::new(FactoryRegistry::new()),
            Arc::new(SubstitutorRegistry::new()),
            Arc::new(ProjectContext::new("test")),
        )
    }

    fn fs() -> MemoryFileSystem {
        MemoryFileSystem::with_file_types(
            FileTypeTable::new()
                .with_extension("sql", ContentType::language("SQL", Language::new("Sql")))
                .with_extension("txt", ContentType::plain_text())
                .with_extension("png", ContentType::binary("IMAGE")),
        )
    }

    #[test]
    fn test_generic_fallback_kinds() {
        let fs = fs();
        let resolver = resolver();
        let sql = fs.create_file(&fs.root(), "q.sql").unwrap();
        let txt = fs.create_file(&fs.root(), "a.txt").unwrap();
        let png = fs.create_file(&fs.root(), "a.png").unwrap();

        assert_eq!(resolver.create_view(&sql, true).kind(), ViewKind::SingleRoot);
        assert_eq!(resolver.create_view(&txt, true).kind(), ViewKind::PlainText);
        assert_eq!(resolver.create_view(&png, true).kind(), ViewKind::Binary);
        assert_eq!(resolver.create_view(&txt, true).base_language(), &Language::plain_text());
    }

    #[test]
    fn test_language_factory_used_first() {
        let fs = fs();
        let resolver = resolver();
        let sql = fs.create_file(&fs.root(), "q.sql").unwrap();

        let mut factory = MockViewFactory::new();
        factory.expect_create_view().times(1).returning(|file, language, enabled| {
            Some(View::new(file.clone(), language.unwrap(), ViewKind::MultiRoot, enabled))
        });
        resolver.factories().register_for_language(Language::new("Sql"), Arc::new(factory));

        let view = resolver.create_view(&sql, false);
        assert_eq!(view.kind(), ViewKind::MultiRoot);
        assert!(!view.is_physical());
    }

    #[test]
    fn test_declined_language_factory_falls_through() {
        let fs = fs();
        let resolver = resolver();
        let sql = fs.create_file(&fs.root(), "q.sql").unwrap();

        let mut declining = MockViewFactory::new();
        declining.expect_create_view().times(1).returning(|_, _, _| None);
        let mut by_type = MockViewFactory::new();
        by_type.expect_create_view().times(1).returning(|file, _, enabled| {
            Some(View::new(file.clone(), Language::new("Sql"), ViewKind::Binary, enabled))
        });
        resolver.factories().register_for_language(Language::new("Sql"), Arc::new(declining));
        resolver.factories().register_for_content_type("SQL", Arc::new(by_type));

        assert_eq!(resolver.create_view(&sql, true).kind(), ViewKind::Binary);
    }

    #[test]
    fn test_everything_declines_uses_generic() {
        let fs = fs();
        let resolver = resolver();
        let sql = fs.create_file(&fs.root(), "q.sql").unwrap();

        let mut declining = MockViewFactory::new();
        declining.expect_create_view().returning(|_, _, _| None);
        let declining: Arc<dyn ViewFactory> = Arc::new(declining);
        resolver.factories().register_for_language(Language::new("Sql"), declining.clone());
        resolver.factories().register_for_content_type("SQL", declining);

        let view = resolver.create_view(&sql, true);
        assert_eq!(view.kind(), ViewKind::SingleRoot);
        assert_eq!(view.base_language(), &Language::new("Sql"));
    }

    #[test]
    fn test_substitution_reads_project_settings_every_time() {
        let fs = fs();
        let resolver = resolver();
        let sql = fs.create_file(&fs.root(), "q.sql").unwrap();
        resolver.substitutors().register(
            Language::new("Sql"),
            Arc::new(|_: &Language, _: &FileRef, project: &ProjectContext| {
                project.setting("sql.dialect").map(Language::new)
            }),
        );

        assert_eq!(resolver.resolve_language(&sql), Some(Language::new("Sql")));

        resolver.project().set_setting("sql.dialect", "PostgreSql");
        assert_eq!(resolver.resolve_language(&sql), Some(Language::new("PostgreSql")));
        assert_eq!(resolver.create_view(&sql, true).base_language(), &Language::new("PostgreSql"));

        resolver.project().remove_setting("sql.dialect");
        assert_eq!(resolver.resolve_language(&sql), Some(Language::new("Sql")));
    }

    #[test]
    fn test_non_language_files_resolve_to_none() {
        let fs = fs();
        let txt = fs.create_file(&fs.root(), "a.txt").unwrap();
        assert_eq!(resolver().resolve_language(&txt), None);
    }
}
