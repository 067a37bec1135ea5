//! Content-type classification.
//!
//! A [`FileTypeTable`] maps file extensions to [`ContentType`]s. The table can be swapped at
//! runtime, which is exactly the event that forces a content-type reconciliation pass.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Language tag. Compared by value, so two independently created tags with the same id
/// denote the same language.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Language(Arc<str>);

impl Language {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Language of files that have no language of their own.
    pub fn plain_text() -> Self {
        Self::new("TEXT")
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Language({})", self.0)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentType {
    pub name: String,
    /// Set for language-backed content types.
    pub language: Option<Language>,
    pub binary: bool,
}

impl ContentType {
    pub fn language(name: impl Into<String>, language: Language) -> Self {
        Self { name: name.into(), language: Some(language), binary: false }
    }

    pub fn plain_text() -> Self {
        Self { name: "PLAIN_TEXT".to_string(), language: None, binary: false }
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self { name: name.into(), language: None, binary: true }
    }

    /// Content type of anything the table does not know about.
    pub fn unknown() -> Self {
        Self::binary("UNKNOWN")
    }

    pub fn directory() -> Self {
        Self { name: "DIRECTORY".to_string(), language: None, binary: false }
    }
}

/// Extension to content-type table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileTypeTable {
    by_extension: HashMap<String, ContentType>,
    #[serde(default)]
    by_file_name: HashMap<String, ContentType>,
}

impl FileTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `content_type` for an extension given without the leading dot.
    pub fn with_extension(mut self, extension: &str, content_type: ContentType) -> Self {
        self.by_extension.insert(extension.to_ascii_lowercase(), content_type);
        self
    }

    /// Register `content_type` for an exact file name such as `Makefile`.
    pub fn with_file_name(mut self, file_name: &str, content_type: ContentType) -> Self {
        self.by_file_name.insert(file_name.to_string(), content_type);
        self
    }

    /// Classify a file name. Exact names win over extensions.
    pub fn classify(&self, file_name: &str) -> ContentType {
        if let Some(content_type) = self.by_file_name.get(file_name) {
            return content_type.clone();
        }

        match extension(file_name) {
            Some(ext) => self
                .by_extension
                .get(&ext.to_ascii_lowercase())
                .cloned()
                .unwrap_or_else(ContentType::unknown),
            None => ContentType::unknown(),
        }
    }
}

fn extension(file_name: &str) -> Option<&str> {
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(pos) => Some(&file_name[pos + 1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_value_equality() {
        assert_eq!(Language::new("Rust"), Language::new("Rust"));
        assert_ne!(Language::new("Rust"), Language::new("rust"));
        assert_eq!(Language::plain_text().id(), "TEXT");
    }

    #[test]
    fn test_language_serializes_as_id() {
        let json = serde_json::to_string(&Language::new("Rust")).unwrap();
        assert_eq!(json, "\"Rust\"");
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::new("Rust"));
    }

    #[test]
    fn test_classify_by_extension() {
        let rust = ContentType::language("RUST", Language::new("Rust"));
        let table = FileTypeTable::new().with_extension("rs", rust.clone());

        assert_eq!(table.classify("main.rs"), rust);
        assert_eq!(table.classify("MAIN.RS"), rust);
        assert_eq!(table.classify("main.py"), ContentType::unknown());
    }

    #[test]
    fn test_classify_file_name_wins() {
        let make = ContentType::plain_text();
        let table = FileTypeTable::new()
            .with_extension("txt", ContentType::binary("WEIRD"))
            .with_file_name("Makefile.txt", make.clone());

        assert_eq!(table.classify("Makefile.txt"), make);
        assert!(table.classify("other.txt").binary);
    }

    #[test]
    fn test_dotfiles_have_no_extension() {
        assert_eq!(extension(".gitignore"), None);
        assert_eq!(extension("archive.tar.gz"), Some("gz"));
        assert_eq!(extension("README"), None);
    }
}
