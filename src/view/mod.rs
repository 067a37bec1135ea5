//! Views and their collaborators.
//!
//! This module provides:
//! - The derived objects (`View`, `ParsedTree`, `Directory`)
//! - View construction with language substitution and factory fallback
//! - Lookup of injected fragment views
//! - Hooks into the document layer

mod document;
mod factory;
mod injected;
mod model;

#[cfg(any(test, feature = "mockall"))]
pub use document::MockDocumentBinding;
pub use document::{DocumentBinding, DocumentRegistry, NoDocuments};
#[cfg(any(test, feature = "mockall"))]
pub use factory::MockViewFactory;
pub use factory::{
    FactoryRegistry, LanguageSubstitutor, ProjectContext, SubstitutorRegistry, ViewFactory,
    ViewResolver,
};
pub use injected::{InjectedViewLookup, InjectionRegistry};
pub use model::{Directory, ParsedTree, View, ViewKind};
