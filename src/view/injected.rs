// Views of injected fragments
//
// A fragment embedded in a host file (say, SQL inside a string literal) is owned by the
// host's injection machinery, not by the view cache. Lookups for injected identities are
// answered from here first.

use std::sync::Arc;

use dashmap::DashMap;

use super::model::View;
use crate::vfs::InjectedCoordinate;

pub trait InjectedViewLookup: Send + Sync {
    fn cached_view(&self, coordinate: &InjectedCoordinate) -> Option<Arc<View>>;
}

/// Registry of injected views keyed by coordinate.
#[derive(Debug, Default)]
pub struct InjectionRegistry {
    views: DashMap<InjectedCoordinate, Arc<View>>,
}

impl InjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, coordinate: InjectedCoordinate, view: Arc<View>) {
        self.views.insert(coordinate, view);
    }

    pub fn unregister(&self, coordinate: &InjectedCoordinate) -> Option<Arc<View>> {
        self.views.remove(coordinate).map(|(_, view)| view)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl InjectedViewLookup for InjectionRegistry {
    fn cached_view(&self, coordinate: &InjectedCoordinate) -> Option<Arc<View>> {
        self.views.get(coordinate).map(|view| view.clone())
    }
}
