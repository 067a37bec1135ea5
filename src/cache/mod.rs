//! The two identity-keyed caches.

mod directory_cache;
mod view_cache;

pub use directory_cache::DirectoryCache;
pub use view_cache::ViewCache;

/// How hard the host asks the caches to shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    /// Directories are only trimmed above the configured soft limit.
    Moderate,
    /// Everything collectable goes.
    Severe,
}
