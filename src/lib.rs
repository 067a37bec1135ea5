pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod vfs;
pub mod view;

pub use cache::MemoryPressure;
pub use config::Config;
pub use error::{CacheError, ConsistencyError};
pub use manager::{
    AnalysisMode, Collaborators, ConsistencyReport, FileManager, Lifecycle, PendingEvent,
    TrimReport,
};
