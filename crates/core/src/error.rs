use crate::models::Category;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("source unavailable: {source_location}")]
    SourceUnavailable {
        source_location: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to persist {what} at {path}")]
    PersistenceWriteFailed {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {item} into {category} bucket")]
    ItemCopyFailed {
        item: String,
        category: Category,
        #[source]
        source: io::Error,
    },
    #[error("engine busy: {0} in progress")]
    EngineBusy(&'static str),
    #[error("no item is loaded")]
    NoCurrentItem,
    #[error("engine stopped")]
    Stopped,
    #[error("failed to load {what} at {path}")]
    LoadFailed {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TriageError {
    /// Failures that leave the in-memory state ahead of the durable copy.
    pub fn is_degraded_durability(&self) -> bool {
        matches!(self, TriageError::PersistenceWriteFailed { .. })
    }
}
