//! Append-only persistence of published status records.
mod filesystem;
mod memory;

pub use filesystem::FilesystemStatusStore;
pub use memory::MemoryStatusStore;

use crate::config::StoreConfig;
use crate::model::{Platform, StatusRecord};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt record on line {line}: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },
}

/// Storage for the status history. Implementations must be thread-safe and
/// serialize their own appends.
#[async_trait]
pub trait StatusHistoryStore: Send + Sync {
    /// Appends a record to the end of the history.
    async fn append(&self, record: StatusRecord) -> Result<(), StoreError>;

    /// Returns every record for `version` and `platform`, in append order.
    async fn query_history(
        &self,
        version: &str,
        platform: Platform,
    ) -> Result<Vec<StatusRecord>, StoreError>;
}

pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn StatusHistoryStore>, StoreError> {
    let store: Arc<dyn StatusHistoryStore> = match config {
        StoreConfig::Memory => {
            tracing::warn!("Using the in-memory status store, history is lost on restart");
            Arc::new(MemoryStatusStore::new())
        }
        StoreConfig::Filesystem { path } => Arc::new(FilesystemStatusStore::open(path).await?),
    };
    Ok(store)
}
