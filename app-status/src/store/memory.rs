use super::{StatusHistoryStore, StoreError};
use crate::model::{Platform, StatusRecord};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-memory status history backed by a `RwLock<Vec>`.
#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<Vec<StatusRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusHistoryStore for MemoryStatusStore {
    async fn append(&self, record: StatusRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query_history(
        &self,
        version: &str,
        platform: Platform,
    ) -> Result<Vec<StatusRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.version == version && r.platform == platform)
            .cloned()
            .collect())
    }
}
