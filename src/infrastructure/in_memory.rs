use crate::domain::ports::IssuanceStore;
use crate::domain::record::{IssuanceRecord, NewIssuanceRecord, RecordFilter, RecordId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory issuance store.
///
/// Uses `Arc<RwLock<Vec<IssuanceRecord>>>` so clones share the same trail.
/// Record ids are positions in the vector, starting at 1. Ideal for testing
/// or one-off runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryIssuanceStore {
    records: Arc<RwLock<Vec<IssuanceRecord>>>,
}

impl InMemoryIssuanceStore {
    /// Creates a new, empty in-memory issuance store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssuanceStore for InMemoryIssuanceStore {
    async fn record(&self, record: NewIssuanceRecord) -> Result<RecordId> {
        let mut records = self.records.write().await;
        let id = records.len() as RecordId + 1;
        records.push(record.with_id(id));
        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<Option<IssuanceRecord>> {
        let records = self.records.read().await;
        let index = usize::try_from(id).ok().and_then(|id| id.checked_sub(1));
        Ok(index.and_then(|index| records.get(index)).cloned())
    }

    async fn list_recent(&self, filter: &RecordFilter) -> Result<Vec<IssuanceRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|record| filter.matches(record))
            .take(filter.limit)
            .cloned()
            .collect())
    }
}
