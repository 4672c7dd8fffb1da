use super::engine::EngineResult;
use super::record::{IssuanceRecord, NewIssuanceRecord, RecordFilter, RecordId};
use crate::error::Result;
use async_trait::async_trait;

/// Capability to turn a fingerprint and a duration into a signed license.
#[async_trait]
pub trait LicenseEngine: Send + Sync {
    async fn generate(&self, fingerprint: &str, duration_days: u32) -> EngineResult;
}

/// Append-only audit trail of issuance attempts.
///
/// There is no update or delete: every call to `record` creates a new entry,
/// even for identical content.
#[async_trait]
pub trait IssuanceStore: Send + Sync {
    async fn record(&self, record: NewIssuanceRecord) -> Result<RecordId>;
    async fn get(&self, id: RecordId) -> Result<Option<IssuanceRecord>>;
    /// Newest first, at most `filter.limit` entries.
    async fn list_recent(&self, filter: &RecordFilter) -> Result<Vec<IssuanceRecord>>;
}

pub type LicenseEngineBox = Box<dyn LicenseEngine>;
pub type IssuanceStoreBox = Box<dyn IssuanceStore>;
