use crate::domain::ports::IssuanceStore;
use crate::domain::record::{IssuanceRecord, NewIssuanceRecord, RecordFilter, RecordId};
use crate::error::{IssuanceError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Column Family holding issuance records keyed by big-endian record id.
pub const CF_ISSUANCES: &str = "issuances";

/// A persistent issuance store implementation using RocksDB.
///
/// Keys are big-endian record ids, so iteration order is issuance order.
/// Values are JSON documents; nothing from a record ever ends up in a key.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>` and
/// id counter).
#[derive(Clone)]
pub struct RocksDBIssuanceStore {
    db: Arc<DB>,
    next_id: Arc<AtomicU64>,
}

impl RocksDBIssuanceStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Resumes id assignment after the highest id already stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_issuances = ColumnFamilyDescriptor::new(CF_ISSUANCES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_issuances])?;

        let last_id = {
            let cf = cf_handle(&db)?;
            match db.iterator_cf(&cf, IteratorMode::End).next() {
                Some(item) => {
                    let (key, _value) = item?;
                    decode_key(&key)?
                }
                None => 0,
            }
        };

        Ok(Self {
            db: Arc::new(db),
            next_id: Arc::new(AtomicU64::new(last_id + 1)),
        })
    }
}

fn cf_handle(db: &DB) -> Result<&rocksdb::ColumnFamily> {
    db.cf_handle(CF_ISSUANCES).ok_or_else(|| {
        IssuanceError::Persistence("issuances column family not found".to_string())
    })
}

fn decode_key(key: &[u8]) -> Result<RecordId> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| {
        IssuanceError::Persistence(format!("malformed issuance key of {} bytes", key.len()))
    })?;
    Ok(RecordId::from_be_bytes(bytes))
}

fn decode_record(bytes: &[u8]) -> Result<IssuanceRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| IssuanceError::Persistence(format!("Deserialization error: {e}")))
}

#[async_trait]
impl IssuanceStore for RocksDBIssuanceStore {
    async fn record(&self, record: NewIssuanceRecord) -> Result<RecordId> {
        let cf = cf_handle(&self.db)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let value = serde_json::to_vec(&record.with_id(id))
            .map_err(|e| IssuanceError::Persistence(format!("Serialization error: {e}")))?;

        self.db.put_cf(&cf, id.to_be_bytes(), value)?;

        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<Option<IssuanceRecord>> {
        let cf = cf_handle(&self.db)?;

        match self.db.get_cf(&cf, id.to_be_bytes())? {
            Some(bytes) => decode_record(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn list_recent(&self, filter: &RecordFilter) -> Result<Vec<IssuanceRecord>> {
        let cf = cf_handle(&self.db)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::End) {
            if records.len() >= filter.limit {
                break;
            }
            let (_key, value) = item?;
            let record = decode_record(&value)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }

        Ok(records)
    }
}
