use crate::domain::ports::IssuanceStore;
use crate::domain::record::{
    FailureCategory, FailureReason, IssuanceOutcome, IssuanceRecord, IssuanceStatus,
    NewIssuanceRecord, RecordFilter, RecordId,
};
use crate::domain::request::RequesterIdentity;
use crate::error::{IssuanceError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS issuance_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issued_at TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        duration_days INTEGER NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        title TEXT NOT NULL,
        company TEXT NOT NULL,
        email TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('issued', 'failed')),
        license TEXT,
        failure_category TEXT,
        failure_reason TEXT,
        CHECK ((status = 'issued') = (license IS NOT NULL)),
        CHECK ((status = 'failed') = (failure_reason IS NOT NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_issuance_records_fingerprint
        ON issuance_records (fingerprint);

    CREATE TRIGGER IF NOT EXISTS issuance_records_no_update
        BEFORE UPDATE ON issuance_records
    BEGIN
        SELECT RAISE(ABORT, 'issuance records are append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS issuance_records_no_delete
        BEFORE DELETE ON issuance_records
    BEGIN
        SELECT RAISE(ABORT, 'issuance records are append-only');
    END;
";

const INSERT_RECORD: &str = "
    INSERT INTO issuance_records (
        issued_at, fingerprint, duration_days,
        first_name, last_name, title, company, email,
        status, license, failure_category, failure_reason
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const SELECT_COLUMNS: &str = "
    SELECT id, issued_at, fingerprint, duration_days,
           first_name, last_name, title, company, email,
           status, license, failure_category, failure_reason
    FROM issuance_records";

/// Durable issuance store backed by a single SQLite file.
///
/// All statements are static SQL with bound parameters. The connection sits
/// behind a mutex and every call runs on the blocking thread pool, so clones
/// can be shared across concurrent orchestrations.
#[derive(Clone)]
pub struct SqliteIssuanceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIssuanceStore {
    /// Opens (or creates) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            IssuanceError::Persistence(format!(
                "failed to open issuance store at {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA).map_err(|e| {
            IssuanceError::Persistence(format!("failed to initialise issuance schema: {e}"))
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| {
                IssuanceError::Persistence("issuance store connection poisoned".to_string())
            })?;
            operation(&conn)
        })
        .await
        .map_err(|e| IssuanceError::Persistence(format!("issuance store task failed: {e}")))?
    }
}

#[async_trait]
impl IssuanceStore for SqliteIssuanceStore {
    async fn record(&self, record: NewIssuanceRecord) -> Result<RecordId> {
        self.with_connection(move |conn| {
            let status = record.status();
            let (license, failure_category, failure_reason) = match &record.outcome {
                IssuanceOutcome::Issued { license } => (Some(license.as_str()), None, None),
                IssuanceOutcome::Failed { reason } => (
                    None,
                    Some(reason.category.as_str()),
                    Some(reason.detail.as_str()),
                ),
            };
            conn.execute(
                INSERT_RECORD,
                params![
                    record.timestamp.to_rfc3339(),
                    record.fingerprint,
                    record.duration_days,
                    record.identity.first_name,
                    record.identity.last_name,
                    record.identity.title,
                    record.identity.company,
                    record.identity.email,
                    status.as_str(),
                    license,
                    failure_category,
                    failure_reason,
                ],
            )?;
            RecordId::try_from(conn.last_insert_rowid()).map_err(|_| {
                IssuanceError::Persistence("store assigned a negative record id".to_string())
            })
        })
        .await
    }

    async fn get(&self, id: RecordId) -> Result<Option<IssuanceRecord>> {
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };
        self.with_connection(move |conn| {
            let row = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    params![id],
                    RecordRow::from_row,
                )
                .optional()?;
            row.map(RecordRow::into_record).transpose()
        })
        .await
    }

    async fn list_recent(&self, filter: &RecordFilter) -> Result<Vec<IssuanceRecord>> {
        let status = filter.status.map(|status| status.as_str());
        let fingerprint = filter.fingerprint.clone();
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS}
                 WHERE (?1 IS NULL OR status = ?1)
                   AND (?2 IS NULL OR fingerprint = ?2)
                 ORDER BY id DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![status, fingerprint, limit], RecordRow::from_row)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?.into_record()?);
            }
            Ok(records)
        })
        .await
    }
}

struct RecordRow {
    id: i64,
    issued_at: String,
    fingerprint: String,
    duration_days: u32,
    identity: RequesterIdentity,
    status: String,
    license: Option<String>,
    failure_category: Option<String>,
    failure_reason: Option<String>,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            issued_at: row.get(1)?,
            fingerprint: row.get(2)?,
            duration_days: row.get(3)?,
            identity: RequesterIdentity {
                first_name: row.get(4)?,
                last_name: row.get(5)?,
                title: row.get(6)?,
                company: row.get(7)?,
                email: row.get(8)?,
            },
            status: row.get(9)?,
            license: row.get(10)?,
            failure_category: row.get(11)?,
            failure_reason: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<IssuanceRecord> {
        let corrupt = |what: String| {
            IssuanceError::Persistence(format!("corrupt issuance record {}: {what}", self.id))
        };

        let timestamp = DateTime::parse_from_rfc3339(&self.issued_at)
            .map_err(|e| corrupt(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        let status: IssuanceStatus = self.status.parse().map_err(corrupt)?;
        let outcome = match status {
            IssuanceStatus::Issued => IssuanceOutcome::Issued {
                license: self
                    .license
                    .ok_or_else(|| corrupt("issued without a license".to_string()))?,
            },
            IssuanceStatus::Failed => {
                let category: FailureCategory = self
                    .failure_category
                    .as_deref()
                    .ok_or_else(|| corrupt("failed without a category".to_string()))?
                    .parse()
                    .map_err(corrupt)?;
                let detail = self.failure_reason.unwrap_or_default();
                IssuanceOutcome::Failed {
                    reason: FailureReason::new(category, detail),
                }
            }
        };

        Ok(IssuanceRecord {
            id: RecordId::try_from(self.id).map_err(|_| corrupt("negative id".to_string()))?,
            timestamp,
            fingerprint: self.fingerprint,
            duration_days: self.duration_days,
            identity: self.identity,
            outcome,
        })
    }
}
