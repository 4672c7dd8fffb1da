#![allow(dead_code)]

use async_trait::async_trait;
use license_issuer::config::{DEFAULT_ERROR_SENTINEL, EngineConfig};
use license_issuer::domain::engine::{EngineResult, interpret_output};
use license_issuer::domain::ports::{IssuanceStore, LicenseEngine};
use license_issuer::domain::record::{
    IssuanceOutcome, IssuanceRecord, NewIssuanceRecord, RecordFilter, RecordId,
};
use license_issuer::domain::request::RawLicenseRequest;
use license_issuer::error::{IssuanceError, Result};
use license_issuer::infrastructure::in_memory::InMemoryIssuanceStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Behavior = dyn Fn(&str, u32) -> EngineResult + Send + Sync;

/// In-process engine double that counts its invocations.
#[derive(Clone)]
pub struct StubEngine {
    behavior: Arc<Behavior>,
    calls: Arc<AtomicUsize>,
}

impl StubEngine {
    fn with_behavior(behavior: impl Fn(&str, u32) -> EngineResult + Send + Sync + 'static) -> Self {
        Self {
            behavior: Arc::new(behavior),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signs every request as `LIC-<fingerprint>-<days>`.
    pub fn licensing() -> Self {
        Self::with_behavior(|fingerprint, days| {
            EngineResult::Success(format!("LIC-{fingerprint}-{days}"))
        })
    }

    /// Behaves as if the engine process had printed `stdout` and exited 0.
    pub fn printing(stdout: &'static str) -> Self {
        Self::with_behavior(move |_, _| interpret_output(stdout.as_bytes(), DEFAULT_ERROR_SENTINEL))
    }

    pub fn returning(result: EngineResult) -> Self {
        Self::with_behavior(move |_, _| result.clone())
    }

    /// Panics for `fingerprint`, signs every other request like `licensing`.
    pub fn panicking_on(fingerprint: &'static str) -> Self {
        Self::with_behavior(move |fp, days| {
            if fp == fingerprint {
                panic!("engine crashed on {fp}");
            }
            EngineResult::Success(format!("LIC-{fp}-{days}"))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LicenseEngine for StubEngine {
    async fn generate(&self, fingerprint: &str, duration_days: u32) -> EngineResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.behavior)(fingerprint, duration_days)
    }
}

/// Store double that refuses some writes and delegates everything else.
#[derive(Clone, Default)]
pub struct FailingStore {
    inner: InMemoryIssuanceStore,
    fail_failed_records: bool,
}

impl FailingStore {
    /// Refuses only `Issued` records.
    pub fn rejecting_issued() -> Self {
        Self::default()
    }

    /// Refuses every write.
    pub fn rejecting_all() -> Self {
        Self {
            fail_failed_records: true,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &InMemoryIssuanceStore {
        &self.inner
    }
}

#[async_trait]
impl IssuanceStore for FailingStore {
    async fn record(&self, record: NewIssuanceRecord) -> Result<RecordId> {
        let refuse = match record.outcome {
            IssuanceOutcome::Issued { .. } => true,
            IssuanceOutcome::Failed { .. } => self.fail_failed_records,
        };
        if refuse {
            return Err(IssuanceError::Persistence("disk I/O error".to_string()));
        }
        self.inner.record(record).await
    }

    async fn get(&self, id: RecordId) -> Result<Option<IssuanceRecord>> {
        self.inner.get(id).await
    }

    async fn list_recent(&self, filter: &RecordFilter) -> Result<Vec<IssuanceRecord>> {
        self.inner.list_recent(filter).await
    }
}

pub fn request(fingerprint: &str) -> RawLicenseRequest {
    RawLicenseRequest {
        fingerprint: Some(fingerprint.to_string()),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        title: Some("Dr".to_string()),
        company: Some("Analytical Engines".to_string()),
        email: Some(format!("{fingerprint}@example.com")),
    }
}

pub async fn all_records(store: &dyn IssuanceStore) -> Vec<IssuanceRecord> {
    store
        .list_recent(&RecordFilter::default().with_limit(usize::MAX))
        .await
        .expect("Failed to list records")
}

/// Writes a `/bin/sh` script receiving the fingerprint as `$1` and the
/// duration as `$2`.
pub fn write_engine_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("engine.sh");
    std::fs::write(&path, body).expect("Failed to write engine script");
    path
}

pub fn script_engine_config(script: &Path) -> EngineConfig {
    EngineConfig::new("/bin/sh").with_leading_args([script.display().to_string()])
}
