use crate::config::DurationPolicy;
use crate::domain::engine::EngineResult;
use crate::domain::ports::{IssuanceStoreBox, LicenseEngineBox};
use crate::domain::record::{FailureCategory, FailureReason, NewIssuanceRecord, RecordId};
use crate::domain::request::{RawLicenseRequest, RequestValidator, RequesterIdentity};
use crate::error::{IssuanceError, Result, ValidationError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A license that has been generated and durably recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedLicense {
    pub record_id: RecordId,
    pub license: String,
    pub duration_days: u32,
    pub issued_at: DateTime<Utc>,
}

/// Runs the issuance pipeline: validate, invoke the engine, record, respond.
///
/// `IssuanceOrchestrator` holds no per-request state, so one instance can be
/// shared behind an `Arc` and driven from many tasks at once. Every attempt,
/// successful or not, leaves exactly one record in the store unless the store
/// itself is what failed.
pub struct IssuanceOrchestrator {
    validator: RequestValidator,
    engine: LicenseEngineBox,
    store: IssuanceStoreBox,
}

impl IssuanceOrchestrator {
    /// Creates a new `IssuanceOrchestrator`.
    ///
    /// # Arguments
    ///
    /// * `policy` - Duration granted to every license.
    /// * `engine` - The signing engine.
    /// * `store` - The audit trail every attempt is written to.
    pub fn new(policy: DurationPolicy, engine: LicenseEngineBox, store: IssuanceStoreBox) -> Self {
        Self {
            validator: RequestValidator::new(policy),
            engine,
            store,
        }
    }

    /// Issues one license.
    ///
    /// The license is returned only after its `Issued` record was written. A
    /// store failure at that point yields [`IssuanceError::Persistence`] and
    /// the generated license is dropped; the engine is not called again.
    pub async fn issue(&self, raw: RawLicenseRequest) -> Result<IssuedLicense> {
        let request = match self.validator.validate(&raw) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejected license request");
                let record = NewIssuanceRecord::failed(
                    raw.fingerprint_for_audit(),
                    self.validator.granted_days(),
                    RequesterIdentity::for_audit(&raw),
                    FailureReason::new(FailureCategory::Validation, err.to_string()),
                );
                self.record_failure(record).await;
                return Err(err.into());
            }
        };

        let license = match self
            .engine
            .generate(&request.fingerprint, request.duration_days)
            .await
        {
            EngineResult::Success(license) => license,
            EngineResult::Failure(failure) => {
                warn!(
                    fingerprint = %request.fingerprint,
                    category = %failure.category(),
                    retryable = failure.is_transient(),
                    detail = failure.detail(),
                    "license engine failed"
                );
                let record = NewIssuanceRecord::failed(
                    request.fingerprint.clone(),
                    request.duration_days,
                    request.identity.clone(),
                    failure.to_reason(),
                );
                self.record_failure(record).await;
                return Err(failure.into());
            }
        };

        let record = NewIssuanceRecord::issued(&request, license.clone());
        let issued_at = record.timestamp;
        match self.store.record(record).await {
            Ok(record_id) => {
                info!(
                    record_id,
                    fingerprint = %request.fingerprint,
                    duration_days = request.duration_days,
                    "license issued"
                );
                Ok(IssuedLicense {
                    record_id,
                    license,
                    duration_days: request.duration_days,
                    issued_at,
                })
            }
            Err(err) => {
                error!(
                    error = %err,
                    detail = err.detail().unwrap_or_default(),
                    fingerprint = %request.fingerprint,
                    email = %request.identity.email,
                    "generated license could not be recorded, withholding it"
                );
                Err(into_persistence(err))
            }
        }
    }

    /// Issues every request concurrently.
    ///
    /// Results are returned in input order.
    pub async fn issue_all(
        self: &Arc<Self>,
        requests: Vec<RawLicenseRequest>,
    ) -> Vec<Result<IssuedLicense>> {
        self.issue_rows(requests.into_iter().map(Ok).collect()).await
    }

    /// Issues a batch as read from its source, one result per row.
    ///
    /// A row that could not be read is audited as a validation failure and
    /// keeps its position in the output.
    pub async fn issue_rows(
        self: &Arc<Self>,
        rows: Vec<Result<RawLicenseRequest>>,
    ) -> Vec<Result<IssuedLicense>> {
        let audit_copies: Vec<RawLicenseRequest> = rows
            .iter()
            .map(|row| row.as_ref().cloned().unwrap_or_default())
            .collect();

        let mut tasks = JoinSet::new();
        for (index, row) in rows.into_iter().enumerate() {
            let orchestrator = Arc::clone(self);
            tasks.spawn(async move {
                let result = match row {
                    Ok(raw) => orchestrator.issue(raw).await,
                    Err(err) => Err(orchestrator.reject_unreadable(err).await),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<IssuedLicense>>> =
            (0..audit_copies.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => error!(error = %err, "issuance task aborted"),
            }
        }

        let mut results = Vec::with_capacity(slots.len());
        for (slot, raw) in slots.into_iter().zip(&audit_copies) {
            let result = match slot {
                Some(result) => result,
                None => Err(self.record_interrupted(raw).await),
            };
            results.push(result);
        }
        results
    }

    /// Audits a request that never made it into a [`RawLicenseRequest`].
    pub async fn reject_unreadable(&self, err: IssuanceError) -> IssuanceError {
        let err = ValidationError::Unreadable(err.to_string());
        warn!(error = %err, "rejected unreadable license request");
        let record = NewIssuanceRecord::failed(
            String::new(),
            self.validator.granted_days(),
            RequesterIdentity::default(),
            FailureReason::new(FailureCategory::Validation, err.to_string()),
        );
        self.record_failure(record).await;
        err.into()
    }

    async fn record_interrupted(&self, raw: &RawLicenseRequest) -> IssuanceError {
        let detail = "issuance task did not complete";
        let record = NewIssuanceRecord::failed(
            raw.fingerprint_for_audit(),
            self.validator.granted_days(),
            RequesterIdentity::for_audit(raw),
            FailureReason::new(FailureCategory::Internal, detail),
        );
        self.record_failure(record).await;
        IssuanceError::Internal(detail.to_string())
    }

    // The caller gets the original failure; a store error here is logged only.
    async fn record_failure(&self, record: NewIssuanceRecord) {
        if let Err(err) = self.store.record(record).await {
            error!(
                error = %err,
                detail = err.detail().unwrap_or_default(),
                "failed issuance attempt could not be recorded"
            );
        }
    }
}

fn into_persistence(err: IssuanceError) -> IssuanceError {
    match err {
        IssuanceError::Persistence(_) => err,
        other => IssuanceError::Persistence(other.to_string()),
    }
}
