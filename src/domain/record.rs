use super::request::{LicenseRequest, RequesterIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier assigned by the store when a record is written.
pub type RecordId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuanceStatus {
    Issued,
    Failed,
}

impl IssuanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IssuanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssuanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(Self::Issued),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown issuance status `{other}`")),
        }
    }
}

/// Which stage of the pipeline rejected an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Validation,
    EngineUnavailable,
    EngineReportedError,
    UnexpectedOutputShape,
    /// The attempt was interrupted inside the issuer itself.
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::EngineUnavailable => "engine_unavailable",
            Self::EngineReportedError => "engine_reported_error",
            Self::UnexpectedOutputShape => "unexpected_output_shape",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(Self::Validation),
            "engine_unavailable" => Ok(Self::EngineUnavailable),
            "engine_reported_error" => Ok(Self::EngineReportedError),
            "unexpected_output_shape" => Ok(Self::UnexpectedOutputShape),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown failure category `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub category: FailureCategory,
    pub detail: String,
}

impl FailureReason {
    pub fn new(category: FailureCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }
}

/// Result of one attempt. A license exists only on `Issued`, a failure
/// reason only on `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IssuanceOutcome {
    Issued { license: String },
    Failed { reason: FailureReason },
}

/// An attempt that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssuanceRecord {
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
    pub duration_days: u32,
    pub identity: RequesterIdentity,
    pub outcome: IssuanceOutcome,
}

impl NewIssuanceRecord {
    pub fn issued(request: &LicenseRequest, license: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            fingerprint: request.fingerprint.clone(),
            duration_days: request.duration_days,
            identity: request.identity.clone(),
            outcome: IssuanceOutcome::Issued {
                license: license.into(),
            },
        }
    }

    pub fn failed(
        fingerprint: String,
        duration_days: u32,
        identity: RequesterIdentity,
        reason: FailureReason,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            fingerprint,
            duration_days,
            identity,
            outcome: IssuanceOutcome::Failed { reason },
        }
    }

    pub fn status(&self) -> IssuanceStatus {
        match self.outcome {
            IssuanceOutcome::Issued { .. } => IssuanceStatus::Issued,
            IssuanceOutcome::Failed { .. } => IssuanceStatus::Failed,
        }
    }

    pub fn with_id(self, id: RecordId) -> IssuanceRecord {
        IssuanceRecord {
            id,
            timestamp: self.timestamp,
            fingerprint: self.fingerprint,
            duration_days: self.duration_days,
            identity: self.identity,
            outcome: self.outcome,
        }
    }
}

/// Immutable audit entry for one issuance attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
    pub duration_days: u32,
    pub identity: RequesterIdentity,
    pub outcome: IssuanceOutcome,
}

impl IssuanceRecord {
    pub fn status(&self) -> IssuanceStatus {
        match self.outcome {
            IssuanceOutcome::Issued { .. } => IssuanceStatus::Issued,
            IssuanceOutcome::Failed { .. } => IssuanceStatus::Failed,
        }
    }

    pub fn license(&self) -> Option<&str> {
        match &self.outcome {
            IssuanceOutcome::Issued { license } => Some(license),
            IssuanceOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.outcome {
            IssuanceOutcome::Issued { .. } => None,
            IssuanceOutcome::Failed { reason } => Some(reason),
        }
    }
}

/// Selection used when listing the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub limit: usize,
    pub status: Option<IssuanceStatus>,
    pub fingerprint: Option<String>,
}

impl RecordFilter {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_status(mut self, status: IssuanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn matches(&self, record: &IssuanceRecord) -> bool {
        self.status.is_none_or(|status| record.status() == status)
            && self
                .fingerprint
                .as_deref()
                .is_none_or(|fingerprint| record.fingerprint == fingerprint)
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            status: None,
            fingerprint: None,
        }
    }
}
