use thiserror::Error;

/// Reasons an inbound license request is refused before the engine runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a license request fingerprint is required")]
    MissingFingerprint,
    #[error("field `{field}` contains unsafe input: {reason}")]
    UnsafeInput { field: &'static str, reason: String },
    #[error("the request could not be read: {0}")]
    Unreadable(String),
}

/// Errors surfaced by the issuance pipeline.
///
/// The `Display` text of each variant is the caller-facing summary. Engine
/// diagnostics travel in the variant payload and only reach the logs.
#[derive(Error, Debug)]
pub enum IssuanceError {
    #[error("invalid license request: {0}")]
    Validation(#[from] ValidationError),
    #[error("the license engine is temporarily unavailable, please retry later")]
    EngineUnavailable(String),
    #[error("the license engine rejected this request")]
    EngineReportedError(String),
    #[error("the license engine returned a malformed response")]
    UnexpectedOutputShape(String),
    #[error("the license could not be recorded, please contact support")]
    Persistence(String),
    #[error("an internal error interrupted this request")]
    Internal(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IssuanceError {
    /// Whether repeating the identical request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineUnavailable(_))
    }

    /// Stable machine-readable name of the failure class.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::EngineReportedError(_) => "engine_reported_error",
            Self::UnexpectedOutputShape(_) => "unexpected_output_shape",
            Self::Persistence(_) => "persistence",
            Self::Internal(_) => "internal",
            Self::Config(_) => "config",
            Self::CsvError(_) => "csv",
            Self::IoError(_) => "io",
        }
    }

    /// Internal detail intended for logs, never for the caller.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::EngineUnavailable(detail)
            | Self::EngineReportedError(detail)
            | Self::UnexpectedOutputShape(detail)
            | Self::Persistence(detail)
            | Self::Internal(detail) => Some(detail),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for IssuanceError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(format!("sqlite: {err}"))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for IssuanceError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Persistence(format!("rocksdb: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, IssuanceError>;
