//! Contract of the external signing engine.
//!
//! The engine prints exactly one line on stdout: either the signed license or
//! a line containing the error sentinel. [`interpret_output`] applies that
//! contract to raw process output.

use super::record::{FailureCategory, FailureReason};
use crate::error::IssuanceError;

/// Outcome of a single engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineResult {
    Success(String),
    Failure(EngineFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    /// Spawn failure, timeout or non-zero exit. Retrying may help.
    Unavailable(String),
    /// The engine understood the request and refused it.
    ReportedError(String),
    /// Output did not consist of exactly one non-empty line.
    UnexpectedOutputShape(String),
}

impl EngineFailure {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Unavailable(_) => FailureCategory::EngineUnavailable,
            Self::ReportedError(_) => FailureCategory::EngineReportedError,
            Self::UnexpectedOutputShape(_) => FailureCategory::UnexpectedOutputShape,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Unavailable(detail)
            | Self::ReportedError(detail)
            | Self::UnexpectedOutputShape(detail) => detail,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn to_reason(&self) -> FailureReason {
        FailureReason::new(self.category(), self.detail())
    }
}

impl From<EngineFailure> for IssuanceError {
    fn from(failure: EngineFailure) -> Self {
        match failure {
            EngineFailure::Unavailable(detail) => Self::EngineUnavailable(detail),
            EngineFailure::ReportedError(line) => Self::EngineReportedError(line),
            EngineFailure::UnexpectedOutputShape(detail) => Self::UnexpectedOutputShape(detail),
        }
    }
}

/// Interprets the stdout of an engine run that exited successfully.
///
/// Blank lines are ignored. Exactly one remaining line is required; it is a
/// logical error when it contains `sentinel`, the license otherwise.
pub fn interpret_output(stdout: &[u8], sentinel: &str) -> EngineResult {
    let Ok(text) = std::str::from_utf8(stdout) else {
        return EngineResult::Failure(EngineFailure::UnexpectedOutputShape(
            "engine output is not valid UTF-8".to_string(),
        ));
    };

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match lines.as_slice() {
        [line] if line.contains(sentinel) => {
            EngineResult::Failure(EngineFailure::ReportedError((*line).to_string()))
        }
        [line] => EngineResult::Success((*line).to_string()),
        other => EngineResult::Failure(EngineFailure::UnexpectedOutputShape(format!(
            "expected exactly one output line, got {}",
            other.len()
        ))),
    }
}
