//! Runtime configuration for the issuance pipeline.
//!
//! Values come from the command line (or `LICENSE_ISSUER_*` environment
//! variables) and are checked here before any component is built.

use crate::error::{IssuanceError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Validity granted to every license unless the administrator overrides it.
pub const DEFAULT_DURATION_DAYS: u32 = 60;
pub const DEFAULT_MIN_DURATION_DAYS: u32 = 1;
pub const DEFAULT_MAX_DURATION_DAYS: u32 = 365;
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(30);
/// Marker the engine prints inside its single output line on a logical error.
pub const DEFAULT_ERROR_SENTINEL: &str = "Error";
pub const DEFAULT_MAX_ENGINE_PROCESSES: usize = 8;

/// Administrator-controlled license validity.
///
/// Callers never choose the duration: every request receives
/// [`DurationPolicy::granted_days`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPolicy {
    default_days: u32,
    min_days: u32,
    max_days: u32,
}

impl DurationPolicy {
    pub fn new(default_days: u32, min_days: u32, max_days: u32) -> Result<Self> {
        if min_days == 0 {
            return Err(IssuanceError::Config(
                "minimum license duration must be at least one day".to_string(),
            ));
        }
        if min_days > max_days {
            return Err(IssuanceError::Config(format!(
                "minimum license duration ({min_days}) exceeds maximum ({max_days})"
            )));
        }
        if !(min_days..=max_days).contains(&default_days) {
            tracing::warn!(
                default_days,
                min_days,
                max_days,
                "configured license duration outside allowed range, clamping"
            );
        }
        Ok(Self {
            default_days,
            min_days,
            max_days,
        })
    }

    /// The duration, in days, passed to the engine for every request.
    pub fn granted_days(&self) -> u32 {
        self.default_days.clamp(self.min_days, self.max_days)
    }
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            default_days: DEFAULT_DURATION_DAYS,
            min_days: DEFAULT_MIN_DURATION_DAYS,
            max_days: DEFAULT_MAX_DURATION_DAYS,
        }
    }
}

/// How to launch the external signing engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Fixed arguments placed before the fingerprint and duration.
    pub leading_args: Vec<String>,
    /// Upper bound on a single engine run; the process is killed afterwards.
    pub timeout: Duration,
    pub sentinel: String,
    /// Number of engine processes allowed to run at the same time.
    pub max_concurrent: usize,
}

impl EngineConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_ENGINE_TIMEOUT,
            sentinel: DEFAULT_ERROR_SENTINEL.to_string(),
            max_concurrent: DEFAULT_MAX_ENGINE_PROCESSES,
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Rejects settings the engine client cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.sentinel.is_empty() {
            return Err(IssuanceError::Config(
                "engine error sentinel must not be empty".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(IssuanceError::Config(
                "engine timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(IssuanceError::Config(
                "at least one engine process must be allowed".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_grants_sixty_days() {
        assert_eq!(DurationPolicy::default().granted_days(), 60);
    }

    #[test]
    fn test_policy_clamps_out_of_range_default() {
        let policy = DurationPolicy::new(1000, 1, 365).unwrap();
        assert_eq!(policy.granted_days(), 365);

        let policy = DurationPolicy::new(0, 7, 30).unwrap();
        assert_eq!(policy.granted_days(), 7);
    }

    #[test]
    fn test_policy_rejects_inverted_range() {
        assert!(matches!(
            DurationPolicy::new(10, 30, 7),
            Err(IssuanceError::Config(_))
        ));
        assert!(matches!(
            DurationPolicy::new(10, 0, 7),
            Err(IssuanceError::Config(_))
        ));
    }

    #[test]
    fn test_engine_config_validation() {
        let config = EngineConfig::new("/usr/bin/engine");
        assert!(config.validate().is_ok());
        assert!(config.clone().with_sentinel("").validate().is_err());
        assert!(config.clone().with_timeout(Duration::ZERO).validate().is_err());
        assert!(config.with_max_concurrent(0).validate().is_err());
    }
}
