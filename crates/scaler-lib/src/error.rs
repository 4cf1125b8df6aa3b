//! Error taxonomy for the control loop
//!
//! Every error except [`ConfigError`] is scoped to a single step or attempt;
//! the loop logs it and carries on with the next interval.

use crate::units::UnitError;
use thiserror::Error;

/// Failures talking to the metrics source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Source unreachable or answered with a non-200 status
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Body did not match the expected schema, or a quantity was malformed
    #[error("failed to parse response from {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl SourceError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn from_unit(url: impl Into<String>, err: UnitError) -> Self {
        Self::parse(url, err)
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures from the sample store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same `(resource_name, timestamp)` already exists
    #[error("duplicate key ({resource_name}, {timestamp})")]
    DuplicateKey { resource_name: String, timestamp: i64 },

    /// Any other storage failure
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

/// Failures of a single provisioning attempt
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("an instance named {0} already exists")]
    NameConflict(String),

    #[error("instance creation failed: {0}")]
    CreateFailed(String),

    #[error("status polling failed: {0}")]
    PollFailed(String),

    #[error("instance {external_id} not active after {attempts} status checks")]
    TimedOut { external_id: u64, attempts: u32 },

    #[error("worker registration failed: {0}")]
    Registration(String),

    #[error("node bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Invalid or missing configuration, fatal at startup
#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Umbrella error for a control loop cycle
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ScalerResult<T> = Result<T, ScalerError>;
