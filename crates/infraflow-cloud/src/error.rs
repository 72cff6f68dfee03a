//! Reconciliation error types

use infraflow_core::{ResourceKind, ValidationError};
use thiserror::Error;

/// Errors raised while planning, applying or persisting state
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider '{provider}' has no adapter for kind '{kind}'")]
    AdapterNotFound {
        provider: String,
        kind: ResourceKind,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("State conflict for '{name}': expected revision {expected}, found {found}")]
    StateConflict {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Errors in the desired state itself. These abort before any mutation.
    pub fn is_input_error(&self) -> bool {
        matches!(self, CloudError::Validation(_) | CloudError::Cycle(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// The dependency graph contains a cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle between: {}", .members.join(", "))]
pub struct CycleError {
    /// Names taking part in a cycle, sorted
    pub members: Vec<String>,
}

/// Failure reported by a provider adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Throttling or eventual-consistency lag; worth retrying
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The provider rejected the request as invalid
    #[error("rejected by provider: {0}")]
    Validation(String),

    #[error("{resource} did not become {target} within {waited_ms}ms")]
    ProvisioningTimeout {
        resource: String,
        target: String,
        waited_ms: u64,
    },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("API error: {0}")]
    Api(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
