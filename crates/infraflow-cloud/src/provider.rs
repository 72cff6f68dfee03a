//! Cloud provider trait definition

use crate::error::{ProviderResult, Result};
use crate::state::AppliedState;
use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use infraflow_core::{AttrValue, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Cloud provider abstraction trait
///
/// A provider hands out one [`ResourceAdapter`] per resource kind it
/// supports.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws", "sandbox")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Adapter for `kind`, if supported
    fn adapter(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceAdapter>>;
}

/// Translates operations on one resource kind into provider calls
///
/// `create` must be idempotent: when the object already exists under the same
/// logical name it is adopted. `delete` of an object that is already gone
/// succeeds.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn create(&self, spec: &ResourceSpec) -> ProviderResult<ProvisionedResource>;

    async fn update(
        &self,
        spec: &ResourceSpec,
        current: &AppliedState,
    ) -> ProviderResult<ProvisionedResource>;

    async fn delete(&self, current: &AppliedState) -> ProviderResult<()>;

    /// Observe the live object, `None` when it does not exist
    async fn describe(&self, name: &str) -> ProviderResult<Option<ObservedResource>>;
}

/// What a provider reports after a successful create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub provider_id: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl ProvisionedResource {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }
}

/// A live object as the provider sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResource {
    pub provider_id: String,
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Retry configuration for provider operations
///
/// Only transient provider errors are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delays between attempts: `max_attempts - 1` values growing from
    /// `initial_delay` up to `max_delay`
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.backoff_multiplier as f32)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
