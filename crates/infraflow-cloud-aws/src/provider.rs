//! AWS provider

use crate::adapters::AwsResourceAdapter;
use crate::api::CloudApi;
use crate::error::Result;
use crate::sandbox::SandboxApi;
use async_trait::async_trait;
use infraflow_cloud::{AuthStatus, CloudProvider, PollConfig, ResourceAdapter};
use infraflow_core::ResourceKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_REGION: &str = "us-east-1";

/// AWS provider over a [`CloudApi`]
///
/// Every resource kind is supported. Asynchronous kinds are polled with the
/// configured [`PollConfig`] until ready.
pub struct AwsProvider {
    api: Arc<dyn CloudApi>,
    region: String,
    poll: PollConfig,
    abort: Option<CancellationToken>,
}

impl AwsProvider {
    pub fn new(api: Arc<dyn CloudApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
            poll: PollConfig::default(),
            abort: None,
        }
    }

    /// Provider backed by a sandbox account, persisted at `path` when given
    pub async fn sandbox(path: Option<PathBuf>, region: impl Into<String>) -> Result<Self> {
        let region = region.into();
        let api = match path {
            Some(path) => SandboxApi::open(path, region.clone()).await?,
            None => SandboxApi::new(region.clone()),
        };
        Ok(Self::new(Arc::new(api.with_env_faults()), region))
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Stop waiting for readiness when `abort` fires
    ///
    /// Keep this separate from the reconciler's cancellation token: a
    /// cancelled run lets in-flight operations finish and commit, while an
    /// aborted wait fails the operation with the object left in the account
    /// (adopted again by the next create).
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    async fn check_auth(&self) -> infraflow_cloud::Result<AuthStatus> {
        match self.api.caller_identity().await {
            Ok(identity) => {
                debug!(identity = %identity, region = %self.region, "Authenticated");
                Ok(AuthStatus::ok(format!("{identity} ({})", self.region)))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    fn adapter(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceAdapter>> {
        Some(Arc::new(AwsResourceAdapter::new(
            kind,
            Arc::clone(&self.api),
            self.poll.clone(),
            self.abort.clone(),
        )))
    }
}
