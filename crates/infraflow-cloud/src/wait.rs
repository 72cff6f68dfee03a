//! Waiting for asynchronously provisioned resources
//!
//! Load balancers, databases and services report success before they are
//! usable. Adapters poll them here with exponential backoff until they reach
//! their target status.

use crate::error::{ProviderError, ProviderResult};
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polling bounds
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Initial delay between checks
    pub initial_delay: Duration,
    /// Maximum delay between checks (cap for exponential growth)
    pub max_delay: Duration,
    /// Maximum total time to wait before timeout
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Poll `check` until it reports ready
///
/// `check` returns `Ok(true)` when `resource` has reached `target`. Errors
/// from `check` end the wait immediately. Exceeding `config.timeout` yields
/// [`ProviderError::ProvisioningTimeout`].
pub async fn poll_until_ready<F, Fut>(
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    resource: &str,
    target: &str,
    mut check: F,
) -> ProviderResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<bool>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    let mut delays = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .without_max_times()
        .build();

    loop {
        attempts += 1;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(ProviderError::Cancelled(format!("wait for {resource}")));
        }

        match check().await {
            Ok(true) => {
                debug!(resource = %resource, target = %target, attempts, "Resource ready");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                warn!(resource = %resource, error = %e, "Readiness check failed");
                return Err(e);
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            return Err(ProviderError::ProvisioningTimeout {
                resource: resource.to_string(),
                target: target.to_string(),
                waited_ms: elapsed.as_millis() as u64,
            });
        }

        let delay = delays
            .next()
            .unwrap_or(config.max_delay)
            .min(config.timeout - elapsed);
        debug!(
            resource = %resource,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Resource not ready, polling again"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                return Err(ProviderError::Cancelled(format!("wait for {resource}")));
            }
        }
    }
}
