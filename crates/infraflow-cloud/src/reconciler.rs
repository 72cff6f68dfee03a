//! Reconciler
//!
//! Executes a [`ChangeSet`] against a provider. Independent branches of the
//! dependency graph run in parallel (bounded by `max_parallel`); an operation
//! starts only after every operation it waits on has committed its state.

use crate::action::{
    ActionType, AttrChange, ChangeSet, Operation, OperationResult, OperationStatus, RunEvent,
    RunReport, RunStatus,
};
use crate::diff::{compare_attributes, destroy_all, diff};
use crate::error::{CloudError, ProviderError, ProviderResult, Result};
use crate::provider::{CloudProvider, ProvisionedResource, ResourceAdapter, RetryConfig};
use crate::state::{AppliedState, StateStore};
use chrono::{DateTime, Utc};
use infraflow_core::{DesiredState, ResourceKind, ResourceSpec, validate_all};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_PARALLEL: usize = 4;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on concurrently running operations
    pub max_parallel: usize,
    pub retry: RetryConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            retry: RetryConfig::default(),
        }
    }
}

pub struct Reconciler {
    provider: Arc<dyn CloudProvider>,
    store: Arc<dyn StateStore>,
    config: ReconcilerConfig,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn CloudProvider>, store: Arc<dyn StateStore>) -> Self {
        Self {
            provider,
            store,
            config: ReconcilerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the current run from starting new operations
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate `desired` and diff it against the stored state
    pub async fn plan(&self, desired: &DesiredState) -> Result<ChangeSet> {
        validate_all(desired)?;
        let applied = self.store.list().await?;
        diff(desired, &applied)
    }

    /// Change set that deletes every applied resource
    pub async fn plan_destroy(&self) -> Result<ChangeSet> {
        let applied = self.store.list().await?;
        destroy_all(&applied)
    }

    /// Plan and apply in one go
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<RunReport> {
        let change_set = self.plan(desired).await?;
        Ok(self.apply(&change_set).await)
    }

    pub async fn destroy(&self) -> Result<RunReport> {
        let change_set = self.plan_destroy().await?;
        Ok(self.apply(&change_set).await)
    }

    /// Execute a change set
    ///
    /// Failures are scoped to the failing operation and everything waiting on
    /// it; the rest of the change set still runs. Succeeded work is never
    /// rolled back.
    pub async fn apply(&self, change_set: &ChangeSet) -> RunReport {
        let started = Instant::now();
        let mut tracker = RunTracker::new(change_set);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut tasks: JoinSet<OperationOutcome> = JoinSet::new();
        let mut running: HashMap<Id, String> = HashMap::new();

        info!(
            operations = change_set.len(),
            max_parallel = self.config.max_parallel,
            "Applying change set"
        );

        loop {
            self.schedule(change_set, &mut tracker, &semaphore, &mut tasks, &mut running);

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            match joined {
                Ok((id, outcome)) => {
                    running.remove(&id);
                    tracker.finish(outcome);
                }
                Err(join_error) => {
                    if let Some(name) = running.remove(&join_error.id()) {
                        tracker.finish(OperationOutcome {
                            name,
                            status: OperationStatus::Failed,
                            attempts: 0,
                            error: Some(format!("operation task aborted: {join_error}")),
                            finished_at: Utc::now(),
                        });
                    }
                }
            }
        }

        let report = tracker.into_report(self.cancel.is_cancelled(), started);
        info!(status = %report.status, duration_ms = report.duration_ms, "Run finished");
        report
    }

    /// Start every operation that is ready, settle no-ops and skips
    fn schedule(
        &self,
        change_set: &ChangeSet,
        tracker: &mut RunTracker,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<OperationOutcome>,
        running: &mut HashMap<Id, String>,
    ) {
        loop {
            let mut settled = false;

            for op in &change_set.operations {
                if tracker.status(&op.name) != Some(OperationStatus::Pending) {
                    continue;
                }

                if self.cancel.is_cancelled() {
                    tracker.settle(&op.name, OperationStatus::Skipped, Some("run cancelled".into()));
                    settled = true;
                    continue;
                }

                if let Some(blocker) = op
                    .waits_on
                    .iter()
                    .find(|dep| tracker.status(dep).is_some_and(|s| s.blocks_dependents()))
                {
                    tracker.settle(
                        &op.name,
                        OperationStatus::Skipped,
                        Some(format!("prerequisite '{blocker}' did not complete")),
                    );
                    settled = true;
                    continue;
                }

                let ready = op
                    .waits_on
                    .iter()
                    .all(|dep| tracker.status(dep).is_none_or(|s| s.releases_dependents()));
                if !ready {
                    continue;
                }

                if op.action == ActionType::NoOp {
                    tracker.settle(&op.name, OperationStatus::NoOp, None);
                    settled = true;
                    continue;
                }

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    continue;
                };
                tracker.start(&op.name);
                let handle = tasks.spawn(execute_operation(
                    op.clone(),
                    self.provider.clone(),
                    self.store.clone(),
                    self.config.retry.clone(),
                    self.cancel.clone(),
                    permit,
                ));
                running.insert(handle.id(), op.name.clone());
            }

            // A settled operation may have released or blocked later ones
            if !settled {
                break;
            }
        }
    }

    /// Compare applied records with what the provider reports
    ///
    /// Records of objects that are gone are removed; records whose live
    /// attributes differ take the observed attributes, so the next plan shows
    /// the update needed to restore the desired state.
    pub async fn refresh(&self) -> Result<DriftReport> {
        let mut report = DriftReport::default();

        for record in self.store.list().await? {
            let adapter = adapter_for(self.provider.as_ref(), record.kind)?;
            let mut attempts = 0;
            let observed = with_retry(
                &self.config.retry,
                &self.cancel,
                &record.name,
                &mut attempts,
                || adapter.describe(&record.name),
            )
            .await?;

            let drift = match observed {
                None => {
                    warn!(name = %record.name, "Resource deleted outside of InfraFlow");
                    self.store.delete(&record.name).await?;
                    Drift::Deleted
                }
                Some(observed) => {
                    let changes = compare_attributes(&record.attributes, &observed.attributes);
                    let outputs_changed = observed.outputs != record.outputs
                        || observed.provider_id != record.provider_id;
                    if changes.is_empty() && !outputs_changed {
                        Drift::InSync
                    } else {
                        if !changes.is_empty() {
                            warn!(name = %record.name, changes = changes.len(), "Resource drifted");
                        }
                        let updated = AppliedState {
                            attributes: observed.attributes,
                            outputs: observed.outputs,
                            provider_id: observed.provider_id,
                            ..record.clone()
                        };
                        self.store.put(updated).await?;
                        if changes.is_empty() {
                            Drift::InSync
                        } else {
                            Drift::Changed(changes)
                        }
                    }
                }
            };

            report.entries.push(DriftEntry {
                name: record.name,
                kind: record.kind,
                drift,
            });
        }

        Ok(report)
    }
}

fn adapter_for(
    provider: &dyn CloudProvider,
    kind: ResourceKind,
) -> Result<Arc<dyn ResourceAdapter>> {
    provider.adapter(kind).ok_or_else(|| CloudError::AdapterNotFound {
        provider: provider.name().to_string(),
        kind,
    })
}

struct OperationOutcome {
    name: String,
    status: OperationStatus,
    attempts: u32,
    error: Option<String>,
    finished_at: DateTime<Utc>,
}

async fn execute_operation(
    op: Operation,
    provider: Arc<dyn CloudProvider>,
    store: Arc<dyn StateStore>,
    retry: RetryConfig,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) -> OperationOutcome {
    let mut attempts = 0;
    let result = run_operation(
        &op,
        provider.as_ref(),
        store.as_ref(),
        &retry,
        &cancel,
        &mut attempts,
    )
    .await;

    let (status, error) = match result {
        Ok(()) => (OperationStatus::Succeeded, None),
        Err(e) => {
            warn!(name = %op.name, action = %op.action, error = %e, "Operation failed");
            (OperationStatus::Failed, Some(e.to_string()))
        }
    };

    OperationOutcome {
        name: op.name,
        status,
        attempts,
        error,
        finished_at: Utc::now(),
    }
}

/// Provider call with retries, then the state commit
async fn run_operation(
    op: &Operation,
    provider: &dyn CloudProvider,
    store: &dyn StateStore,
    retry: &RetryConfig,
    cancel: &CancellationToken,
    attempts: &mut u32,
) -> Result<()> {
    let adapter = adapter_for(provider, op.kind)?;

    match op.action {
        ActionType::Create => {
            let spec = op.desired.as_ref().ok_or_else(|| missing(op, "desired"))?;
            let provisioned =
                with_retry(retry, cancel, &op.name, attempts, || adapter.create(spec)).await?;
            commit(store, spec, provisioned, 0).await
        }
        ActionType::Update => {
            let spec = op.desired.as_ref().ok_or_else(|| missing(op, "desired"))?;
            let current = op.current.as_ref().ok_or_else(|| missing(op, "current"))?;
            let provisioned =
                with_retry(retry, cancel, &op.name, attempts, || adapter.update(spec, current))
                    .await?;
            commit(store, spec, provisioned, current.revision).await
        }
        ActionType::Delete => {
            let current = op.current.as_ref().ok_or_else(|| missing(op, "current"))?;
            let deleted =
                with_retry(retry, cancel, &op.name, attempts, || adapter.delete(current)).await;
            match deleted {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(name = %op.name, "Already deleted");
                }
                Err(e) => return Err(e.into()),
            }
            store.delete(&op.name).await
        }
        ActionType::NoOp => Ok(()),
    }
}

async fn commit(
    store: &dyn StateStore,
    spec: &ResourceSpec,
    provisioned: ProvisionedResource,
    revision: u64,
) -> Result<()> {
    let record =
        AppliedState::from_spec(spec, provisioned.provider_id, provisioned.outputs, revision);
    store.put(record).await?;
    Ok(())
}

fn missing(op: &Operation, what: &str) -> CloudError {
    CloudError::StateError(format!(
        "{} operation on '{}' has no {what} state",
        op.action, op.name
    ))
}

/// Call `f` until it succeeds, retrying transient errors with backoff
///
/// A cancellation during a backoff sleep ends the call with
/// [`ProviderError::Cancelled`].
async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    cancel: &CancellationToken,
    name: &str,
    attempts: &mut u32,
    mut f: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut backoff = retry.backoff();
    loop {
        *attempts += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                let Some(delay) = backoff.next() else {
                    return Err(e);
                };
                warn!(
                    name = %name,
                    attempt = *attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient provider error, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(ProviderError::Cancelled(format!(
                            "{name} cancelled during retry backoff"
                        )));
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bookkeeping for one run, owned by the scheduling loop
struct RunTracker {
    order: Vec<String>,
    results: HashMap<String, OperationResult>,
    events: Vec<RunEvent>,
    next_seq: u64,
}

impl RunTracker {
    fn new(change_set: &ChangeSet) -> Self {
        let results = change_set
            .operations
            .iter()
            .map(|op| {
                let result = OperationResult {
                    name: op.name.clone(),
                    kind: op.kind,
                    action: op.action,
                    status: OperationStatus::Pending,
                    attempts: 0,
                    error: None,
                    started_at: None,
                    finished_at: None,
                };
                (op.name.clone(), result)
            })
            .collect();
        Self {
            order: change_set.operations.iter().map(|op| op.name.clone()).collect(),
            results,
            events: Vec::new(),
            next_seq: 0,
        }
    }

    fn status(&self, name: &str) -> Option<OperationStatus> {
        self.results.get(name).map(|r| r.status)
    }

    fn record(&mut self, name: &str, status: OperationStatus) {
        if let Some(result) = self.results.get_mut(name) {
            result.status = status;
        }
        self.events.push(RunEvent {
            seq: self.next_seq,
            name: name.to_string(),
            status,
        });
        self.next_seq += 1;
        info!(name = %name, status = %status, "Operation status changed");
    }

    fn start(&mut self, name: &str) {
        if let Some(result) = self.results.get_mut(name) {
            result.started_at = Some(Utc::now());
        }
        self.record(name, OperationStatus::InProgress);
    }

    /// Final state reached without running the operation
    fn settle(&mut self, name: &str, status: OperationStatus, error: Option<String>) {
        if let Some(result) = self.results.get_mut(name) {
            result.error = error;
            result.finished_at = Some(Utc::now());
        }
        self.record(name, status);
    }

    fn finish(&mut self, outcome: OperationOutcome) {
        if let Some(result) = self.results.get_mut(&outcome.name) {
            result.attempts = outcome.attempts;
            result.error = outcome.error;
            result.finished_at = Some(outcome.finished_at);
        }
        self.record(&outcome.name, outcome.status);
    }

    fn into_report(mut self, cancelled: bool, started: Instant) -> RunReport {
        let leftover: Vec<String> = self
            .order
            .iter()
            .filter(|name| self.status(name).is_some_and(|s| !s.is_final()))
            .cloned()
            .collect();
        for name in leftover {
            self.settle(&name, OperationStatus::Skipped, Some("never became ready".into()));
        }

        let all_done = self
            .results
            .values()
            .all(|r| r.status.releases_dependents());
        let status = if all_done {
            RunStatus::Succeeded
        } else if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::PartialFailure
        };

        let mut results = self.results;
        let operations = self
            .order
            .iter()
            .filter_map(|name| results.remove(name))
            .collect();

        RunReport {
            status,
            operations,
            events: self.events,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// How an applied record compares with the live object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "drift", content = "changes", rename_all = "snake_case")]
pub enum Drift {
    InSync,
    /// The object no longer exists; the record was removed
    Deleted,
    /// Live attributes differ from the last applied ones
    Changed(Vec<AttrChange>),
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    pub name: String,
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub drift: Drift,
}

/// Result of a refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftReport {
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.entries.iter().any(|e| e.drift != Drift::InSync)
    }

    pub fn get(&self, name: &str) -> Option<&Drift> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.drift)
    }
}

#[cfg(test)]
mod tests;
