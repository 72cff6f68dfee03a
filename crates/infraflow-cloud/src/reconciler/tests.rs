use super::*;
use crate::provider::{AuthStatus, ObservedResource};
use crate::state::MemoryStateStore;
use async_trait::async_trait;
use infraflow_core::AttrValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider whose adapters keep live objects in memory
///
/// Every create/update checks that the dependencies of the spec are already
/// committed in the state store; violations are collected. Deleting an
/// object another live object references fails like a dependency violation.
struct FakeProvider {
    store: Arc<dyn StateStore>,
    live: Mutex<BTreeMap<String, ObservedResource>>,
    transient_failures: Mutex<HashMap<String, u32>>,
    denied: BTreeSet<String>,
    call_delay: Duration,
    calls: Mutex<Vec<(String, ActionType, Instant)>>,
    violations: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeProvider {
    fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            live: Mutex::new(BTreeMap::new()),
            transient_failures: Mutex::new(HashMap::new()),
            denied: BTreeSet::new(),
            call_delay: Duration::from_millis(5),
            calls: Mutex::new(Vec::new()),
            violations: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
        }
    }

    fn fail_transiently(self, name: &str, times: u32) -> Self {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
        self
    }

    fn deny(mut self, name: &str) -> Self {
        self.denied.insert(name.to_string());
        self
    }

    fn cancel_after(self, name: &str, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((name.to_string(), token));
        self
    }

    fn calls_for(&self, name: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, _, at)| *at)
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn deleted_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, action, _)| *action == ActionType::Delete)
            .map(|(n, _, _)| n.clone())
            .collect()
    }

    async fn call(&self, name: &str, action: ActionType) -> ProviderResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), action, Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.call_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((target, token)) = self.cancel_after.lock().unwrap().as_ref()
            && target == name
        {
            token.cancel();
        }

        if self.denied.contains(name) {
            return Err(ProviderError::Permission(format!("not allowed to manage {name}")));
        }
        let mut failures = self.transient_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ProviderError::Transient("Throttling: rate exceeded".into()));
        }
        Ok(())
    }

    async fn check_dependencies_committed(&self, spec: &ResourceSpec) {
        for dep in spec.dependencies() {
            if self.store.get(&dep).await.ok().flatten().is_none() {
                self.violations
                    .lock()
                    .unwrap()
                    .push(format!("{} started before {dep} was committed", spec.name));
            }
        }
    }

    fn observe(&self, spec: &ResourceSpec) -> ProvisionedResource {
        let provider_id = format!("{}-{}", spec.kind, spec.name);
        self.live.lock().unwrap().insert(
            spec.name.clone(),
            ObservedResource {
                provider_id: provider_id.clone(),
                attributes: spec.normalized(),
                outputs: BTreeMap::new(),
            },
        );
        ProvisionedResource::new(provider_id)
    }
}

struct FakeAdapter {
    kind: ResourceKind,
    provider: Arc<FakeProvider>,
}

#[async_trait]
impl ResourceAdapter for FakeAdapter {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn create(&self, spec: &ResourceSpec) -> ProviderResult<ProvisionedResource> {
        self.provider.check_dependencies_committed(spec).await;
        self.provider.call(&spec.name, ActionType::Create).await?;
        Ok(self.provider.observe(spec))
    }

    async fn update(
        &self,
        spec: &ResourceSpec,
        _current: &AppliedState,
    ) -> ProviderResult<ProvisionedResource> {
        self.provider.check_dependencies_committed(spec).await;
        self.provider.call(&spec.name, ActionType::Update).await?;
        Ok(self.provider.observe(spec))
    }

    async fn delete(&self, current: &AppliedState) -> ProviderResult<()> {
        self.provider.call(&current.name, ActionType::Delete).await?;
        let mut live = self.provider.live.lock().unwrap();
        if let Some((user, _)) = live.iter().find(|(name, object)| {
            **name != current.name
                && object
                    .attributes
                    .values()
                    .any(|value| value.references().contains(&current.name.as_str()))
        }) {
            return Err(ProviderError::Transient(format!(
                "DependencyViolation: '{}' is still used by '{user}'",
                current.name
            )));
        }
        live.remove(&current.name);
        Ok(())
    }

    async fn describe(&self, name: &str) -> ProviderResult<Option<ObservedResource>> {
        Ok(self.provider.live.lock().unwrap().get(name).cloned())
    }
}

/// Wrapper so the same fake can be shared between the test and the reconciler
struct SharedFake(Arc<FakeProvider>);

#[async_trait]
impl CloudProvider for SharedFake {
    fn name(&self) -> &str {
        "fake"
    }

    fn display_name(&self) -> &str {
        "Fake"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("test"))
    }

    fn adapter(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceAdapter>> {
        if kind == ResourceKind::Pipeline {
            return None;
        }
        Some(Arc::new(FakeAdapter {
            kind,
            provider: self.0.clone(),
        }))
    }
}

fn web_stack() -> DesiredState {
    let mut desired = DesiredState::new("web");
    desired.add(
        ResourceSpec::new(ResourceKind::Vpc, "v1")
            .with_attr("cidr_block", AttrValue::string("10.0.0.0/16")),
    );
    desired.add(
        ResourceSpec::new(ResourceKind::Subnet, "s1")
            .with_attr("vpc", AttrValue::reference("v1"))
            .with_attr("cidr_block", AttrValue::string("10.0.1.0/24"))
            .with_attr("availability_zone", AttrValue::string("us-east-1a")),
    );
    desired.add(
        ResourceSpec::new(ResourceKind::SecurityGroup, "sg1")
            .with_attr("vpc", AttrValue::reference("v1"))
            .with_attr("ingress", AttrValue::set(["tcp:443:0.0.0.0/0"])),
    );
    desired.add(
        ResourceSpec::new(ResourceKind::LoadBalancer, "alb1")
            .with_attr("subnets", AttrValue::refs(["s1"]))
            .with_attr("security_groups", AttrValue::refs(["sg1"])),
    );
    desired
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        backoff_multiplier: 2.0,
    }
}

struct Harness {
    fake: Arc<FakeProvider>,
    store: Arc<MemoryStateStore>,
    reconciler: Reconciler,
}

fn harness(configure: impl FnOnce(FakeProvider) -> FakeProvider) -> Harness {
    harness_with(ReconcilerConfig {
        max_parallel: 4,
        retry: fast_retry(),
    }, configure)
}

fn harness_with(
    config: ReconcilerConfig,
    configure: impl FnOnce(FakeProvider) -> FakeProvider,
) -> Harness {
    let store = Arc::new(MemoryStateStore::new());
    let fake = Arc::new(configure(FakeProvider::new(store.clone())));
    let reconciler =
        Reconciler::new(Arc::new(SharedFake(fake.clone())), store.clone()).with_config(config);
    Harness {
        fake,
        store,
        reconciler,
    }
}

fn seq(report: &RunReport, name: &str, status: OperationStatus) -> u64 {
    report
        .event_seq(name, status)
        .unwrap_or_else(|| panic!("no {status} event for {name}"))
}

#[tokio::test]
async fn test_fresh_apply_runs_in_dependency_order() {
    let h = harness(|f| f);
    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.exit_code(), 0);

    let v1_done = seq(&report, "v1", OperationStatus::Succeeded);
    assert!(v1_done < seq(&report, "s1", OperationStatus::InProgress));
    assert!(v1_done < seq(&report, "sg1", OperationStatus::InProgress));
    let alb_start = seq(&report, "alb1", OperationStatus::InProgress);
    assert!(seq(&report, "s1", OperationStatus::Succeeded) < alb_start);
    assert!(seq(&report, "sg1", OperationStatus::Succeeded) < alb_start);

    // s1 and sg1 are independent and run side by side
    assert!(seq(&report, "sg1", OperationStatus::InProgress) < seq(&report, "s1", OperationStatus::Succeeded));
    assert!(h.fake.max_in_flight.load(Ordering::SeqCst) >= 2);

    assert!(h.fake.violations.lock().unwrap().is_empty());
    assert_eq!(h.store.list().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_apply_converges_and_second_plan_is_noop() {
    let h = harness(|f| f);
    let desired = web_stack();
    h.reconciler.reconcile(&desired).await.unwrap();

    for spec in &desired.resources {
        let record = h.store.get(&spec.name).await.unwrap().unwrap();
        assert_eq!(record.attributes, spec.normalized());
        assert_eq!(record.revision, 1);
    }

    let second = h.reconciler.plan(&desired).await.unwrap();
    assert!(!second.has_changes);
    assert_eq!(second.summary().no_change, 4);

    let calls_before = h.fake.call_count();
    let report = h.reconciler.apply(&second).await;
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.with_status(OperationStatus::NoOp).len(), 4);
    assert_eq!(h.fake.call_count(), calls_before);
}

#[tokio::test]
async fn test_transient_errors_are_retried_with_backoff() {
    let h = harness(|f| f.fail_transiently("sg1", 2));
    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    let sg = report.get("sg1").unwrap();
    assert_eq!(sg.status, OperationStatus::Succeeded);
    assert_eq!(sg.attempts, 3);

    let calls = h.fake.calls_for("sg1");
    assert_eq!(calls.len(), 3);
    let retry = fast_retry();
    assert!(calls[1] - calls[0] >= retry.initial_delay);
    assert!(calls[2] - calls[1] >= retry.initial_delay);
    assert!(calls[2] - calls[0] >= retry.initial_delay * 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let h = harness(|f| f.fail_transiently("v1", 10));
    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();

    let v1 = report.get("v1").unwrap();
    assert_eq!(v1.status, OperationStatus::Failed);
    assert_eq!(v1.attempts, 3);
    assert!(v1.error.as_deref().unwrap().contains("Throttling"));
    assert_eq!(report.with_status(OperationStatus::Skipped).len(), 3);
}

#[tokio::test]
async fn test_permission_error_skips_dependents() {
    let h = harness(|f| f.deny("sg1"));
    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.exit_code(), 1);

    let sg = report.get("sg1").unwrap();
    assert_eq!(sg.status, OperationStatus::Failed);
    assert_eq!(sg.attempts, 1);
    assert!(sg.error.as_deref().unwrap().contains("permission denied"));

    let alb = report.get("alb1").unwrap();
    assert_eq!(alb.status, OperationStatus::Skipped);
    assert_eq!(alb.attempts, 0);
    assert!(h.fake.calls_for("alb1").is_empty());

    assert_eq!(report.get("v1").unwrap().status, OperationStatus::Succeeded);
    assert_eq!(report.get("s1").unwrap().status, OperationStatus::Succeeded);

    let names: Vec<String> = h
        .store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["s1", "v1"]);
}

#[tokio::test]
async fn test_orphans_are_deleted_dependents_first() {
    let h = harness(|f| f);
    h.reconciler.reconcile(&web_stack()).await.unwrap();

    let mut shrunk = DesiredState::new("web");
    shrunk.add(web_stack().get("v1").unwrap().clone());
    let report = h.reconciler.reconcile(&shrunk).await.unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    let alb_deleted = seq(&report, "alb1", OperationStatus::Succeeded);
    assert!(alb_deleted < seq(&report, "s1", OperationStatus::InProgress));
    assert!(alb_deleted < seq(&report, "sg1", OperationStatus::InProgress));

    let deleted = h.fake.deleted_order();
    assert_eq!(deleted[0], "alb1");
    assert_eq!(deleted.len(), 3);

    let remaining = h.store.list().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "v1");
}

#[tokio::test]
async fn test_swapping_a_subnet_deletes_the_old_one_after_the_update() {
    let h = harness(|f| f);
    h.reconciler.reconcile(&web_stack()).await.unwrap();

    let mut swapped = web_stack();
    swapped.resources.retain(|spec| spec.name != "s1");
    swapped.add(
        ResourceSpec::new(ResourceKind::Subnet, "s2")
            .with_attr("vpc", AttrValue::reference("v1"))
            .with_attr("cidr_block", AttrValue::string("10.0.2.0/24"))
            .with_attr("availability_zone", AttrValue::string("us-east-1b")),
    );
    let alb = swapped.resources.iter_mut().find(|s| s.name == "alb1").unwrap();
    *alb = alb.clone().with_attr("subnets", AttrValue::refs(["s2"]));

    let report = h.reconciler.reconcile(&swapped).await.unwrap();
    assert_eq!(report.status, RunStatus::Succeeded);

    let s1 = report.get("s1").unwrap();
    assert_eq!(s1.status, OperationStatus::Succeeded);
    assert_eq!(s1.attempts, 1);
    assert!(
        seq(&report, "alb1", OperationStatus::Succeeded)
            < seq(&report, "s1", OperationStatus::InProgress)
    );
    assert!(
        seq(&report, "s2", OperationStatus::Succeeded)
            < seq(&report, "alb1", OperationStatus::InProgress)
    );

    assert!(h.store.get("s1").await.unwrap().is_none());
    assert!(h.store.get("s2").await.unwrap().is_some());
    assert!(h.fake.violations.lock().unwrap().is_empty());
    assert!(!h.reconciler.plan(&swapped).await.unwrap().has_changes);
}

#[tokio::test]
async fn test_destroy_removes_everything_in_reverse_order() {
    let h = harness(|f| f);
    h.reconciler.reconcile(&web_stack()).await.unwrap();

    let report = h.reconciler.destroy().await.unwrap();
    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(h.store.list().await.unwrap().is_empty());

    let deleted = h.fake.deleted_order();
    assert_eq!(deleted.first().map(String::as_str), Some("alb1"));
    assert_eq!(deleted.last().map(String::as_str), Some("v1"));
}

#[tokio::test]
async fn test_update_bumps_revision() {
    let h = harness(|f| f);
    let mut desired = web_stack();
    h.reconciler.reconcile(&desired).await.unwrap();

    desired.resources[2] = desired.resources[2]
        .clone()
        .with_attr("ingress", AttrValue::set(["tcp:443:0.0.0.0/0", "tcp:80:0.0.0.0/0"]));
    let change_set = h.reconciler.plan(&desired).await.unwrap();
    assert_eq!(change_set.summary().update, 1);

    let report = h.reconciler.apply(&change_set).await;
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(h.store.get("sg1").await.unwrap().unwrap().revision, 2);
}

#[tokio::test]
async fn test_max_parallel_one_runs_sequentially() {
    let h = harness_with(
        ReconcilerConfig {
            max_parallel: 1,
            retry: fast_retry(),
        },
        |f| f,
    );
    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(h.fake.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_skips_everything() {
    let h = harness(|f| f);
    h.reconciler.cancellation_token().cancel();
    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.with_status(OperationStatus::Skipped).len(), 4);
    assert_eq!(h.fake.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_lets_in_flight_work_commit() {
    let token = CancellationToken::new();
    let h = harness({
        let token = token.clone();
        move |f| f.cancel_after("v1", token)
    });
    let reconciler = h.reconciler.with_cancellation(token);
    let report = reconciler.reconcile(&web_stack()).await.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.get("v1").unwrap().status, OperationStatus::Succeeded);
    assert!(h.store.get("v1").await.unwrap().is_some());
    for name in ["s1", "sg1", "alb1"] {
        assert_eq!(report.get(name).unwrap().status, OperationStatus::Skipped);
    }
}

#[tokio::test]
async fn test_cancel_during_backoff_fails_the_operation() {
    let h = harness_with(
        ReconcilerConfig {
            max_parallel: 4,
            retry: RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(60),
                backoff_multiplier: 2.0,
            },
        },
        |f| f.fail_transiently("v1", 1),
    );
    let token = h.reconciler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let report = h.reconciler.reconcile(&web_stack()).await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    let v1 = report.get("v1").unwrap();
    assert_eq!(v1.status, OperationStatus::Failed);
    assert!(v1.error.as_deref().unwrap().contains("cancelled"));
    assert!(h.store.get("v1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_state_conflict_fails_operation() {
    let h = harness(|f| f);
    let change_set = h.reconciler.plan(&web_stack()).await.unwrap();

    // Someone else committed v1 after the plan was made
    let v1 = web_stack().get("v1").unwrap().clone();
    h.store
        .put(AppliedState::from_spec(&v1, "other", BTreeMap::new(), 0))
        .await
        .unwrap();

    let report = h.reconciler.apply(&change_set).await;
    assert_eq!(report.status, RunStatus::PartialFailure);
    let v1 = report.get("v1").unwrap();
    assert_eq!(v1.status, OperationStatus::Failed);
    assert!(v1.error.as_deref().unwrap().contains("State conflict"));
    assert_eq!(report.get("alb1").unwrap().status, OperationStatus::Skipped);
}

#[tokio::test]
async fn test_missing_adapter_fails_operation() {
    let h = harness(|f| f);
    let mut desired = DesiredState::new("ci");
    desired.add(
        ResourceSpec::new(ResourceKind::Pipeline, "deploy")
            .with_attr("source_repo", AttrValue::string("github.com/shop/web"))
            .with_attr("build_image", AttrValue::string("rust:1")),
    );
    let report = h.reconciler.reconcile(&desired).await.unwrap();
    let deploy = report.get("deploy").unwrap();
    assert_eq!(deploy.status, OperationStatus::Failed);
    assert!(deploy.error.as_deref().unwrap().contains("no adapter"));
}

#[tokio::test]
async fn test_invalid_desired_state_is_rejected_before_any_call() {
    let h = harness(|f| f);
    let mut desired = web_stack();
    desired.add(ResourceSpec::new(ResourceKind::Subnet, "s2").with_attr("vpc", AttrValue::reference("nope")));
    let result = h.reconciler.reconcile(&desired).await;
    assert!(matches!(result, Err(ref e) if e.is_input_error()));
    assert_eq!(h.fake.call_count(), 0);
}

#[tokio::test]
async fn test_refresh_detects_drift() {
    let h = harness(|f| f);
    let desired = web_stack();
    h.reconciler.reconcile(&desired).await.unwrap();

    h.fake.live.lock().unwrap().remove("alb1");
    h.fake
        .live
        .lock()
        .unwrap()
        .get_mut("sg1")
        .unwrap()
        .attributes
        .insert("ingress".into(), AttrValue::set(["tcp:22:0.0.0.0/0"]));

    let drift = h.reconciler.refresh().await.unwrap();
    assert!(drift.has_drift());
    assert_eq!(drift.get("alb1"), Some(&Drift::Deleted));
    assert!(matches!(drift.get("sg1"), Some(Drift::Changed(changes)) if changes[0].attribute == "ingress"));
    assert_eq!(drift.get("v1"), Some(&Drift::InSync));

    let change_set = h.reconciler.plan(&desired).await.unwrap();
    assert_eq!(change_set.get("alb1").unwrap().action, ActionType::Create);
    assert_eq!(change_set.get("sg1").unwrap().action, ActionType::Update);

    let report = h.reconciler.apply(&change_set).await;
    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(!h.reconciler.plan(&desired).await.unwrap().has_changes);
}
