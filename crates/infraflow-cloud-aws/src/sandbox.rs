//! Sandbox account
//!
//! An in-memory [`CloudApi`] that behaves like a small AWS account: ids are
//! assigned per kind, asynchronous kinds pass through their lifecycle while
//! being polled, objects that are still referenced refuse deletion. The
//! account can be persisted to a JSON file so that separate CLI runs see the
//! same infrastructure.
//!
//! Faults can be injected per logical name, either through the builder
//! methods or through the environment:
//!
//! - `INFRAFLOW_SANDBOX_THROTTLE=sg1:2,alb1:1` fails the next N mutations
//!   with a throttling error
//! - `INFRAFLOW_SANDBOX_DENY=sg1` rejects every mutation with access denied
//! - `INFRAFLOW_SANDBOX_READINESS_POLLS=3` keeps asynchronous kinds in their
//!   initial status for that many polls

use crate::api::{CloudApi, CloudObject, lifecycle};
use crate::error::{AwsError, Result, classify_aws_error};
use async_trait::async_trait;
use infraflow_core::{AttrValue, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default location of the persisted account, relative to the project root
pub const SANDBOX_FILE: &str = ".infraflow/sandbox.json";

const ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SandboxAccount {
    next_id: u64,
    objects: BTreeMap<String, CloudObject>,
    /// Remaining polls before an object reaches its ready status
    #[serde(default)]
    pending_polls: BTreeMap<String, u32>,
}

#[derive(Debug, Default)]
struct Faults {
    throttle: HashMap<String, u32>,
    deny: HashSet<String>,
    readiness_polls: u32,
}

/// In-memory account implementing [`CloudApi`]
#[derive(Debug)]
pub struct SandboxApi {
    region: String,
    account: Mutex<SandboxAccount>,
    faults: Mutex<Faults>,
    path: Option<PathBuf>,
}

impl SandboxApi {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: Mutex::new(SandboxAccount::default()),
            faults: Mutex::new(Faults::default()),
            path: None,
        }
    }

    /// Open an account persisted at `path`, starting empty when the file
    /// does not exist yet
    pub async fn open(path: impl Into<PathBuf>, region: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let account = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            SandboxAccount::default()
        };
        debug!(path = %path.display(), objects = account.objects.len(), "Opened sandbox account");
        Ok(Self {
            region: region.into(),
            account: Mutex::new(account),
            faults: Mutex::new(Faults::default()),
            path: Some(path),
        })
    }

    /// Fail the next `times` mutations of `name` with a throttling error
    pub fn fail_transiently(mut self, name: impl Into<String>, times: u32) -> Self {
        self.faults.get_mut().throttle.insert(name.into(), times);
        self
    }

    /// Reject every mutation of `name` with access denied
    pub fn deny(mut self, name: impl Into<String>) -> Self {
        self.faults.get_mut().deny.insert(name.into());
        self
    }

    /// Keep asynchronous kinds in their initial status for `polls` reads
    pub fn with_readiness_polls(mut self, polls: u32) -> Self {
        self.faults.get_mut().readiness_polls = polls;
        self
    }

    /// Apply the `INFRAFLOW_SANDBOX_*` fault variables
    pub fn with_env_faults(mut self) -> Self {
        if let Ok(value) = std::env::var("INFRAFLOW_SANDBOX_DENY") {
            for name in split_list(&value) {
                self = self.deny(name);
            }
        }
        if let Ok(value) = std::env::var("INFRAFLOW_SANDBOX_THROTTLE") {
            for entry in split_list(&value) {
                let (name, times) = match entry.split_once(':') {
                    Some((name, times)) => match times.parse() {
                        Ok(times) => (name, times),
                        Err(_) => {
                            warn!(entry = %entry, "Ignoring malformed throttle fault");
                            continue;
                        }
                    },
                    None => (entry, 1),
                };
                self = self.fail_transiently(name, times);
            }
        }
        if let Ok(value) = std::env::var("INFRAFLOW_SANDBOX_READINESS_POLLS") {
            match value.trim().parse() {
                Ok(polls) => self = self.with_readiness_polls(polls),
                Err(_) => warn!(value = %value, "Ignoring malformed readiness poll count"),
            }
        }
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of every object, ordered by id
    pub async fn objects(&self) -> Vec<CloudObject> {
        self.account.lock().await.objects.values().cloned().collect()
    }

    /// Remove an object behind the engine's back
    pub async fn remove_out_of_band(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let mut account = self.account.lock().await;
        let Some(id) = find_id(&account, kind, name) else {
            return Ok(false);
        };
        account.objects.remove(&id);
        account.pending_polls.remove(&id);
        self.save(&account).await?;
        Ok(true)
    }

    /// Change one attribute behind the engine's back
    pub async fn set_out_of_band(
        &self,
        kind: ResourceKind,
        name: &str,
        key: &str,
        value: AttrValue,
    ) -> Result<bool> {
        let mut account = self.account.lock().await;
        let Some(id) = find_id(&account, kind, name) else {
            return Ok(false);
        };
        if let Some(object) = account.objects.get_mut(&id) {
            object.attributes.insert(key.to_string(), value);
        }
        self.save(&account).await?;
        Ok(true)
    }

    async fn check_faults(&self, name: &str) -> Result<()> {
        let mut faults = self.faults.lock().await;
        if faults.deny.contains(name) {
            return Err(classify_aws_error(
                Some("AccessDenied"),
                Some(&format!("not authorized to modify '{name}'")),
            ));
        }
        if let Some(remaining) = faults.throttle.get_mut(name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(classify_aws_error(
                Some("Throttling"),
                Some(&format!("rate exceeded while modifying '{name}'")),
            ));
        }
        Ok(())
    }

    async fn save(&self, account: &SandboxAccount) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(account)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    fn outputs(&self, kind: ResourceKind, name: &str, id: &str) -> BTreeMap<String, String> {
        let region = &self.region;
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "arn".to_string(),
            format!("arn:aws:{}:{region}:{ACCOUNT_ID}:{}/{name}", service(kind), kind),
        );
        match kind {
            ResourceKind::LoadBalancer => {
                outputs.insert(
                    "dns_name".to_string(),
                    format!("{name}-{}.{region}.elb.amazonaws.com", id_suffix(id)),
                );
            }
            ResourceKind::RdsInstance => {
                outputs.insert(
                    "endpoint".to_string(),
                    format!("{name}.{}.{region}.rds.amazonaws.com", id_suffix(id)),
                );
            }
            ResourceKind::S3Bucket => {
                outputs.insert("bucket_domain_name".to_string(), format!("{name}.s3.amazonaws.com"));
            }
            _ => {}
        }
        outputs
    }
}

#[async_trait]
impl CloudApi for SandboxApi {
    async fn caller_identity(&self) -> Result<String> {
        Ok(format!("arn:aws:iam::{ACCOUNT_ID}:user/sandbox"))
    }

    async fn create_object(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<CloudObject> {
        self.check_faults(name).await?;
        let readiness_polls = self.faults.lock().await.readiness_polls;

        let mut account = self.account.lock().await;
        if find_id(&account, kind, name).is_some() {
            return Err(classify_aws_error(
                Some("ResourceAlreadyExistsException"),
                Some(&format!("{kind} '{name}' already exists")),
            ));
        }
        account.next_id += 1;
        let id = format!("{}-{:08x}", id_prefix(kind), account.next_id);
        let stages = lifecycle(kind);
        let object = CloudObject {
            id: id.clone(),
            kind,
            name: name.to_string(),
            attributes,
            status: stages.initial.to_string(),
            outputs: self.outputs(kind, name, &id),
        };
        if stages.is_async() {
            account.pending_polls.insert(id.clone(), readiness_polls);
        }
        account.objects.insert(id.clone(), object.clone());
        self.save(&account).await?;
        debug!(kind = %kind, name = %name, id = %id, "Sandbox object created");
        Ok(object)
    }

    async fn update_object(
        &self,
        kind: ResourceKind,
        id: &str,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<CloudObject> {
        let name = {
            let account = self.account.lock().await;
            lookup(&account, kind, id)?.name.clone()
        };
        self.check_faults(&name).await?;
        let readiness_polls = self.faults.lock().await.readiness_polls;

        let mut account = self.account.lock().await;
        let stages = lifecycle(kind);
        let updated = {
            let object = account
                .objects
                .get_mut(id)
                .ok_or_else(|| not_found(kind, id))?;
            object.attributes = attributes;
            if stages.is_async() {
                object.status = stages.initial.to_string();
            }
            object.clone()
        };
        if stages.is_async() {
            account.pending_polls.insert(id.to_string(), readiness_polls);
        }
        self.save(&account).await?;
        debug!(kind = %kind, id = %id, "Sandbox object updated");
        Ok(updated)
    }

    async fn delete_object(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let name = {
            let account = self.account.lock().await;
            lookup(&account, kind, id)?.name.clone()
        };
        self.check_faults(&name).await?;

        let mut account = self.account.lock().await;
        if let Some(user) = account
            .objects
            .values()
            .find(|o| o.attributes.values().any(|v| v.references().contains(&id)))
        {
            return Err(classify_aws_error(
                Some("DependencyViolation"),
                Some(&format!("'{name}' is still used by '{}'", user.name)),
            ));
        }
        if account.objects.remove(id).is_none() {
            return Err(not_found(kind, id));
        }
        account.pending_polls.remove(id);
        self.save(&account).await?;
        debug!(kind = %kind, id = %id, "Sandbox object deleted");
        Ok(())
    }

    async fn find_object(&self, kind: ResourceKind, name: &str) -> Result<Option<CloudObject>> {
        let account = self.account.lock().await;
        Ok(find_id(&account, kind, name).and_then(|id| account.objects.get(&id).cloned()))
    }

    async fn get_object(&self, kind: ResourceKind, id: &str) -> Result<CloudObject> {
        let mut account = self.account.lock().await;
        lookup(&account, kind, id)?;

        let ready = lifecycle(kind).ready;
        let remaining = account.pending_polls.get(id).copied();
        match remaining {
            Some(0) => {
                account.pending_polls.remove(id);
                if let Some(object) = account.objects.get_mut(id) {
                    object.status = ready.to_string();
                }
                self.save(&account).await?;
            }
            Some(n) => {
                account.pending_polls.insert(id.to_string(), n - 1);
            }
            None => {}
        }
        lookup(&account, kind, id).cloned()
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn find_id(account: &SandboxAccount, kind: ResourceKind, name: &str) -> Option<String> {
    account
        .objects
        .values()
        .find(|o| o.kind == kind && o.name == name)
        .map(|o| o.id.clone())
}

fn lookup<'a>(account: &'a SandboxAccount, kind: ResourceKind, id: &str) -> Result<&'a CloudObject> {
    account
        .objects
        .get(id)
        .filter(|o| o.kind == kind)
        .ok_or_else(|| not_found(kind, id))
}

fn not_found(kind: ResourceKind, id: &str) -> AwsError {
    AwsError::NotFound {
        resource_type: kind.as_str(),
        resource_id: id.to_string(),
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Vpc => "vpc",
        ResourceKind::Subnet => "subnet",
        ResourceKind::SecurityGroup => "sg",
        ResourceKind::LoadBalancer => "lb",
        ResourceKind::Listener => "listener",
        ResourceKind::TargetGroup => "tg",
        ResourceKind::EcsCluster => "cluster",
        ResourceKind::EcsService => "svc",
        ResourceKind::TaskDefinition => "taskdef",
        ResourceKind::S3Bucket => "bucket",
        ResourceKind::RdsInstance => "db",
        ResourceKind::Pipeline => "pipeline",
        ResourceKind::Alarm => "alarm",
        ResourceKind::LogGroup => "log",
    }
}

fn service(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Vpc | ResourceKind::Subnet | ResourceKind::SecurityGroup => "ec2",
        ResourceKind::LoadBalancer | ResourceKind::Listener | ResourceKind::TargetGroup => {
            "elasticloadbalancing"
        }
        ResourceKind::EcsCluster | ResourceKind::EcsService | ResourceKind::TaskDefinition => "ecs",
        ResourceKind::S3Bucket => "s3",
        ResourceKind::RdsInstance => "rds",
        ResourceKind::Pipeline => "codepipeline",
        ResourceKind::Alarm => "cloudwatch",
        ResourceKind::LogGroup => "logs",
    }
}

fn id_suffix(id: &str) -> &str {
    id.rsplit('-').next().unwrap_or(id)
}
