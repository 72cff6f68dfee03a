//! Resource adapters
//!
//! Every kind shares the same adapter; what differs per kind is described by
//! a [`KindBehavior`]: which attributes can only be set at creation time and
//! which provider-side checks apply on top of the schema.

mod delivery;
mod ecs;
mod load_balancing;
mod monitoring;
mod network;
mod storage;

use crate::api::{CloudApi, CloudObject, lifecycle};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use infraflow_cloud::{
    AppliedState, ObservedResource, PollConfig, ProviderError, ProviderResult, ProvisionedResource,
    ResourceAdapter, poll_until_ready,
};
use infraflow_core::{AttrType, AttrValue, ResourceKind, ResourceSpec};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-kind adapter behavior
#[derive(Debug)]
pub struct KindBehavior {
    pub kind: ResourceKind,
    /// Attributes that cannot change in place; changing one requires a new
    /// logical name
    pub immutable: &'static [&'static str],
    /// Provider-side checks beyond the schema
    pub check: fn(&ResourceSpec) -> Result<()>,
}

fn no_checks(_: &ResourceSpec) -> Result<()> {
    Ok(())
}

pub fn behavior(kind: ResourceKind) -> &'static KindBehavior {
    match kind {
        ResourceKind::Vpc => &network::VPC,
        ResourceKind::Subnet => &network::SUBNET,
        ResourceKind::SecurityGroup => &network::SECURITY_GROUP,
        ResourceKind::LoadBalancer => &load_balancing::LOAD_BALANCER,
        ResourceKind::Listener => &load_balancing::LISTENER,
        ResourceKind::TargetGroup => &load_balancing::TARGET_GROUP,
        ResourceKind::EcsCluster => &ecs::ECS_CLUSTER,
        ResourceKind::EcsService => &ecs::ECS_SERVICE,
        ResourceKind::TaskDefinition => &ecs::TASK_DEFINITION,
        ResourceKind::S3Bucket => &storage::S3_BUCKET,
        ResourceKind::RdsInstance => &storage::RDS_INSTANCE,
        ResourceKind::Pipeline => &delivery::PIPELINE,
        ResourceKind::Alarm => &monitoring::ALARM,
        ResourceKind::LogGroup => &monitoring::LOG_GROUP,
    }
}

/// Adapter for one resource kind over a [`CloudApi`]
pub struct AwsResourceAdapter {
    behavior: &'static KindBehavior,
    api: Arc<dyn CloudApi>,
    poll: PollConfig,
    /// Interrupts readiness polling
    abort: Option<CancellationToken>,
}

impl AwsResourceAdapter {
    pub fn new(
        kind: ResourceKind,
        api: Arc<dyn CloudApi>,
        poll: PollConfig,
        abort: Option<CancellationToken>,
    ) -> Self {
        Self {
            behavior: behavior(kind),
            api,
            poll,
            abort,
        }
    }

    /// Normalized attributes with references replaced by provider ids
    async fn resolve(&self, spec: &ResourceSpec) -> Result<BTreeMap<String, AttrValue>> {
        let mut attributes = spec.normalized();
        for (key, value) in attributes.iter_mut() {
            let Some(target) = ref_kind(spec.kind, key) else {
                continue;
            };
            *value = match &*value {
                AttrValue::Ref(name) => AttrValue::Ref(self.provider_id(target, name).await?),
                AttrValue::Refs(names) => {
                    let mut ids = BTreeSet::new();
                    for name in names.iter() {
                        ids.insert(self.provider_id(target, name).await?);
                    }
                    AttrValue::Refs(ids)
                }
                _ => continue,
            };
        }
        Ok(attributes)
    }

    /// Inverse of [`resolve`](Self::resolve). Ids that no longer exist are
    /// kept as they are so the difference shows up.
    async fn unresolve(
        &self,
        mut attributes: BTreeMap<String, AttrValue>,
    ) -> Result<BTreeMap<String, AttrValue>> {
        for (key, value) in attributes.iter_mut() {
            let Some(target) = ref_kind(self.kind(), key) else {
                continue;
            };
            *value = match &*value {
                AttrValue::Ref(id) => AttrValue::Ref(self.logical_name(target, id).await?),
                AttrValue::Refs(ids) => {
                    let mut names = BTreeSet::new();
                    for id in ids.iter() {
                        names.insert(self.logical_name(target, id).await?);
                    }
                    AttrValue::Refs(names)
                }
                _ => continue,
            };
        }
        Ok(attributes)
    }

    async fn provider_id(&self, kind: ResourceKind, name: &str) -> Result<String> {
        match self.api.find_object(kind, name).await? {
            Some(object) => Ok(object.id),
            None => Err(AwsError::PropagationDelay(format!("{kind} '{name}'"))),
        }
    }

    async fn logical_name(&self, kind: ResourceKind, id: &str) -> Result<String> {
        match self.api.get_object(kind, id).await {
            Ok(object) => Ok(object.name),
            Err(e) if e.is_not_found() => Ok(id.to_string()),
            Err(e) => Err(e),
        }
    }

    fn check_immutable(
        &self,
        name: &str,
        before: &BTreeMap<String, AttrValue>,
        after: &BTreeMap<String, AttrValue>,
    ) -> Result<()> {
        for attribute in self.behavior.immutable {
            if before.get(*attribute) != after.get(*attribute) {
                return Err(AwsError::InvalidParameter(format!(
                    "{} '{name}': attribute '{attribute}' cannot change in place; use a new name to replace the resource",
                    self.kind()
                )));
            }
        }
        Ok(())
    }

    /// Take over an object that already exists under the same logical name
    async fn adopt(
        &self,
        spec: &ResourceSpec,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<CloudObject> {
        let Some(existing) = self.api.find_object(self.kind(), &spec.name).await? else {
            return Err(AwsError::PropagationDelay(format!(
                "{} '{}' reported as existing but not found",
                self.kind(),
                spec.name
            )));
        };
        info!(kind = %self.kind(), name = %spec.name, id = %existing.id, "Adopting existing object");
        if existing.attributes == attributes {
            return Ok(existing);
        }
        self.check_immutable(&spec.name, &existing.attributes, &attributes)?;
        self.api
            .update_object(self.kind(), &existing.id, attributes)
            .await
    }

    async fn wait_ready(&self, object: CloudObject) -> ProviderResult<CloudObject> {
        let ready = lifecycle(self.kind()).ready;
        if object.status == ready {
            return Ok(object);
        }

        let kind = self.kind();
        let id = object.id.clone();
        poll_until_ready(&self.poll, self.abort.as_ref(), &object.name, ready, || {
            let api = Arc::clone(&self.api);
            let id = id.clone();
            async move {
                let current = api.get_object(kind, &id).await.map_err(ProviderError::from)?;
                Ok(current.status == ready)
            }
        })
        .await?;

        Ok(self.api.get_object(kind, &object.id).await?)
    }
}

#[async_trait]
impl ResourceAdapter for AwsResourceAdapter {
    fn kind(&self) -> ResourceKind {
        self.behavior.kind
    }

    async fn create(&self, spec: &ResourceSpec) -> ProviderResult<ProvisionedResource> {
        (self.behavior.check)(spec)?;
        let attributes = self.resolve(spec).await?;

        let object = match self
            .api
            .create_object(self.kind(), &spec.name, attributes.clone())
            .await
        {
            Ok(object) => object,
            Err(e) if e.is_already_exists() => self.adopt(spec, attributes).await?,
            Err(e) => return Err(e.into()),
        };
        debug!(kind = %self.kind(), name = %spec.name, id = %object.id, status = %object.status, "Object created");

        let object = self.wait_ready(object).await?;
        Ok(provisioned(object))
    }

    async fn update(
        &self,
        spec: &ResourceSpec,
        current: &AppliedState,
    ) -> ProviderResult<ProvisionedResource> {
        (self.behavior.check)(spec)?;
        let attributes = self.resolve(spec).await?;
        let existing = self
            .api
            .get_object(self.kind(), &current.provider_id)
            .await?;
        self.check_immutable(&spec.name, &existing.attributes, &attributes)?;

        let object = self
            .api
            .update_object(self.kind(), &existing.id, attributes)
            .await?;
        let object = self.wait_ready(object).await?;
        Ok(provisioned(object))
    }

    async fn delete(&self, current: &AppliedState) -> ProviderResult<()> {
        match self
            .api
            .delete_object(self.kind(), &current.provider_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(kind = %self.kind(), name = %current.name, "Object already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn describe(&self, name: &str) -> ProviderResult<Option<ObservedResource>> {
        let Some(object) = self.api.find_object(self.kind(), name).await? else {
            return Ok(None);
        };
        let attributes = self.unresolve(object.attributes).await?;
        Ok(Some(ObservedResource {
            provider_id: object.id,
            attributes,
            outputs: object.outputs,
        }))
    }
}

fn provisioned(object: CloudObject) -> ProvisionedResource {
    ProvisionedResource {
        provider_id: object.id,
        outputs: object.outputs,
    }
}

fn ref_kind(kind: ResourceKind, attribute: &str) -> Option<ResourceKind> {
    match kind.rule(attribute)?.ty {
        AttrType::Ref(target) | AttrType::Refs(target) => Some(target),
        _ => None,
    }
}
