//! Resource kinds and their attribute schemas

use super::value::{AttrType, AttrValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of infrastructure resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    SecurityGroup,
    LoadBalancer,
    Listener,
    TargetGroup,
    EcsCluster,
    EcsService,
    TaskDefinition,
    S3Bucket,
    RdsInstance,
    Pipeline,
    Alarm,
    LogGroup,
}

/// Whether an attribute must be written, may be omitted, or falls back to a default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    Default(DefaultValue),
}

/// Schema default, kept `const`-constructible so schemas can live in statics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
    /// Items for set, list or reference-set attributes
    Items(&'static [&'static str]),
}

/// One attribute in a kind schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRule {
    pub name: &'static str,
    pub ty: AttrType,
    pub presence: Presence,
}

const fn required(name: &'static str, ty: AttrType) -> AttrRule {
    AttrRule {
        name,
        ty,
        presence: Presence::Required,
    }
}

const fn optional(name: &'static str, ty: AttrType) -> AttrRule {
    AttrRule {
        name,
        ty,
        presence: Presence::Optional,
    }
}

const fn defaulted(name: &'static str, ty: AttrType, value: DefaultValue) -> AttrRule {
    AttrRule {
        name,
        ty,
        presence: Presence::Default(value),
    }
}

use AttrType as T;
use DefaultValue as D;

const VPC: &[AttrRule] = &[
    required("cidr_block", T::String),
    defaulted("enable_dns_support", T::Bool, D::Bool(true)),
    defaulted("enable_dns_hostnames", T::Bool, D::Bool(true)),
    defaulted("tags", T::Set, D::Items(&[])),
];

const SUBNET: &[AttrRule] = &[
    required("vpc", T::Ref(ResourceKind::Vpc)),
    required("cidr_block", T::String),
    required("availability_zone", T::String),
    defaulted("map_public_ip_on_launch", T::Bool, D::Bool(false)),
    defaulted("tags", T::Set, D::Items(&[])),
];

const SECURITY_GROUP: &[AttrRule] = &[
    required("vpc", T::Ref(ResourceKind::Vpc)),
    defaulted("description", T::String, D::Str("managed by infraflow")),
    defaulted("ingress", T::Set, D::Items(&[])),
    defaulted("egress", T::Set, D::Items(&["all"])),
];

const LOAD_BALANCER: &[AttrRule] = &[
    required("subnets", T::Refs(ResourceKind::Subnet)),
    required("security_groups", T::Refs(ResourceKind::SecurityGroup)),
    defaulted("scheme", T::String, D::Str("internet-facing")),
    defaulted("lb_type", T::String, D::Str("application")),
    defaulted("idle_timeout", T::Integer, D::Int(60)),
];

const LISTENER: &[AttrRule] = &[
    required("load_balancer", T::Ref(ResourceKind::LoadBalancer)),
    required("port", T::Integer),
    required("default_target_group", T::Ref(ResourceKind::TargetGroup)),
    defaulted("protocol", T::String, D::Str("HTTP")),
    // Evaluated in order; priority is the position in the list.
    defaulted("rules", T::List, D::Items(&[])),
    optional("certificate_arn", T::String),
];

const TARGET_GROUP: &[AttrRule] = &[
    required("vpc", T::Ref(ResourceKind::Vpc)),
    required("port", T::Integer),
    defaulted("protocol", T::String, D::Str("HTTP")),
    defaulted("target_type", T::String, D::Str("ip")),
    defaulted("health_check_path", T::String, D::Str("/")),
];

const ECS_CLUSTER: &[AttrRule] = &[
    defaulted("capacity_providers", T::Set, D::Items(&["FARGATE"])),
    defaulted("container_insights", T::Bool, D::Bool(false)),
];

const ECS_SERVICE: &[AttrRule] = &[
    required("cluster", T::Ref(ResourceKind::EcsCluster)),
    required("task_definition", T::Ref(ResourceKind::TaskDefinition)),
    defaulted("desired_count", T::Integer, D::Int(1)),
    defaulted("launch_type", T::String, D::Str("FARGATE")),
    defaulted("assign_public_ip", T::Bool, D::Bool(false)),
    optional("subnets", T::Refs(ResourceKind::Subnet)),
    optional("security_groups", T::Refs(ResourceKind::SecurityGroup)),
    optional("target_group", T::Ref(ResourceKind::TargetGroup)),
    optional("container_port", T::Integer),
];

const TASK_DEFINITION: &[AttrRule] = &[
    required("family", T::String),
    required("image", T::String),
    required("cpu", T::Integer),
    required("memory", T::Integer),
    defaulted("network_mode", T::String, D::Str("awsvpc")),
    defaulted("environment", T::Set, D::Items(&[])),
    optional("container_port", T::Integer),
    optional("log_group", T::Ref(ResourceKind::LogGroup)),
    optional("execution_role", T::String),
];

const S3_BUCKET: &[AttrRule] = &[
    required("bucket_name", T::String),
    defaulted("versioning", T::Bool, D::Bool(false)),
    defaulted("block_public_access", T::Bool, D::Bool(true)),
    optional("website_index", T::String),
];

const RDS_INSTANCE: &[AttrRule] = &[
    required("engine", T::String),
    required("instance_class", T::String),
    required("allocated_storage", T::Integer),
    required("master_username", T::String),
    // Opaque reference to a secret; never resolved by InfraFlow.
    required("master_password_ref", T::String),
    optional("engine_version", T::String),
    optional("subnets", T::Refs(ResourceKind::Subnet)),
    optional("security_groups", T::Refs(ResourceKind::SecurityGroup)),
    defaulted("multi_az", T::Bool, D::Bool(false)),
    defaulted("publicly_accessible", T::Bool, D::Bool(false)),
    defaulted("backup_retention_days", T::Integer, D::Int(7)),
];

const PIPELINE: &[AttrRule] = &[
    required("source_repo", T::String),
    defaulted("branch", T::String, D::Str("main")),
    defaulted("build_image", T::String, D::Str("aws/codebuild/standard:7.0")),
    defaulted("stages", T::List, D::Items(&["source", "build", "deploy"])),
    optional("build_spec", T::String),
    optional("deploy_service", T::Ref(ResourceKind::EcsService)),
    optional("artifact_bucket", T::Ref(ResourceKind::S3Bucket)),
];

const ALARM: &[AttrRule] = &[
    required("metric_name", T::String),
    required("namespace", T::String),
    required("threshold", T::Integer),
    defaulted("comparison", T::String, D::Str("GreaterThanOrEqualToThreshold")),
    defaulted("statistic", T::String, D::Str("Average")),
    defaulted("period", T::Integer, D::Int(300)),
    defaulted("evaluation_periods", T::Integer, D::Int(1)),
    defaulted("dimensions", T::Set, D::Items(&[])),
    optional("load_balancer", T::Ref(ResourceKind::LoadBalancer)),
    optional("ecs_service", T::Ref(ResourceKind::EcsService)),
    optional("rds_instance", T::Ref(ResourceKind::RdsInstance)),
];

const LOG_GROUP: &[AttrRule] = &[
    required("log_group_name", T::String),
    defaulted("retention_days", T::Integer, D::Int(30)),
];

impl ResourceKind {
    pub const ALL: [ResourceKind; 14] = [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::LoadBalancer,
        ResourceKind::Listener,
        ResourceKind::TargetGroup,
        ResourceKind::EcsCluster,
        ResourceKind::EcsService,
        ResourceKind::TaskDefinition,
        ResourceKind::S3Bucket,
        ResourceKind::RdsInstance,
        ResourceKind::Pipeline,
        ResourceKind::Alarm,
        ResourceKind::LogGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::TargetGroup => "target_group",
            ResourceKind::EcsCluster => "ecs_cluster",
            ResourceKind::EcsService => "ecs_service",
            ResourceKind::TaskDefinition => "task_definition",
            ResourceKind::S3Bucket => "s3_bucket",
            ResourceKind::RdsInstance => "rds_instance",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Alarm => "alarm",
            ResourceKind::LogGroup => "log_group",
        }
    }

    /// Attribute schema of this kind
    pub fn schema(&self) -> &'static [AttrRule] {
        match self {
            ResourceKind::Vpc => VPC,
            ResourceKind::Subnet => SUBNET,
            ResourceKind::SecurityGroup => SECURITY_GROUP,
            ResourceKind::LoadBalancer => LOAD_BALANCER,
            ResourceKind::Listener => LISTENER,
            ResourceKind::TargetGroup => TARGET_GROUP,
            ResourceKind::EcsCluster => ECS_CLUSTER,
            ResourceKind::EcsService => ECS_SERVICE,
            ResourceKind::TaskDefinition => TASK_DEFINITION,
            ResourceKind::S3Bucket => S3_BUCKET,
            ResourceKind::RdsInstance => RDS_INSTANCE,
            ResourceKind::Pipeline => PIPELINE,
            ResourceKind::Alarm => ALARM,
            ResourceKind::LogGroup => LOG_GROUP,
        }
    }

    pub fn rule(&self, attribute: &str) -> Option<&'static AttrRule> {
        self.schema().iter().find(|r| r.name == attribute)
    }
}

impl DefaultValue {
    /// Materialize the default as a value of the declared type
    pub fn to_value(self, ty: AttrType) -> AttrValue {
        match self {
            DefaultValue::Str(s) => AttrValue::String(s.to_string()),
            DefaultValue::Int(i) => AttrValue::Integer(i),
            DefaultValue::Bool(b) => AttrValue::Bool(b),
            DefaultValue::Items(items) => match ty {
                AttrType::List => AttrValue::list(items.iter().copied()),
                AttrType::Refs(_) => AttrValue::refs(items.iter().copied()),
                _ => AttrValue::set(items.iter().copied()),
            },
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    /// Accepts both `security_group` and `security-group`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown resource kind '{}'", s))
    }
}
