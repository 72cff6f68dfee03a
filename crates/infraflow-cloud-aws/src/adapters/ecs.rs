//! ECS cluster, service and task definition

use super::{KindBehavior, no_checks};
use crate::error::{AwsError, Result};
use infraflow_core::{AttrValue, ResourceKind, ResourceSpec};

/// Fargate task sizes: cpu units and the memory range (MiB) each allows
const FARGATE_SIZES: &[(i64, i64, i64)] = &[
    (256, 512, 2048),
    (512, 1024, 4096),
    (1024, 2048, 8192),
    (2048, 4096, 16384),
    (4096, 8192, 30720),
];

pub(super) static ECS_CLUSTER: KindBehavior = KindBehavior {
    kind: ResourceKind::EcsCluster,
    immutable: &[],
    check: no_checks,
};

pub(super) static ECS_SERVICE: KindBehavior = KindBehavior {
    kind: ResourceKind::EcsService,
    immutable: &["cluster", "launch_type"],
    check: check_service,
};

pub(super) static TASK_DEFINITION: KindBehavior = KindBehavior {
    kind: ResourceKind::TaskDefinition,
    immutable: &["family"],
    check: check_task_definition,
};

fn check_service(spec: &ResourceSpec) -> Result<()> {
    if let Some(count) = spec.get_integer("desired_count")
        && count < 0
    {
        return Err(AwsError::InvalidParameter(format!(
            "ecs service '{}': desired_count cannot be negative",
            spec.name
        )));
    }
    if spec.get("target_group").is_some() && spec.get_integer("container_port").is_none() {
        return Err(AwsError::InvalidParameter(format!(
            "ecs service '{}': target_group requires container_port",
            spec.name
        )));
    }
    Ok(())
}

fn check_task_definition(spec: &ResourceSpec) -> Result<()> {
    if let (Some(cpu), Some(memory)) = (spec.get_integer("cpu"), spec.get_integer("memory")) {
        let fits = FARGATE_SIZES
            .iter()
            .any(|&(units, min, max)| units == cpu && (min..=max).contains(&memory));
        if !fits {
            return Err(AwsError::InvalidParameter(format!(
                "task definition '{}': cpu {cpu} with memory {memory} is not a valid Fargate size",
                spec.name
            )));
        }
    }
    if let Some(AttrValue::Set(variables)) = spec.get("environment")
        && let Some(bad) = variables.iter().find(|v| !v.contains('='))
    {
        return Err(AwsError::InvalidParameter(format!(
            "task definition '{}': environment entry '{bad}' must be KEY=VALUE",
            spec.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(cpu: i64, memory: i64) -> ResourceSpec {
        ResourceSpec::new(ResourceKind::TaskDefinition, "web")
            .with_attr("cpu", AttrValue::Integer(cpu))
            .with_attr("memory", AttrValue::Integer(memory))
    }

    #[test]
    fn test_fargate_sizes() {
        assert!(check_task_definition(&task(256, 512)).is_ok());
        assert!(check_task_definition(&task(1024, 4096)).is_ok());
        assert!(check_task_definition(&task(256, 4096)).is_err());
        assert!(check_task_definition(&task(300, 1024)).is_err());
    }

    #[test]
    fn test_environment_entries() {
        let spec = task(256, 512).with_attr("environment", AttrValue::set(["PORT=80", "DEBUG"]));
        assert!(check_task_definition(&spec).is_err());
    }

    #[test]
    fn test_service_with_target_group_needs_port() {
        let spec = ResourceSpec::new(ResourceKind::EcsService, "api")
            .with_attr("target_group", AttrValue::reference("tg1"));
        assert!(check_service(&spec).is_err());
        let spec = spec.with_attr("container_port", AttrValue::Integer(8080));
        assert!(check_service(&spec).is_ok());
    }
}
