//! Delivery pipelines

use super::KindBehavior;
use crate::error::{AwsError, Result};
use infraflow_core::{AttrValue, ResourceKind, ResourceSpec};

const STAGES: &[&str] = &["source", "build", "test", "approve", "deploy"];

pub(super) static PIPELINE: KindBehavior = KindBehavior {
    kind: ResourceKind::Pipeline,
    immutable: &[],
    check: check_pipeline,
};

fn check_pipeline(spec: &ResourceSpec) -> Result<()> {
    let Some(AttrValue::List(stages)) = spec.get("stages") else {
        return Ok(());
    };
    if stages.first().map(String::as_str) != Some("source") {
        return Err(AwsError::InvalidParameter(format!(
            "pipeline '{}': the first stage must be 'source'",
            spec.name
        )));
    }
    if let Some(unknown) = stages.iter().find(|s| !STAGES.contains(&s.as_str())) {
        return Err(AwsError::InvalidParameter(format!(
            "pipeline '{}': unknown stage '{unknown}'",
            spec.name
        )));
    }
    Ok(())
}
