//! S3 bucket and RDS instance

use super::KindBehavior;
use crate::error::{AwsError, Result};
use infraflow_core::{ResourceKind, ResourceSpec};
use regex::Regex;
use std::sync::LazyLock;

static BUCKET_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("static regex"));

const RDS_ENGINES: &[&str] = &[
    "postgres",
    "mysql",
    "mariadb",
    "aurora-postgresql",
    "aurora-mysql",
];

pub(super) static S3_BUCKET: KindBehavior = KindBehavior {
    kind: ResourceKind::S3Bucket,
    immutable: &["bucket_name"],
    check: check_bucket,
};

pub(super) static RDS_INSTANCE: KindBehavior = KindBehavior {
    kind: ResourceKind::RdsInstance,
    immutable: &["engine", "master_username"],
    check: check_rds,
};

fn check_bucket(spec: &ResourceSpec) -> Result<()> {
    if let Some(bucket) = spec.get_str("bucket_name")
        && (!BUCKET_NAME_PATTERN.is_match(bucket) || bucket.contains(".."))
    {
        return Err(AwsError::InvalidParameter(format!(
            "s3 bucket '{}': '{bucket}' is not a valid bucket name",
            spec.name
        )));
    }
    Ok(())
}

fn check_rds(spec: &ResourceSpec) -> Result<()> {
    if let Some(engine) = spec.get_str("engine")
        && !RDS_ENGINES.contains(&engine)
    {
        return Err(AwsError::InvalidParameter(format!(
            "rds instance '{}': unsupported engine '{engine}'",
            spec.name
        )));
    }
    if let Some(storage) = spec.get_integer("allocated_storage")
        && !(20..=65536).contains(&storage)
    {
        return Err(AwsError::InvalidParameter(format!(
            "rds instance '{}': allocated_storage must be between 20 and 65536 GiB",
            spec.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_core::AttrValue;

    fn bucket(name: &str) -> ResourceSpec {
        ResourceSpec::new(ResourceKind::S3Bucket, "assets")
            .with_attr("bucket_name", AttrValue::string(name))
    }

    #[test]
    fn test_bucket_names() {
        assert!(check_bucket(&bucket("web-assets.example")).is_ok());
        assert!(check_bucket(&bucket("Web_Assets")).is_err());
        assert!(check_bucket(&bucket("a..b")).is_err());
        assert!(check_bucket(&bucket("ab")).is_err());
    }

    #[test]
    fn test_rds_engine_and_storage() {
        let spec = ResourceSpec::new(ResourceKind::RdsInstance, "db1")
            .with_attr("engine", AttrValue::string("oracle"));
        assert!(check_rds(&spec).is_err());

        let spec = ResourceSpec::new(ResourceKind::RdsInstance, "db1")
            .with_attr("engine", AttrValue::string("postgres"))
            .with_attr("allocated_storage", AttrValue::Integer(10));
        assert!(check_rds(&spec).is_err());
    }
}
