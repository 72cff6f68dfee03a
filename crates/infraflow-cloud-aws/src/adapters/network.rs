//! VPC, subnet and security group

use super::{KindBehavior, no_checks};
use crate::error::{AwsError, Result};
use infraflow_core::{AttrValue, ResourceKind, ResourceSpec};
use regex::Regex;
use std::sync::LazyLock;

static AZ_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-\d[a-z]$").expect("static regex"));

/// `protocol:port[-port]:cidr`, or `all`
static RULE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(all|(tcp|udp|icmp):\d{1,5}(-\d{1,5})?:[0-9./]+)$").expect("static regex")
});

pub(super) static VPC: KindBehavior = KindBehavior {
    kind: ResourceKind::Vpc,
    immutable: &["cidr_block"],
    check: no_checks,
};

pub(super) static SUBNET: KindBehavior = KindBehavior {
    kind: ResourceKind::Subnet,
    immutable: &["vpc", "cidr_block", "availability_zone"],
    check: check_subnet,
};

pub(super) static SECURITY_GROUP: KindBehavior = KindBehavior {
    kind: ResourceKind::SecurityGroup,
    immutable: &["vpc", "description"],
    check: check_security_group,
};

fn check_subnet(spec: &ResourceSpec) -> Result<()> {
    if let Some(az) = spec.get_str("availability_zone")
        && !AZ_PATTERN.is_match(az)
    {
        return Err(AwsError::InvalidParameter(format!(
            "subnet '{}': '{az}' is not an availability zone",
            spec.name
        )));
    }
    Ok(())
}

fn check_security_group(spec: &ResourceSpec) -> Result<()> {
    for attribute in ["ingress", "egress"] {
        let Some(AttrValue::Set(rules)) = spec.get(attribute) else {
            continue;
        };
        if let Some(bad) = rules.iter().find(|rule| !RULE_PATTERN.is_match(rule)) {
            return Err(AwsError::InvalidParameter(format!(
                "security group '{}': {attribute} rule '{bad}' must look like 'tcp:443:0.0.0.0/0'",
                spec.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_zone_format() {
        let spec = ResourceSpec::new(ResourceKind::Subnet, "s1")
            .with_attr("availability_zone", AttrValue::string("us-east-1a"));
        assert!(check_subnet(&spec).is_ok());

        let spec = ResourceSpec::new(ResourceKind::Subnet, "s1")
            .with_attr("availability_zone", AttrValue::string("us-east-1"));
        assert!(check_subnet(&spec).is_err());
    }

    #[test]
    fn test_security_group_rules() {
        let spec = ResourceSpec::new(ResourceKind::SecurityGroup, "sg1")
            .with_attr("ingress", AttrValue::set(["tcp:443:0.0.0.0/0", "udp:1000-2000:10.0.0.0/8"]))
            .with_attr("egress", AttrValue::set(["all"]));
        assert!(check_security_group(&spec).is_ok());

        let spec = ResourceSpec::new(ResourceKind::SecurityGroup, "sg1")
            .with_attr("ingress", AttrValue::set(["https from anywhere"]));
        assert!(matches!(
            check_security_group(&spec),
            Err(AwsError::InvalidParameter(_))
        ));
    }
}
