//! Load balancer, listener and target group

use super::KindBehavior;
use crate::error::{AwsError, Result};
use infraflow_core::{ResourceKind, ResourceSpec};

/// Longest name ELB accepts
const MAX_NAME_LEN: usize = 32;

pub(super) static LOAD_BALANCER: KindBehavior = KindBehavior {
    kind: ResourceKind::LoadBalancer,
    immutable: &["scheme", "lb_type"],
    check: check_load_balancer,
};

pub(super) static LISTENER: KindBehavior = KindBehavior {
    kind: ResourceKind::Listener,
    immutable: &["load_balancer"],
    check: check_listener,
};

pub(super) static TARGET_GROUP: KindBehavior = KindBehavior {
    kind: ResourceKind::TargetGroup,
    immutable: &["vpc", "port", "protocol", "target_type"],
    check: check_target_group,
};

fn one_of(spec: &ResourceSpec, attribute: &str, allowed: &[&str]) -> Result<()> {
    match spec.get_str(attribute) {
        Some(value) if !allowed.contains(&value) => Err(AwsError::InvalidParameter(format!(
            "{} '{}': {attribute} must be one of {}, got '{value}'",
            spec.kind,
            spec.name,
            allowed.join(", ")
        ))),
        _ => Ok(()),
    }
}

fn check_name_length(spec: &ResourceSpec) -> Result<()> {
    if spec.name.len() > MAX_NAME_LEN {
        return Err(AwsError::InvalidParameter(format!(
            "{} '{}': name longer than {MAX_NAME_LEN} characters",
            spec.kind, spec.name
        )));
    }
    Ok(())
}

fn check_load_balancer(spec: &ResourceSpec) -> Result<()> {
    check_name_length(spec)?;
    one_of(spec, "scheme", &["internet-facing", "internal"])?;
    one_of(spec, "lb_type", &["application", "network"])
}

fn check_listener(spec: &ResourceSpec) -> Result<()> {
    one_of(spec, "protocol", &["HTTP", "HTTPS", "TCP", "TLS", "UDP"])?;
    if matches!(spec.get_str("protocol"), Some("HTTPS" | "TLS"))
        && spec.get_str("certificate_arn").is_none()
    {
        return Err(AwsError::InvalidParameter(format!(
            "listener '{}': HTTPS and TLS listeners need a certificate_arn",
            spec.name
        )));
    }
    Ok(())
}

fn check_target_group(spec: &ResourceSpec) -> Result<()> {
    check_name_length(spec)?;
    one_of(spec, "target_type", &["ip", "instance", "lambda", "alb"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_core::AttrValue;

    #[test]
    fn test_https_listener_needs_certificate() {
        let spec = ResourceSpec::new(ResourceKind::Listener, "https")
            .with_attr("protocol", AttrValue::string("HTTPS"));
        assert!(check_listener(&spec).is_err());

        let spec = spec.with_attr(
            "certificate_arn",
            AttrValue::string("arn:aws:acm:us-east-1:000000000000:certificate/web"),
        );
        assert!(check_listener(&spec).is_ok());
    }

    #[test]
    fn test_load_balancer_scheme_and_name() {
        let spec = ResourceSpec::new(ResourceKind::LoadBalancer, "alb1")
            .with_attr("scheme", AttrValue::string("private"));
        assert!(check_load_balancer(&spec).is_err());

        let spec = ResourceSpec::new(ResourceKind::LoadBalancer, "a".repeat(33));
        assert!(check_load_balancer(&spec).is_err());
    }
}
