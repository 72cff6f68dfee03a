//! Desired-state validation
//!
//! Pure checks run before any provider call: schema conformance, reference
//! resolution and naming rules. Cycle detection lives with the dependency
//! graph in `infraflow-cloud`.

use crate::error::ValidationError;
use crate::model::{AttrType, AttrValue, DesiredState, Presence, ResourceKind, ResourceSpec};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]*$").expect("static regex")
});

static CIDR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})/(\d{1,2})$")
        .expect("static regex")
});

/// Validate one spec against the set of all known resources (name → kind)
pub fn validate(
    spec: &ResourceSpec,
    known: &BTreeMap<&str, ResourceKind>,
) -> Result<(), ValidationError> {
    if !NAME_PATTERN.is_match(&spec.name) {
        return Err(ValidationError::resource(
            &spec.name,
            "logical names must start with a lowercase letter and contain only [a-z0-9_-]",
        ));
    }

    for rule in spec.kind.schema() {
        if rule.presence == Presence::Required && !spec.attributes.contains_key(rule.name) {
            return Err(ValidationError::attribute(
                &spec.name,
                rule.name,
                format!("required by {}", spec.kind),
            ));
        }
    }

    for (attribute, value) in &spec.attributes {
        match spec.kind.rule(attribute) {
            Some(rule) => {
                if !value.matches(rule.ty) {
                    return Err(ValidationError::attribute(
                        &spec.name,
                        attribute,
                        format!("expected {}, found {}", rule.ty, value.type_name()),
                    ));
                }
                check_references(spec, attribute, value, Some(rule.ty), known)?;
            }
            None => {
                debug!(resource = %spec.name, attribute = %attribute, "attribute not in schema, passing through");
                check_references(spec, attribute, value, None, known)?;
            }
        }
        check_value(spec, attribute, value)?;
    }

    for dependency in &spec.depends_on {
        if dependency == &spec.name {
            return Err(ValidationError::attribute(
                &spec.name,
                "depends_on",
                "a resource cannot depend on itself",
            ));
        }
        if !known.contains_key(dependency.as_str()) {
            return Err(ValidationError::attribute(
                &spec.name,
                "depends_on",
                format!("unknown resource '{}'", dependency),
            ));
        }
    }

    Ok(())
}

fn check_references(
    spec: &ResourceSpec,
    attribute: &str,
    value: &AttrValue,
    ty: Option<AttrType>,
    known: &BTreeMap<&str, ResourceKind>,
) -> Result<(), ValidationError> {
    let expected = match ty {
        Some(AttrType::Ref(kind) | AttrType::Refs(kind)) => Some(kind),
        _ => None,
    };

    for target in value.references() {
        if target == spec.name {
            return Err(ValidationError::attribute(
                &spec.name,
                attribute,
                "a resource cannot reference itself",
            ));
        }
        let Some(actual) = known.get(target) else {
            return Err(ValidationError::attribute(
                &spec.name,
                attribute,
                format!("references unknown resource '{}'", target),
            ));
        };
        if let Some(expected) = expected
            && *actual != expected
        {
            return Err(ValidationError::attribute(
                &spec.name,
                attribute,
                format!(
                    "must reference a {}, but '{}' is a {}",
                    expected, target, actual
                ),
            ));
        }
    }
    Ok(())
}

/// Value-level checks for well-known attribute names
fn check_value(
    spec: &ResourceSpec,
    attribute: &str,
    value: &AttrValue,
) -> Result<(), ValidationError> {
    match (attribute, value) {
        ("cidr_block", AttrValue::String(cidr)) if !is_valid_cidr(cidr) => Err(
            ValidationError::attribute(&spec.name, attribute, format!("invalid CIDR '{}'", cidr)),
        ),
        ("port" | "container_port", AttrValue::Integer(port)) if !(1..=65535).contains(port) => {
            Err(ValidationError::attribute(
                &spec.name,
                attribute,
                format!("port {} out of range 1-65535", port),
            ))
        }
        (
            "cpu" | "memory" | "allocated_storage" | "period" | "evaluation_periods"
            | "retention_days",
            AttrValue::Integer(n),
        ) if *n <= 0 => Err(ValidationError::attribute(
            &spec.name,
            attribute,
            "must be positive",
        )),
        ("desired_count", AttrValue::Integer(n)) if *n < 0 => Err(ValidationError::attribute(
            &spec.name,
            attribute,
            "must not be negative",
        )),
        _ => Ok(()),
    }
}

fn is_valid_cidr(cidr: &str) -> bool {
    let Some(caps) = CIDR_PATTERN.captures(cidr) else {
        return false;
    };
    let octets_ok = (1..=4).all(|i| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .is_some_and(|n| n <= 255)
    });
    let prefix_ok = caps
        .get(5)
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .is_some_and(|p| p <= 32);
    octets_ok && prefix_ok
}

/// Every problem in the desired state, in document order
pub fn check_all(desired: &DesiredState) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut known = BTreeMap::new();

    for spec in &desired.resources {
        if !seen.insert(spec.name.as_str()) {
            errors.push(ValidationError::resource(
                &spec.name,
                "duplicate logical name",
            ));
            continue;
        }
        known.insert(spec.name.as_str(), spec.kind);
    }

    for spec in &desired.resources {
        if let Err(e) = validate(spec, &known) {
            errors.push(e);
        }
    }
    errors
}

/// Fail on the first problem in the desired state
pub fn validate_all(desired: &DesiredState) -> Result<(), ValidationError> {
    match check_all(desired).into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc(name: &str) -> ResourceSpec {
        ResourceSpec::new(ResourceKind::Vpc, name)
            .with_attr("cidr_block", AttrValue::string("10.0.0.0/16"))
    }

    fn subnet(name: &str, vpc: &str) -> ResourceSpec {
        ResourceSpec::new(ResourceKind::Subnet, name)
            .with_attr("vpc", AttrValue::reference(vpc))
            .with_attr("cidr_block", AttrValue::string("10.0.1.0/24"))
            .with_attr("availability_zone", AttrValue::string("us-east-1a"))
    }

    fn desired(resources: Vec<ResourceSpec>) -> DesiredState {
        DesiredState {
            name: "test".to_string(),
            resources,
        }
    }

    #[test]
    fn test_valid_state_passes() {
        let state = desired(vec![vpc("main"), subnet("public-a", "main")]);
        assert!(validate_all(&state).is_ok());
    }

    #[test]
    fn test_missing_required_attribute() {
        let state = desired(vec![ResourceSpec::new(ResourceKind::Vpc, "main")]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.resource, "main");
        assert_eq!(err.attribute.as_deref(), Some("cidr_block"));
    }

    #[test]
    fn test_wrong_type_names_attribute() {
        let state = desired(vec![
            vpc("main").with_attr("enable_dns_support", AttrValue::string("yes")),
        ]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.attribute.as_deref(), Some("enable_dns_support"));
        assert!(err.message.contains("expected bool"));
    }

    #[test]
    fn test_unknown_reference() {
        let state = desired(vec![subnet("public-a", "nope")]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.resource, "public-a");
        assert_eq!(err.attribute.as_deref(), Some("vpc"));
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn test_reference_to_wrong_kind() {
        let state = desired(vec![
            vpc("main"),
            subnet("public-a", "main"),
            subnet("public-b", "public-a"),
        ]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.resource, "public-b");
        assert!(err.message.contains("must reference a vpc"));
    }

    #[test]
    fn test_unknown_dependency() {
        let state = desired(vec![vpc("main").with_dependency("ghost")]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.attribute.as_deref(), Some("depends_on"));
    }

    #[test]
    fn test_self_dependency() {
        let state = desired(vec![vpc("main").with_dependency("main")]);
        assert!(validate_all(&state).is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let state = desired(vec![vpc("main"), vpc("main")]);
        let errors = check_all(&state);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }

    #[test]
    fn test_invalid_name() {
        let state = desired(vec![vpc("Main VPC")]);
        assert!(validate_all(&state).is_err());
    }

    #[test]
    fn test_invalid_cidr() {
        let state = desired(vec![
            ResourceSpec::new(ResourceKind::Vpc, "main")
                .with_attr("cidr_block", AttrValue::string("10.0.0.300/16")),
        ]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.attribute.as_deref(), Some("cidr_block"));
    }

    #[test]
    fn test_port_out_of_range() {
        let state = desired(vec![
            vpc("main"),
            ResourceSpec::new(ResourceKind::TargetGroup, "tg")
                .with_attr("vpc", AttrValue::reference("main"))
                .with_attr("port", AttrValue::Integer(70000)),
        ]);
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.attribute.as_deref(), Some("port"));
    }

    #[test]
    fn test_unknown_attribute_passes_through() {
        let state = desired(vec![vpc("main").with_attr("owner", AttrValue::string("web"))]);
        assert!(validate_all(&state).is_ok());
    }

    #[test]
    fn test_error_display_names_resource_and_attribute() {
        let err = ValidationError::attribute("alb", "subnets", "required by load_balancer");
        assert_eq!(
            err.to_string(),
            "validation failed for resource 'alb', attribute 'subnets': required by load_balancer"
        );
    }
}
