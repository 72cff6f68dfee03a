//! Parsing of `resource` nodes

use crate::error::{FlowError, Result};
use crate::model::{AttrValue, ResourceKind, ResourceSpec};
use kdl::{KdlEntry, KdlNode, KdlValue};

/// Parse `resource "<kind>" "<name>" { ... }`
pub fn parse_resource(node: &KdlNode) -> Result<ResourceSpec> {
    let mut args = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string());

    let kind_name = args
        .next()
        .ok_or_else(|| FlowError::InvalidConfig("resource requires a kind".to_string()))?;
    let kind: ResourceKind = kind_name.parse().map_err(FlowError::InvalidConfig)?;
    let name = args.next().ok_or_else(|| {
        FlowError::InvalidConfig(format!("resource \"{}\" requires a name", kind_name))
    })?;

    let mut spec = ResourceSpec::new(kind, name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends_on" | "depends-on" => {
                    spec.depends_on.extend(
                        child
                            .entries()
                            .iter()
                            .filter_map(|e| e.value().as_string().map(|s| s.to_string())),
                    );
                }
                other => {
                    let attribute = other.replace('-', "_");
                    let raw = parse_value(&spec.name, &attribute, child)?;
                    let value = match kind.rule(&attribute) {
                        Some(rule) => raw.clone().coerce(rule.ty).unwrap_or(raw),
                        None => raw,
                    };
                    spec.attributes.insert(attribute, value);
                }
            }
        }
    }

    Ok(spec)
}

/// One attribute node: a single argument becomes a scalar, several arguments a list
fn parse_value(resource: &str, attribute: &str, node: &KdlNode) -> Result<AttrValue> {
    let values = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| parse_entry(resource, attribute, e))
        .collect::<Result<Vec<_>>>()?;

    if values.len() == 1 {
        return values
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::InvalidConfig(format!("{}.{}: no value", resource, attribute)));
    }

    if !values.is_empty() && values.iter().all(|v| matches!(v, AttrValue::Ref(_))) {
        return Ok(AttrValue::Refs(
            values
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect(),
        ));
    }

    let mut items = Vec::with_capacity(values.len());
    for value in values {
        match value {
            AttrValue::String(s) => items.push(s),
            other => {
                return Err(FlowError::InvalidConfig(format!(
                    "{}.{}: lists may only contain strings, found {}",
                    resource,
                    attribute,
                    other.type_name()
                )));
            }
        }
    }
    Ok(AttrValue::List(items))
}

fn parse_entry(resource: &str, attribute: &str, entry: &KdlEntry) -> Result<AttrValue> {
    let is_ref = entry.ty().is_some_and(|t| t.value() == "ref");
    match entry.value() {
        KdlValue::String(s) if is_ref => Ok(AttrValue::Ref(s.clone())),
        KdlValue::String(s) => Ok(AttrValue::String(s.clone())),
        KdlValue::Integer(i) => i64::try_from(*i).map(AttrValue::Integer).map_err(|_| {
            FlowError::InvalidConfig(format!("{}.{}: integer out of range", resource, attribute))
        }),
        KdlValue::Bool(b) => Ok(AttrValue::Bool(*b)),
        other => Err(FlowError::InvalidConfig(format!(
            "{}.{}: unsupported value {}",
            resource, attribute, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_node(kdl: &str) -> KdlNode {
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        doc.nodes().first().unwrap().clone()
    }

    #[test]
    fn test_parse_resource_header() {
        let node = first_node(r#"resource "vpc" "main" { cidr_block "10.0.0.0/16"; }"#);
        let spec = parse_resource(&node).unwrap();
        assert_eq!(spec.kind, ResourceKind::Vpc);
        assert_eq!(spec.name, "main");
        assert_eq!(spec.get_str("cidr_block"), Some("10.0.0.0/16"));
    }

    #[test]
    fn test_parse_resource_requires_name() {
        let node = first_node(r#"resource "vpc""#);
        assert!(parse_resource(&node).is_err());
    }

    #[test]
    fn test_parse_resource_unknown_kind() {
        let node = first_node(r#"resource "kubernetes" "k""#);
        let err = parse_resource(&node).unwrap_err();
        assert!(err.to_string().contains("kubernetes"));
    }

    #[test]
    fn test_kebab_case_attributes() {
        let node = first_node(
            r#"
            resource "subnet" "public-a" {
                vpc "main"
                cidr-block "10.0.1.0/24"
                availability-zone "us-east-1a"
                map-public-ip-on-launch #true
            }
            "#,
        );
        let spec = parse_resource(&node).unwrap();
        assert_eq!(spec.get("vpc"), Some(&AttrValue::reference("main")));
        assert_eq!(
            spec.get("map_public_ip_on_launch"),
            Some(&AttrValue::Bool(true))
        );
    }
}
