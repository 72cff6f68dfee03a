//! Desired-state resource descriptions

use super::kind::{Presence, ResourceKind};
use super::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Desired configuration of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Logical name, unique within a desired state
    pub name: String,

    pub kind: ResourceKind,

    pub attributes: BTreeMap<String, AttrValue>,

    /// Explicit dependencies (logical names)
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_str)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(AttrValue::as_integer)
    }

    /// Attributes with schema defaults filled in
    pub fn normalized(&self) -> BTreeMap<String, AttrValue> {
        normalize_attributes(self.kind, &self.attributes)
    }

    /// Names referenced through reference-typed attributes
    pub fn references(&self) -> BTreeSet<String> {
        self.attributes
            .values()
            .flat_map(|v| v.references())
            .map(str::to_string)
            .collect()
    }

    /// Explicit dependencies plus implicit ones inferred from references
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.depends_on.clone();
        deps.extend(self.references());
        deps
    }
}

/// Fill in defaults declared by the kind schema.
///
/// Attributes not mentioned by the schema are kept as they are.
pub fn normalize_attributes(
    kind: ResourceKind,
    attributes: &BTreeMap<String, AttrValue>,
) -> BTreeMap<String, AttrValue> {
    let mut normalized = attributes.clone();
    for rule in kind.schema() {
        if let Presence::Default(default) = rule.presence {
            normalized
                .entry(rule.name.to_string())
                .or_insert_with(|| default.to_value(rule.ty));
        }
    }
    normalized
}

/// Everything an operator wants to exist, as read from the desired-state documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesiredState {
    /// Project name
    pub name: String,

    /// Resources in document order
    pub resources: Vec<ResourceSpec>,
}

impl DesiredState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    pub fn add(&mut self, spec: ResourceSpec) {
        self.resources.push(spec);
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn by_kind(&self, kind: ResourceKind) -> Vec<&ResourceSpec> {
        self.resources.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_fills_defaults() {
        let spec = ResourceSpec::new(ResourceKind::SecurityGroup, "web")
            .with_attr("vpc", AttrValue::reference("main"));
        let attrs = spec.normalized();

        assert_eq!(attrs.get("egress"), Some(&AttrValue::set(["all"])));
        assert_eq!(attrs.get("ingress"), Some(&AttrValue::Set(BTreeSet::new())));
        assert_eq!(attrs.get("vpc"), Some(&AttrValue::reference("main")));
    }

    #[test]
    fn test_normalized_keeps_explicit_values() {
        let spec = ResourceSpec::new(ResourceKind::Vpc, "main")
            .with_attr("cidr_block", AttrValue::string("10.0.0.0/16"))
            .with_attr("enable_dns_hostnames", AttrValue::Bool(false));
        assert_eq!(
            spec.normalized().get("enable_dns_hostnames"),
            Some(&AttrValue::Bool(false))
        );
    }

    #[test]
    fn test_dependencies_include_references() {
        let spec = ResourceSpec::new(ResourceKind::LoadBalancer, "alb")
            .with_attr("subnets", AttrValue::refs(["public-a", "public-b"]))
            .with_attr("security_groups", AttrValue::refs(["web"]))
            .with_dependency("main");

        let deps: Vec<String> = spec.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["main", "public-a", "public-b", "web"]);
    }

    #[test]
    fn test_desired_state_lookup() {
        let mut desired = DesiredState::new("shop");
        desired.add(ResourceSpec::new(ResourceKind::EcsCluster, "cluster"));
        desired.add(ResourceSpec::new(ResourceKind::LogGroup, "logs"));

        assert_eq!(desired.len(), 2);
        assert!(desired.get("cluster").is_some());
        assert!(desired.get("missing").is_none());
        assert_eq!(desired.by_kind(ResourceKind::LogGroup).len(), 1);
    }
}
