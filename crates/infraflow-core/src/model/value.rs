//! Attribute values
//!
//! Sets compare order-insensitively (they are stored sorted), lists keep
//! their order.

use super::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single attribute value of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    String(String),
    Integer(i64),
    Bool(bool),
    /// Unordered set of strings (e.g. security group rules)
    Set(BTreeSet<String>),
    /// Ordered sequence of strings (e.g. listener rules, priority order)
    List(Vec<String>),
    /// Reference to another resource by logical name
    Ref(String),
    /// Unordered set of references
    Refs(BTreeSet<String>),
}

/// Declared type of an attribute in a kind schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Integer,
    Bool,
    Set,
    List,
    /// Reference to a resource of the given kind
    Ref(ResourceKind),
    /// Set of references to resources of the given kind
    Refs(ResourceKind),
}

impl AttrValue {
    pub fn string(value: impl Into<String>) -> Self {
        AttrValue::String(value.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        AttrValue::Ref(name.into())
    }

    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn refs<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::Refs(items.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) | AttrValue::Ref(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::String(_) => "string",
            AttrValue::Integer(_) => "integer",
            AttrValue::Bool(_) => "bool",
            AttrValue::Set(_) => "set",
            AttrValue::List(_) => "list",
            AttrValue::Ref(_) => "reference",
            AttrValue::Refs(_) => "reference set",
        }
    }

    /// Logical names this value points at
    pub fn references(&self) -> Vec<&str> {
        match self {
            AttrValue::Ref(name) => vec![name.as_str()],
            AttrValue::Refs(names) => names.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn matches(&self, ty: AttrType) -> bool {
        matches!(
            (self, ty),
            (AttrValue::String(_), AttrType::String)
                | (AttrValue::Integer(_), AttrType::Integer)
                | (AttrValue::Bool(_), AttrType::Bool)
                | (AttrValue::Set(_), AttrType::Set)
                | (AttrValue::List(_), AttrType::List)
                | (AttrValue::Ref(_), AttrType::Ref(_))
                | (AttrValue::Refs(_), AttrType::Refs(_))
        )
    }

    /// Convert a loosely-typed value (as written in a document) into the
    /// declared type. Returns `None` when no lossless conversion exists.
    pub fn coerce(self, ty: AttrType) -> Option<AttrValue> {
        if self.matches(ty) {
            return Some(self);
        }
        match (self, ty) {
            (AttrValue::String(s), AttrType::Set) => Some(AttrValue::Set(BTreeSet::from([s]))),
            (AttrValue::List(items), AttrType::Set) => {
                Some(AttrValue::Set(items.into_iter().collect()))
            }
            (AttrValue::String(s), AttrType::List) => Some(AttrValue::List(vec![s])),
            (AttrValue::String(s), AttrType::Ref(_)) => Some(AttrValue::Ref(s)),
            (AttrValue::String(s) | AttrValue::Ref(s), AttrType::Refs(_)) => {
                Some(AttrValue::Refs(BTreeSet::from([s])))
            }
            (AttrValue::List(items), AttrType::Refs(_)) => {
                Some(AttrValue::Refs(items.into_iter().collect()))
            }
            (AttrValue::Set(items), AttrType::Refs(_)) => Some(AttrValue::Refs(items)),
            (AttrValue::Ref(s), AttrType::String) => Some(AttrValue::String(s)),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{:?}", s),
            AttrValue::Integer(i) => write!(f, "{}", i),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Set(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            AttrValue::List(items) => write!(f, "[{}]", items.join(", ")),
            AttrValue::Ref(name) => write!(f, "ref({})", name),
            AttrValue::Refs(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "refs{{{}}}", names.join(", "))
            }
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::String => write!(f, "string"),
            AttrType::Integer => write!(f, "integer"),
            AttrType::Bool => write!(f, "bool"),
            AttrType::Set => write!(f, "set"),
            AttrType::List => write!(f, "list"),
            AttrType::Ref(kind) => write!(f, "reference to {}", kind),
            AttrType::Refs(kind) => write!(f, "references to {}", kind),
        }
    }
}
