//! Raw account API
//!
//! [`CloudApi`] is the surface the adapters talk to: plain CRUD on tagged
//! objects, each carrying a lifecycle status. Logical resource names are
//! stored as the `Name` tag, which is what makes create idempotent.

use crate::error::Result;
use async_trait::async_trait;
use infraflow_core::{AttrValue, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An object living in the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudObject {
    /// Provider-assigned identifier (e.g. `vpc-00000001`)
    pub id: String,
    pub kind: ResourceKind,
    /// Logical name (the `Name` tag)
    pub name: String,
    /// Attributes as last written, references already resolved to ids
    pub attributes: BTreeMap<String, AttrValue>,
    pub status: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Lifecycle of a kind: the status right after create and the status it
/// settles in once usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub initial: &'static str,
    pub ready: &'static str,
}

impl Lifecycle {
    /// Whether the kind provisions asynchronously
    pub fn is_async(&self) -> bool {
        self.initial != self.ready
    }
}

pub fn lifecycle(kind: ResourceKind) -> Lifecycle {
    match kind {
        ResourceKind::LoadBalancer => Lifecycle {
            initial: "provisioning",
            ready: "active",
        },
        ResourceKind::RdsInstance => Lifecycle {
            initial: "creating",
            ready: "available",
        },
        ResourceKind::EcsService => Lifecycle {
            initial: "pending",
            ready: "steady",
        },
        _ => Lifecycle {
            initial: "available",
            ready: "available",
        },
    }
}

/// Account operations used by the adapters
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Identity of the caller, for `check_auth`
    async fn caller_identity(&self) -> Result<String>;

    /// Create an object. Fails with `AlreadyExists` when an object of the same
    /// kind already carries `name`.
    async fn create_object(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<CloudObject>;

    /// Replace the attributes of an existing object
    async fn update_object(
        &self,
        kind: ResourceKind,
        id: &str,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<CloudObject>;

    /// Delete an object. Fails with `NotFound` when it is already gone.
    async fn delete_object(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Look an object up by logical name
    async fn find_object(&self, kind: ResourceKind, name: &str) -> Result<Option<CloudObject>>;

    /// Fetch an object by id, `NotFound` when absent
    async fn get_object(&self, kind: ResourceKind, id: &str) -> Result<CloudObject>;
}
