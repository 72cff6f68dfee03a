//! Change sets and run reports

use crate::state::AppliedState;
use chrono::{DateTime, Utc};
use infraflow_core::{AttrValue, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// One attribute that differs between desired and applied state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrChange {
    pub attribute: String,
    pub before: Option<AttrValue>,
    pub after: Option<AttrValue>,
}

/// A planned operation on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Logical name of the resource
    pub name: String,

    pub kind: ResourceKind,

    pub action: ActionType,

    /// Desired configuration (absent for deletes)
    pub desired: Option<ResourceSpec>,

    /// Applied state (absent for creates)
    pub current: Option<AppliedState>,

    /// Operations that must finish before this one starts
    pub waits_on: BTreeSet<String>,

    /// Attribute differences (updates only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<AttrChange>,
}

/// Ordered set of operations produced by a diff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Deletes first, then creates/updates/no-ops in dependency order
    pub operations: Vec<Operation>,

    /// Whether anything other than no-ops is planned
    pub has_changes: bool,
}

impl ChangeSet {
    pub fn new(operations: Vec<Operation>) -> Self {
        let has_changes = operations.iter().any(|op| op.action != ActionType::NoOp);
        Self {
            operations,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Get operations by type
    pub fn operations_by_type(&self, action: ActionType) -> Vec<&Operation> {
        self.operations.iter().filter(|op| op.action == action).collect()
    }

    /// Names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name.as_str()).collect()
    }

    /// Summary of the change set
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.operations_by_type(ActionType::Create).len(),
            update: self.operations_by_type(ActionType::Update).len(),
            delete: self.operations_by_type(ActionType::Delete).len(),
            no_change: self.operations_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Lifecycle of an operation during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    /// Never attempted because a prerequisite failed or the run was cancelled
    Skipped,
    NoOp,
}

impl OperationStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }

    /// Dependents may start once every prerequisite is in one of these states
    pub fn releases_dependents(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::NoOp)
    }

    /// Dependents of an operation in one of these states are skipped
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, OperationStatus::Failed | OperationStatus::Skipped)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::InProgress => write!(f, "in progress"),
            OperationStatus::Succeeded => write!(f, "succeeded"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Skipped => write!(f, "skipped"),
            OperationStatus::NoOp => write!(f, "no-op"),
        }
    }
}

/// Final result of a single operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub name: String,
    pub kind: ResourceKind,
    pub action: ActionType,
    pub status: OperationStatus,

    /// Provider calls made (0 when never attempted)
    pub attempts: u32,

    /// Error message if failed or skipped
    pub error: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A status transition, numbered in the order the reconciler observed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    pub name: String,
    pub status: OperationStatus,
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    PartialFailure,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::PartialFailure => write!(f, "partial failure"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of applying a change set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,

    /// Per-operation results in change set order
    pub operations: Vec<OperationResult>,

    /// Every status transition in observation order
    pub events: Vec<RunEvent>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn get(&self, name: &str) -> Option<&OperationResult> {
        self.operations.iter().find(|r| r.name == name)
    }

    pub fn with_status(&self, status: OperationStatus) -> Vec<&OperationResult> {
        self.operations.iter().filter(|r| r.status == status).collect()
    }

    /// Sequence number of the event where `name` reached `status`
    pub fn event_seq(&self, name: &str, status: OperationStatus) -> Option<u64> {
        self.events
            .iter()
            .find(|e| e.name == name && e.status == status)
            .map(|e| e.seq)
    }
}
