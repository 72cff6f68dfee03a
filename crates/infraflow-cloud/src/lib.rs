//! InfraFlow reconciliation engine
//!
//! Turns a desired state into provider calls and keeps the applied state in
//! step with them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  InfraFlow CLI                   │
//! │           (infra plan / apply / destroy)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               infraflow-cloud                    │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │ Diff Engine  │  │  Dep. Graph  │             │
//! │  └──────────────┘  └──────────────┘             │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Reconciler  │  │ State Store  │             │
//! │  └──────┬───────┘  └──────────────┘             │
//! │         │  trait CloudProvider / ResourceAdapter │
//! └─────────┼───────────────────────────────────────┘
//!           │
//! ┌─────────▼─────────┐
//! │ infraflow-cloud-  │
//! │ aws (adapters)    │
//! └───────────────────┘
//! ```

pub mod action;
pub mod diff;
pub mod error;
pub mod graph;
pub mod provider;
pub mod reconciler;
pub mod state;
pub mod wait;

// Re-exports
pub use action::{
    ActionType, AttrChange, ChangeSet, Operation, OperationResult, OperationStatus, PlanSummary,
    RunEvent, RunReport, RunStatus,
};
pub use diff::{attribute_changes, destroy_all, diff};
pub use error::{CloudError, CycleError, ProviderError, ProviderResult, Result};
pub use graph::DependencyGraph;
pub use provider::{
    AuthStatus, CloudProvider, ObservedResource, ProvisionedResource, ResourceAdapter, RetryConfig,
};
pub use reconciler::{
    DEFAULT_MAX_PARALLEL, Drift, DriftEntry, DriftReport, Reconciler, ReconcilerConfig,
};
pub use state::{AppliedState, FileStateStore, MemoryStateStore, StateLock, StateStore};
pub use wait::{PollConfig, poll_until_ready};
