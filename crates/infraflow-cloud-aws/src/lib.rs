//! AWS provider for InfraFlow
//!
//! One [`ResourceAdapter`](infraflow_cloud::ResourceAdapter) per resource
//! kind, all talking to an account through the [`CloudApi`] trait. The
//! bundled [`SandboxApi`] is an in-memory account used for local runs and
//! tests.

pub mod adapters;
pub mod api;
pub mod error;
pub mod provider;
pub mod sandbox;

pub use adapters::{AwsResourceAdapter, KindBehavior};
pub use api::{CloudApi, CloudObject, Lifecycle, lifecycle};
pub use error::{AwsError, Result, classify_aws_error};
pub use provider::{AwsProvider, DEFAULT_REGION};
pub use sandbox::{SANDBOX_FILE, SandboxApi};
