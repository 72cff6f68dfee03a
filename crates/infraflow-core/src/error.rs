use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("file discovery error: {path}\nreason: {message}")]
    DiscoveryError { path: PathBuf, message: String },

    #[error(
        "project root not found\nsearched from: {0}\nhint: run inside a directory containing infra.kdl"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),
}

/// A desired-state document that is internally inconsistent.
///
/// Raised before any provider call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "validation failed for resource '{resource}'{}: {message}",
    .attribute.as_ref().map(|a| format!(", attribute '{a}'")).unwrap_or_default()
)]
pub struct ValidationError {
    pub resource: String,
    pub attribute: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: None,
            message: message.into(),
        }
    }

    pub fn attribute(
        resource: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            attribute: Some(attribute.into()),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
