//! AWS error classification
//!
//! Errors carry the service error code; classification turns the code into a
//! category the reconciler can act on.

use infraflow_cloud::ProviderError;
use thiserror::Error;

/// AWS error categories for retry and adoption logic
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (deletes treat this as success)
    #[error("Resource not found: {resource_type} '{resource_id}'")]
    NotFound {
        resource_type: &'static str,
        resource_id: String,
    },

    /// Resource already exists (create adopts it)
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded: {0}")]
    Throttled(String),

    /// Resource has dependent objects (retryable, e.g. SG with attached ENI)
    #[error("Resource has dependent objects: {0}")]
    DependencyViolation(String),

    /// A referenced resource is not visible yet (eventual consistency, retryable)
    #[error("Referenced resource not yet visible: {0}")]
    PropagationDelay(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic AWS error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::Throttled(_) | AwsError::DependencyViolation(_) | AwsError::PropagationDelay(_)
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, AwsError::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidVpcID.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidGroup.NotFound",
    "LoadBalancerNotFound",
    "ListenerNotFound",
    "TargetGroupNotFound",
    "ClusterNotFoundException",
    "ServiceNotFoundException",
    "DBInstanceNotFound",
    "NoSuchBucket",
    "ResourceNotFoundException",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "InvalidGroup.Duplicate",
    "DuplicateLoadBalancerName",
    "DuplicateTargetGroupName",
    "DuplicateListener",
    "DBInstanceAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "ResourceAlreadyExistsException",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "ResourceInUse", "InvalidDBInstanceState"];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
];

const INVALID_PARAMETER_CODES: &[&str] = &[
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "ValidationError",
    "InvalidBucketName",
];

/// Classify an AWS error using the error code
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            resource_type: "resource",
            resource_id: message,
        },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => AwsError::AlreadyExists(message),
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled(message),
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation(message),
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied(message),
        Some(c) if INVALID_PARAMETER_CODES.contains(&c) => AwsError::InvalidParameter(message),
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

impl From<AwsError> for ProviderError {
    fn from(err: AwsError) -> Self {
        let message = err.to_string();
        match err {
            AwsError::Throttled(_)
            | AwsError::DependencyViolation(_)
            | AwsError::PropagationDelay(_) => ProviderError::Transient(message),
            AwsError::AccessDenied(_) => ProviderError::Permission(message),
            AwsError::NotFound { .. } => ProviderError::NotFound(message),
            AwsError::InvalidParameter(_) => ProviderError::Validation(message),
            AwsError::AlreadyExists(_)
            | AwsError::Sdk { .. }
            | AwsError::Io(_)
            | AwsError::Json(_) => ProviderError::Api(message),
        }
    }
}
