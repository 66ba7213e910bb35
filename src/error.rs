use std::path::PathBuf;
use thiserror::Error;

/// Core library errors
#[derive(Error, Debug)]
pub enum SweeperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("IO error at path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration-file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),
}

/// Defects in the set of registered resource types.
///
/// These are detected before any scan or removal starts and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Resource type '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("Resource type '{type_name}' depends on unknown type '{dependency}'")]
    UnknownDependency {
        type_name: String,
        dependency: String,
    },

    #[error("Cyclic dependency between resource types: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

/// Error returned by a lister when enumeration of a resource type fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ListError {
    pub message: String,
}

impl ListError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error returned by a resource handle's remove operation.
///
/// Adapters classify provider failures into these variants; the scheduler
/// decides on retries purely from the variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemovalError {
    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded: {0}")]
    Throttled(String),

    /// Resource still in use or not yet consistent (retryable)
    #[error("Resource still in use: {0}")]
    InUse(String),

    /// Resource no longer exists (treated as removed)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other provider failure
    #[error("{message}")]
    Other {
        code: Option<String>,
        message: String,
    },
}

/// Provider error codes meaning the target is already gone
const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "ResourceNotFoundException",
    "NoSuchEntity",
    "NoSuchBucket",
    "InvalidGroup.NotFound",
    "InvalidInstanceID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "CacheSubnetGroupNotFoundFault",
    "ReplicationGroupNotFoundFault",
];

/// Provider error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Provider error codes for resources that are still referenced
const IN_USE_CODES: &[&str] = &[
    "DependencyViolation",
    "DeleteConflict",
    "ResourceInUseException",
    "InvalidCacheSubnetGroupState",
    "InvalidReplicationGroupState",
];

impl RemovalError {
    /// Classify a provider error from its error code.
    pub fn from_code(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(c) if NOT_FOUND_CODES.contains(&c) || c.ends_with(".NotFound") => {
                RemovalError::NotFound(message)
            }
            Some(c) if THROTTLING_CODES.contains(&c) => RemovalError::Throttled(message),
            Some(c) if IN_USE_CODES.contains(&c) => RemovalError::InUse(message),
            _ => RemovalError::Other {
                code: code.map(str::to_string),
                message,
            },
        }
    }

    /// Construct an unclassified failure.
    pub fn other(message: impl Into<String>) -> Self {
        RemovalError::Other {
            code: None,
            message: message.into(),
        }
    }

    /// Whether a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemovalError::Throttled(_) | RemovalError::InUse(_))
    }

    /// Whether the target is already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemovalError::NotFound(_))
    }
}

/// Inventory snapshot errors
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Failed to read inventory '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse inventory '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize inventory for '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write inventory '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource '{identity}' references unknown type '{type_name}'")]
    UnknownType { type_name: String, identity: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SweeperError>;
