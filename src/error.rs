//! Error types for the Postgres Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
///
/// "Not found" is not an error here: store lookups return `Ok(None)` for
/// absent objects and callers branch on that.
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Any other failure reported by the object store
    #[error("Store error: {0}")]
    Store(String),

    /// A resource this reconcile depends on cannot be resolved
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config map key referenced by an env var not found
    #[error("Key '{key}' not found in config map '{config_map}'")]
    ConfigKeyNotFound { config_map: String, key: String },

    /// Env var missing or without a resolvable value
    #[error("Environment variable '{name}' not set on {container}")]
    EnvVarNotFound { container: String, name: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Create a dependency-missing error
    pub fn dependency(msg: impl Into<String>) -> Self {
        Error::DependencyMissing(msg.into())
    }

    /// Short class name used for metric labels
    pub fn class(&self) -> &'static str {
        match self {
            Error::Kube(_) | Error::Store(_) => "store",
            Error::DependencyMissing(_) => "dependency_missing",
            Error::ConfigKeyNotFound { .. } | Error::EnvVarNotFound { .. } => "credentials",
            Error::Config(_) | Error::Yaml(_) | Error::Io(_) => "config",
            Error::Serialization(_) => "serialization",
        }
    }
}
