//! Error types for flowkeep-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
///
/// Every variant is fatal at startup; the daemon skips a sweep when a reload
/// fails later on.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    NotFound { path: PathBuf },

    /// Underlying I/O failure while reading the file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The instance list is missing or empty.
    #[error("no instances configured")]
    NoInstances,

    /// Instances are configured but every one of them is disabled.
    #[error("no enabled instances configured")]
    NoEnabledInstances,

    /// `api_key_env` names a variable that is not set.
    #[error("environment variable {var} (api_key_env of instance '{instance}') is not set")]
    MissingEnv { var: String, instance: String },

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
