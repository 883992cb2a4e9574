//! YAML configuration.
//!
//! # File format
//!
//! ```yaml
//! repo_dir: ./flow-history
//! remote_url: git@github.com:acme/flows.git
//! branch: main
//! interval_minutes: 5
//! request_timeout_secs: 30
//! instances:
//!   - name: prod
//!     url: https://flowise.example.com
//!     api_key_env: PROD_FLOWISE_KEY
//!   - name: dev
//!     url: http://localhost:3000
//!     api_key: dev-key
//!     enabled: false
//! ```
//!
//! # API pattern
//!
//! [`Config::load_at`] reads the process environment; [`Config::from_yaml`]
//! takes an explicit environment lookup and is what tests use.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::InstanceName;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "flowkeep.yaml";

/// Overrides `remote_url`; an empty value clears it.
pub const REMOTE_URL_ENV: &str = "FLOWKEEP_REMOTE_URL";

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_INTERVAL_MINUTES: u64 = 1;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// One week.
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60 * 60;

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// One remote instance to sync from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub name: InstanceName,
    pub url: String,
    pub api_key: String,
    pub enabled: bool,
}

/// Author/committer identity for commits made by the commit store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: "flowkeep".to_string(),
            email: "flowkeep@localhost".to_string(),
        }
    }
}

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Working tree of the commit store; state files and `flows/` live here.
    pub repo_dir: PathBuf,
    pub remote_url: Option<String>,
    pub branch: String,
    pub interval_minutes: u64,
    pub request_timeout: Duration,
    pub git_identity: GitIdentity,
    pub instances: Vec<InstanceConfig>,
}

impl Config {
    /// Load and validate the configuration at `path`, reading overrides and
    /// `api_key_env` values from the process environment.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents, path, |var| std::env::var(var).ok())
    }

    /// Parse and validate YAML `contents` as if read from `path`.
    ///
    /// `env` resolves environment variables; relative `repo_dir` values are
    /// anchored at the directory containing `path`.
    pub fn from_yaml(
        contents: &str,
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        raw.resolve(path, &env)
    }

    /// Instances that take part in reconciliation, in configuration order.
    pub fn enabled_instances(&self) -> impl Iterator<Item = &InstanceConfig> {
        self.instances.iter().filter(|instance| instance.enabled)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    repo_dir: Option<PathBuf>,
    remote_url: Option<String>,
    branch: Option<String>,
    interval_minutes: Option<u64>,
    request_timeout_secs: Option<u64>,
    git_user_name: Option<String>,
    git_user_email: Option<String>,
    #[serde(default)]
    instances: Vec<RawInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInstance {
    name: String,
    url: String,
    api_key: Option<String>,
    api_key_env: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RawConfig {
    fn resolve(
        self,
        path: &Path,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        if self.instances.is_empty() {
            return Err(ConfigError::NoInstances);
        }

        let mut seen = HashSet::new();
        let mut instances = Vec::with_capacity(self.instances.len());
        for raw in self.instances {
            validate_instance_name(&raw.name)?;
            if !seen.insert(raw.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instance name '{}'",
                    raw.name
                )));
            }
            instances.push(raw.resolve(env)?);
        }
        if !instances.iter().any(|instance| instance.enabled) {
            return Err(ConfigError::NoEnabledInstances);
        }

        let interval_minutes = self.interval_minutes.unwrap_or(DEFAULT_INTERVAL_MINUTES);
        if interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "interval_minutes must be at least 1".to_string(),
            ));
        }
        if interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "interval_minutes must be at most {MAX_INTERVAL_MINUTES}"
            )));
        }
        let timeout_secs = self
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "request_timeout_secs must be at most {MAX_REQUEST_TIMEOUT_SECS}"
            )));
        }

        let branch = non_blank(self.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let remote_url = match env(REMOTE_URL_ENV) {
            Some(value) => non_blank(Some(value)),
            None => non_blank(self.remote_url),
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let repo_dir = match self.repo_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };

        let defaults = GitIdentity::default();
        let git_identity = GitIdentity {
            name: non_blank(self.git_user_name).unwrap_or(defaults.name),
            email: non_blank(self.git_user_email).unwrap_or(defaults.email),
        };

        Ok(Config {
            repo_dir,
            remote_url,
            branch,
            interval_minutes,
            request_timeout: Duration::from_secs(timeout_secs),
            git_identity,
            instances,
        })
    }
}

impl RawInstance {
    fn resolve(self, env: &dyn Fn(&str) -> Option<String>) -> Result<InstanceConfig, ConfigError> {
        let url = self.url.trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "instance '{}' url must start with http:// or https://",
                self.name
            )));
        }

        let api_key = match (self.api_key, self.api_key_env) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(format!(
                    "instance '{}' sets both api_key and api_key_env",
                    self.name
                )))
            }
            (Some(key), None) => key,
            (None, Some(var)) => env(&var).ok_or_else(|| ConfigError::MissingEnv {
                var,
                instance: self.name.clone(),
            })?,
            (None, None) => {
                return Err(ConfigError::Invalid(format!(
                    "instance '{}' needs api_key or api_key_env",
                    self.name
                )))
            }
        };

        Ok(InstanceConfig {
            name: InstanceName::from(self.name),
            url,
            api_key,
            enabled: self.enabled,
        })
    }
}

fn validate_instance_name(name: &str) -> Result<(), ConfigError> {
    let unsafe_char = name
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\');
    if name.is_empty() || name.starts_with('.') || unsafe_char {
        return Err(ConfigError::Invalid(format!(
            "instance name '{name}' must be non-empty, not start with '.', \
             and contain no whitespace or path separators"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
