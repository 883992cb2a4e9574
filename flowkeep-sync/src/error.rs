//! Error types for flowkeep-sync.

use std::path::PathBuf;

use thiserror::Error;

use flowkeep_core::{ConfigError, InstanceName};

/// Failure to retrieve the flow collection of one instance.
///
/// Always recovered by the sweep: the instance is skipped and the others
/// proceed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The instance answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Remote {
        url: String,
        status: u16,
        body: String,
    },

    /// The body was not a JSON array of flow objects.
    #[error("could not decode response from {url}: {source} (body: {body})")]
    Decode {
        url: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state file exists but could not be parsed.
    #[error("corrupt state file {path}: {source}")]
    StateFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (payload rendering, state store writes).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A git invocation exited unsuccessfully or could not be spawned.
    #[error("git {command} failed{}: {stderr}", exit_suffix(.status))]
    Git {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Bringing the working tree in line with the remote branch failed; the
    /// sweep is aborted before any instance is touched.
    #[error("could not sync working tree to remote head: {0}")]
    PreSync(#[source] Box<SyncError>),

    /// A single-instance sweep named an instance that is not enabled.
    #[error("instance '{0}' is not configured or not enabled")]
    UnknownInstance(InstanceName),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

fn exit_suffix(status: &Option<i32>) -> String {
    status.map(|code| format!(" (exit {code})")).unwrap_or_default()
}
