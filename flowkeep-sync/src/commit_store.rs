//! Commit store: the version-control backend behind the flow history.
//!
//! Lifecycle across one sweep:
//!
//! ```text
//! UNINITIALIZED -ensure_repository-> READY
//!   -sync_to_remote_head (remote branch exists)-> SYNCED
//!   -stage + commit (non-empty diff)-> COMMITTED
//!   -push-> PUSHED | PUSH_FAILED
//! ```
//!
//! A failed push never rolls back the local commit. [`GitCli`] drives the
//! `git` binary; tests substitute a recording implementation of
//! [`CommitStore`].

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use flowkeep_core::GitIdentity;

use crate::error::{io_err, SyncError};
use crate::layout;

pub const REMOTE_NAME: &str = "origin";

const INITIAL_COMMIT_MESSAGE: &str = "Initial commit: machine-managed flow history";

const README_CONTENT: &str = "\
# Flow history

**This repository is managed by flowkeep. Do not edit it by hand.**

Every sync overwrites local changes with the state reported by the configured
instances. Live flows are stored under `flows/<instance>/<category>/`; flows
removed upstream are moved to `flows/<instance>/<category>/deleted/`.
";

/// Why a push did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailure {
    /// Missing remote, bad credentials or insufficient permissions.
    Access,
    Unexpected,
}

/// Outcome of [`CommitStore::push`]; push problems are reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// No remote is configured; commits stay local.
    NoRemote,
    Rejected { kind: PushFailure, message: String },
}

/// Version-control operations the sweep relies on.
pub trait CommitStore {
    /// Initialize the repository when absent. Returns `true` when created.
    fn ensure_repository(&self) -> Result<bool, SyncError>;

    /// Point the remote at `url` when supplied and different.
    fn ensure_remote(&self, url: Option<&str>) -> Result<(), SyncError>;

    /// Whether the remote has `branch`, without fetching its contents.
    fn remote_has_branch(&self, branch: &str) -> Result<bool, SyncError>;

    /// Fetch `branch` and force the local branch, index and tree to match it.
    fn sync_to_remote_head(&self, branch: &str) -> Result<(), SyncError>;

    /// Stage `paths` (relative to the repository root), including removals.
    fn stage(&self, paths: &[PathBuf]) -> Result<(), SyncError>;

    fn has_staged_changes(&self) -> Result<bool, SyncError>;

    fn commit(&self, message: &str) -> Result<(), SyncError>;

    fn push(&self, branch: &str) -> PushOutcome;
}

/// `Sync: <N> updated, <M> archived flow(s)`, omitting zero clauses.
pub fn commit_message(updated: usize, archived: usize) -> String {
    match (updated, archived) {
        (0, 0) => "Sync: refresh flow state".to_string(),
        (n, 0) => format!("Sync: {n} updated flow(s)"),
        (0, m) => format!("Sync: {m} archived flow(s)"),
        (n, m) => format!("Sync: {n} updated, {m} archived flow(s)"),
    }
}

/// Classify a failed push from git's stderr.
pub fn classify_push_failure(stderr: &str) -> PushFailure {
    const ACCESS_MARKERS: &[&str] = &[
        "permission denied",
        "authentication failed",
        "could not read username",
        "could not read password",
        "terminal prompts disabled",
        "access denied",
        "repository not found",
        "does not appear to be a git repository",
        "no such remote",
        "the requested url returned error: 401",
        "the requested url returned error: 403",
    ];
    let lower = stderr.to_ascii_lowercase();
    if ACCESS_MARKERS.iter().any(|marker| lower.contains(marker)) {
        PushFailure::Access
    } else {
        PushFailure::Unexpected
    }
}

// ---------------------------------------------------------------------------
// git subprocess implementation
// ---------------------------------------------------------------------------

/// [`CommitStore`] that shells out to `git` in `root`.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    branch: String,
    identity: GitIdentity,
    network_timeout: Duration,
}

impl GitCli {
    pub fn new(
        root: impl Into<PathBuf>,
        branch: impl Into<String>,
        identity: GitIdentity,
        network_timeout: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            branch: branch.into(),
            identity,
            network_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.root)
            .arg("-c")
            .arg(format!("user.name={}", self.identity.name))
            .arg("-c")
            .arg(format!("user.email={}", self.identity.email))
            .arg("-c")
            .arg("commit.gpgsign=false")
            .arg("-c")
            .arg("http.lowSpeedLimit=1000")
            .arg("-c")
            .arg(format!(
                "http.lowSpeedTime={}",
                self.network_timeout.as_secs().max(1)
            ))
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");
        if std::env::var_os("GIT_SSH_COMMAND").is_none() {
            cmd.env(
                "GIT_SSH_COMMAND",
                format!(
                    "ssh -o BatchMode=yes -o ConnectTimeout={}",
                    self.network_timeout.as_secs().max(1)
                ),
            );
        }
        cmd
    }

    /// Run git and return its output whatever the exit status.
    fn output(&self, args: &[&str]) -> Result<Output, SyncError> {
        tracing::debug!("git {}", args.join(" "));
        self.command(args).output().map_err(|e| SyncError::Git {
            command: args.join(" "),
            status: None,
            stderr: e.to_string(),
        })
    }

    /// Run git, failing on a non-zero exit; returns trimmed stdout.
    fn run(&self, args: &[&str]) -> Result<String, SyncError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(git_failure(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn configured_remote(&self) -> Result<Option<String>, SyncError> {
        let output = self.output(&["remote", "get-url", REMOTE_NAME])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }
}

fn git_failure(args: &[&str], output: &Output) -> SyncError {
    SyncError::Git {
        command: args.join(" "),
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

impl CommitStore for GitCli {
    fn ensure_repository(&self) -> Result<bool, SyncError> {
        if self.root.join(".git").exists() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;

        tracing::info!("initializing flow history repository at {}", self.root.display());
        self.run(&["init", "--quiet"])?;
        let head = format!("refs/heads/{}", self.branch);
        self.run(&["symbolic-ref", "HEAD", &head])?;

        let readme = self.root.join(layout::README_FILE);
        if !readme.exists() {
            std::fs::write(&readme, README_CONTENT).map_err(|e| io_err(&readme, e))?;
        }
        self.run(&["add", "--", layout::README_FILE])?;
        self.run(&["commit", "--quiet", "-m", INITIAL_COMMIT_MESSAGE])?;
        Ok(true)
    }

    fn ensure_remote(&self, url: Option<&str>) -> Result<(), SyncError> {
        let Some(url) = url else {
            tracing::warn!("no remote_url configured; commits stay local and pushing is disabled");
            return Ok(());
        };
        match self.configured_remote()? {
            Some(current) if current == url => {}
            Some(_) => {
                tracing::info!("re-pointing remote {} to {}", REMOTE_NAME, url);
                self.run(&["remote", "set-url", REMOTE_NAME, url])?;
            }
            None => {
                tracing::info!("adding remote {} -> {}", REMOTE_NAME, url);
                self.run(&["remote", "add", REMOTE_NAME, url])?;
            }
        }
        Ok(())
    }

    fn remote_has_branch(&self, branch: &str) -> Result<bool, SyncError> {
        let args = ["ls-remote", "--exit-code", "--heads", REMOTE_NAME, branch];
        let output = self.output(&args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            // --exit-code: 2 means the remote answered without matching refs.
            Some(2) => Ok(false),
            _ => Err(git_failure(&args, &output)),
        }
    }

    fn sync_to_remote_head(&self, branch: &str) -> Result<(), SyncError> {
        let tracking = format!("{REMOTE_NAME}/{branch}");
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{tracking}");
        self.run(&["fetch", "--quiet", REMOTE_NAME, &refspec])?;
        self.run(&["checkout", "--quiet", "--force", "-B", branch, &tracking])?;
        self.run(&["reset", "--quiet", "--hard", &tracking])?;
        self.run(&["clean", "-fdq", "--", layout::FLOWS_DIR, ".flow_state_*"])?;
        tracing::info!("working tree reset to {}", tracking);
        Ok(())
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<(), SyncError> {
        let (present, missing): (Vec<&PathBuf>, Vec<&PathBuf>) =
            paths.iter().partition(|path| self.root.join(path).exists());

        if !present.is_empty() {
            let mut args = vec!["add", "-A", "--"];
            args.extend(present.iter().filter_map(|p| p.to_str()));
            self.run(&args)?;
        }
        if !missing.is_empty() {
            let mut args = vec!["rm", "-r", "--cached", "--ignore-unmatch", "--quiet", "--"];
            args.extend(missing.iter().filter_map(|p| p.to_str()));
            self.run(&args)?;
        }
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool, SyncError> {
        let args = ["diff", "--cached", "--quiet"];
        let output = self.output(&args)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(git_failure(&args, &output)),
        }
    }

    fn commit(&self, message: &str) -> Result<(), SyncError> {
        self.run(&["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    fn push(&self, branch: &str) -> PushOutcome {
        match self.configured_remote() {
            Ok(Some(_)) => {}
            Ok(None) => return PushOutcome::NoRemote,
            Err(err) => {
                return PushOutcome::Rejected {
                    kind: PushFailure::Unexpected,
                    message: err.to_string(),
                }
            }
        }

        let refspec = format!("HEAD:refs/heads/{branch}");
        match self.output(&["push", "--quiet", REMOTE_NAME, &refspec]) {
            Ok(output) if output.status.success() => PushOutcome::Pushed,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                PushOutcome::Rejected {
                    kind: classify_push_failure(&stderr),
                    message: stderr,
                }
            }
            Err(err) => PushOutcome::Rejected {
                kind: PushFailure::Unexpected,
                message: err.to_string(),
            },
        }
    }
}
