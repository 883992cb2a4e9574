//! Sweep pipeline: one reconciliation pass over every enabled instance.
//!
//! This is the canonical entrypoint for both `flowkeep sync` and the
//! scheduler. Order of operations:
//!
//! 1. ensure repository + remote (skipped in dry-run);
//! 2. reset the working tree to the remote branch when it exists; a failure
//!    here aborts the sweep before any instance is touched;
//! 3. per instance, sequentially: fetch → reconcile → save state. Failures
//!    are recorded in the report and the sweep moves on;
//! 4. stage the whole managed scope (`flows/` plus every state file), commit
//!    whatever differs from `HEAD`, then push. Leftovers from a sweep whose
//!    commit failed are picked up by the next one.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};

use flowkeep_core::{Config, InstanceConfig, InstanceName};

use crate::commit_store::{commit_message, CommitStore, GitCli, PushFailure, PushOutcome};
use crate::error::SyncError;
use crate::fetch::{FlowSource, HttpFlowSource};
use crate::layout;
use crate::reconcile::reconcile;
use crate::state_store::{FileStateStore, StateStore};
use crate::writer::{ArchiveResult, WriteResult};

/// Knobs for a single sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOptions {
    /// Report what would change without touching files, state or git.
    pub dry_run: bool,
    /// Commit locally but do not push.
    pub skip_push: bool,
    /// Restrict the sweep to one enabled instance.
    pub only: Option<InstanceName>,
}

/// What happened to one instance during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceOutcome {
    Synced {
        writes: Vec<WriteResult>,
        archivals: Vec<ArchiveResult>,
        skipped: usize,
        state_saved: bool,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReport {
    pub instance: InstanceName,
    pub outcome: InstanceOutcome,
}

/// Aggregate result of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub dry_run: bool,
    pub instances: Vec<InstanceReport>,
    /// Commit message, when a commit was made.
    pub commit: Option<String>,
    /// Push outcome, when a push was attempted.
    pub push: Option<PushOutcome>,
}

impl SweepReport {
    pub fn updated(&self) -> usize {
        self.synced().map(|(writes, _)| writes.len()).sum()
    }

    pub fn archived(&self) -> usize {
        self.synced().map(|(_, archivals)| archivals.len()).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances
            .iter()
            .filter(|report| matches!(report.outcome, InstanceOutcome::Failed { .. }))
    }

    fn synced(&self) -> impl Iterator<Item = (&[WriteResult], &[ArchiveResult])> {
        self.instances.iter().filter_map(|report| match &report.outcome {
            InstanceOutcome::Synced {
                writes, archivals, ..
            } => Some((writes.as_slice(), archivals.as_slice())),
            InstanceOutcome::Failed { .. } => None,
        })
    }
}

/// Collaborators of a sweep.
pub struct SweepContext<'a> {
    pub source: &'a dyn FlowSource,
    pub states: &'a dyn StateStore,
    pub commits: &'a dyn CommitStore,
}

/// Run one sweep against the live instances and the git working tree at
/// `config.repo_dir`.
pub fn run(config: &Config, options: &SweepOptions) -> Result<SweepReport, SyncError> {
    let source = HttpFlowSource::new(config.request_timeout);
    let states = FileStateStore::new(&config.repo_dir);
    let commits = GitCli::new(
        &config.repo_dir,
        &config.branch,
        config.git_identity.clone(),
        config.request_timeout,
    );
    let ctx = SweepContext {
        source: &source,
        states: &states,
        commits: &commits,
    };
    run_sweep(config, &ctx, options)
}

/// Run one sweep with explicit collaborators.
///
/// Returns `Err` only for failures that affect the shared repository
/// (pre-sync, staging, committing) or an unknown `only` instance; everything
/// local to one instance is captured in the report.
pub fn run_sweep(
    config: &Config,
    ctx: &SweepContext<'_>,
    options: &SweepOptions,
) -> Result<SweepReport, SyncError> {
    let started_at = Utc::now();
    let started = Instant::now();

    let instances = select_instances(config, options.only.as_ref())?;

    let mut remote_had_branch = false;
    if !options.dry_run {
        ctx.commits.ensure_repository()?;
        ctx.commits.ensure_remote(config.remote_url.as_deref())?;
        if config.remote_url.is_some() {
            remote_had_branch = ctx
                .commits
                .remote_has_branch(&config.branch)
                .map_err(|err| SyncError::PreSync(Box::new(err)))?;
            if remote_had_branch {
                ctx.commits
                    .sync_to_remote_head(&config.branch)
                    .map_err(|err| SyncError::PreSync(Box::new(err)))?;
            }
        }
    }

    let mut reports = Vec::with_capacity(instances.len());
    for instance in instances {
        let outcome = match sync_instance(config, ctx, instance, options.dry_run) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("instance {}: sync failed: {}", instance.name, err);
                InstanceOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        reports.push(InstanceReport {
            instance: instance.name.clone(),
            outcome,
        });
    }

    let mut report = SweepReport {
        started_at,
        duration_ms: 0,
        dry_run: options.dry_run,
        instances: reports,
        commit: None,
        push: None,
    };

    if !options.dry_run {
        ctx.commits.stage(&managed_paths(config, ctx.states))?;
        if ctx.commits.has_staged_changes()? {
            let message = commit_message(report.updated(), report.archived());
            ctx.commits.commit(&message)?;
            tracing::info!("committed: {}", message);
            report.commit = Some(message);
        }

        // Without a remote branch, earlier local commits may still be unpushed.
        let unpushed = report.commit.is_some() || !remote_had_branch;
        if config.remote_url.is_some() && !options.skip_push && unpushed {
            let outcome = ctx.commits.push(&config.branch);
            log_push_outcome(&outcome, &config.branch);
            report.push = Some(outcome);
        }
    }

    report.duration_ms = started.elapsed().as_millis();
    Ok(report)
}

fn select_instances<'c>(
    config: &'c Config,
    only: Option<&InstanceName>,
) -> Result<Vec<&'c InstanceConfig>, SyncError> {
    let enabled: Vec<&InstanceConfig> = config.enabled_instances().collect();
    match only {
        None => Ok(enabled),
        Some(name) => enabled
            .into_iter()
            .find(|instance| &instance.name == name)
            .map(|instance| vec![instance])
            .ok_or_else(|| SyncError::UnknownInstance(name.clone())),
    }
}

/// Everything flowkeep owns inside the repository, relative to its root.
fn managed_paths(config: &Config, states: &dyn StateStore) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(layout::FLOWS_DIR)];
    paths.extend(
        config
            .instances
            .iter()
            .filter_map(|instance| states.tracked_path(&instance.name)),
    );
    paths
}

fn sync_instance(
    config: &Config,
    ctx: &SweepContext<'_>,
    instance: &InstanceConfig,
    dry_run: bool,
) -> Result<InstanceOutcome, SyncError> {
    let flows = ctx.source.fetch(instance)?;
    let last_state = ctx.states.load(&instance.name)?;
    let result = reconcile(&config.repo_dir, &instance.name, &flows, &last_state, dry_run)?;

    let state_saved = result.state != last_state && !dry_run;
    if state_saved {
        ctx.states.save(&instance.name, &result.state)?;
    }

    tracing::info!(
        "instance {}: {} flow(s) fetched, {} written, {} archived",
        instance.name,
        flows.len(),
        result.writes.len(),
        result.archivals.len()
    );

    Ok(InstanceOutcome::Synced {
        writes: result.writes,
        archivals: result.archivals,
        skipped: result.skipped.len(),
        state_saved,
    })
}

fn log_push_outcome(outcome: &PushOutcome, branch: &str) {
    match outcome {
        PushOutcome::Pushed => tracing::info!("pushed to remote branch {}", branch),
        PushOutcome::NoRemote => {
            tracing::warn!("no git remote configured; commits remain local")
        }
        PushOutcome::Rejected {
            kind: PushFailure::Access,
            message,
        } => tracing::error!(
            "push rejected: the remote is missing or credentials lack write access. \
             Check remote_url and the deploy key/token. Local commits and files are intact \
             and will be pushed on a later sweep. git said: {}",
            message
        ),
        PushOutcome::Rejected {
            kind: PushFailure::Unexpected,
            message,
        } => tracing::error!("push failed unexpectedly: {}", message),
    }
}
