use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use flowkeep_core::Config;
use flowkeep_sync::{
    pipeline, InstanceOutcome, PushFailure, PushOutcome, SweepOptions, SweepReport, SyncError,
};

use crate::error::{io_err, DaemonError};

/// Set to `json` to emit one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "FLOWKEEP_LOG_FORMAT";

/// Executes one sweep for a freshly loaded configuration.
pub trait SweepRunner: Send {
    fn run(&mut self, config: &Config) -> Result<SweepReport, SyncError>;
}

/// Sweeps the live instances into the git working tree.
#[derive(Debug, Default)]
pub struct LiveRunner;

impl SweepRunner for LiveRunner {
    fn run(&mut self, config: &Config) -> Result<SweepReport, SyncError> {
        pipeline::run(config, &SweepOptions::default())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedInstance {
    pub instance: String,
    pub error: String,
}

/// Serializable digest of a [`SweepReport`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub instances: usize,
    pub updated: usize,
    pub archived: usize,
    pub failed: Vec<FailedInstance>,
    pub commit: Option<String>,
    pub push: Option<String>,
    pub duration_ms: u128,
}

impl From<&SweepReport> for SweepSummary {
    fn from(report: &SweepReport) -> Self {
        let failed = report
            .instances
            .iter()
            .filter_map(|r| match &r.outcome {
                InstanceOutcome::Failed { error } => Some(FailedInstance {
                    instance: r.instance.to_string(),
                    error: error.clone(),
                }),
                InstanceOutcome::Synced { .. } => None,
            })
            .collect();

        Self {
            started_at: report.started_at,
            dry_run: report.dry_run,
            instances: report.instances.len(),
            updated: report.updated(),
            archived: report.archived(),
            failed,
            commit: report.commit.clone(),
            push: report.push.as_ref().map(push_label),
            duration_ms: report.duration_ms,
        }
    }
}

fn push_label(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Pushed => "pushed".to_string(),
        PushOutcome::NoRemote => "no-remote".to_string(),
        PushOutcome::Rejected {
            kind: PushFailure::Access,
            ..
        } => "rejected (access)".to_string(),
        PushOutcome::Rejected {
            kind: PushFailure::Unexpected,
            ..
        } => "rejected".to_string(),
    }
}

/// Owns the configuration and the sweep implementation between ticks.
pub struct Scheduler {
    config_path: PathBuf,
    config: Config,
    runner: Box<dyn SweepRunner>,
}

impl Scheduler {
    /// Load `config_path` and sweep live instances. A configuration error
    /// here is fatal.
    pub fn new(config_path: &Path) -> Result<Self, DaemonError> {
        let config = Config::load_at(config_path)?;
        Ok(Self::with_runner(config_path, config, Box::new(LiveRunner)))
    }

    pub fn with_runner(
        config_path: impl Into<PathBuf>,
        config: Config,
        runner: Box<dyn SweepRunner>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            config,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    /// Reload the configuration, then run one sweep.
    ///
    /// On a reload failure the sweep is skipped and the previous configuration
    /// (and so the previous interval) stays in effect. A panicking runner is
    /// reported as [`DaemonError::Runtime`]; the scheduler stays usable.
    pub fn run_sweep(&mut self) -> Result<SweepSummary, DaemonError> {
        self.config = Config::load_at(&self.config_path)?;
        let (runner, config) = (&mut self.runner, &self.config);
        let report = panic::catch_unwind(AssertUnwindSafe(|| runner.run(config)))
            .map_err(|payload| {
                DaemonError::Runtime(format!("sweep panicked: {}", panic_message(&*payload)))
            })??;
        Ok(SweepSummary::from(&report))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Start the scheduler and block the current thread until it exits.
pub fn start_blocking(config_path: &Path) -> Result<(), DaemonError> {
    let scheduler = Scheduler::new(config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(scheduler))
}

/// Run sweeps until ctrl-c. An in-flight sweep always completes first.
pub async fn run(scheduler: Scheduler) -> Result<(), DaemonError> {
    tracing::info!(
        config = %scheduler.config_path.display(),
        repo = %scheduler.config.repo_dir.display(),
        interval_secs = scheduler.interval().as_secs(),
        instances = scheduler.config.enabled_instances().count(),
        "scheduler started"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let sweep_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = sweep_loop(scheduler, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, stopping after the current sweep");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (sweep_result, signal_result) = tokio::join!(sweep_handle, signal_handle);
    handle_join("sweep_loop", sweep_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("scheduler stopped");
    Ok(())
}

async fn sweep_loop(
    mut scheduler: Scheduler,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut period = scheduler.interval();
    // First tick fires immediately.
    let mut ticker = sweep_interval(Instant::now(), period);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let (returned, outcome) = tokio::task::spawn_blocking(move || {
                    let outcome = scheduler.run_sweep();
                    (scheduler, outcome)
                })
                .await
                .map_err(|err| DaemonError::Runtime(format!("sweep task join error: {err}")))?;
                scheduler = returned;
                log_sweep(outcome);

                let reloaded = scheduler.interval();
                if reloaded != period {
                    tracing::info!(
                        interval_secs = reloaded.as_secs(),
                        "sweep interval changed"
                    );
                    period = reloaded;
                    ticker = sweep_interval(Instant::now() + period, period);
                }
            }
        }
    }
    Ok(())
}

fn sweep_interval(start: Instant, period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(start, period);
    // A sweep that overruns the period pushes the next one back instead of
    // triggering a burst.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn log_sweep(outcome: Result<SweepSummary, DaemonError>) {
    match outcome {
        Ok(summary) => {
            for failed in &summary.failed {
                tracing::warn!(
                    instance = %failed.instance,
                    error = %failed.error,
                    "instance skipped this sweep"
                );
            }
            tracing::info!(
                instances = summary.instances,
                updated = summary.updated,
                archived = summary.archived,
                failed = summary.failed.len(),
                commit = summary.commit.as_deref().unwrap_or("-"),
                push = summary.push.as_deref().unwrap_or("-"),
                duration_ms = summary.duration_ms as u64,
                "sweep complete"
            );
        }
        Err(DaemonError::Config(err)) => {
            tracing::error!(error = %err, "configuration reload failed; sweep skipped");
        }
        Err(err) => {
            tracing::error!(error = %err, "sweep failed; waiting for the next tick");
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn json_logs() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|value| value.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), human
/// or JSON lines on stderr. Records from the `log` facade are forwarded.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
