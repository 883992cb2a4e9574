//! Sweep pipeline behaviour against in-memory collaborators.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flowkeep_core::{Config, Flow, FlowId, GitIdentity, InstanceConfig, InstanceName};
use flowkeep_sync::{
    run_sweep, CommitStore, FetchError, FileStateStore, FlowSource, InstanceOutcome,
    PushFailure, PushOutcome, StateStore, SweepContext, SweepOptions, SyncError,
};
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Serves a fixed flow list per instance; instances without an entry answer
/// HTTP 500.
#[derive(Default)]
struct ScriptedSource {
    flows: RefCell<HashMap<String, Vec<Flow>>>,
}

impl ScriptedSource {
    fn set(&self, instance: &str, flows: Vec<Flow>) {
        self.flows.borrow_mut().insert(instance.to_string(), flows);
    }
}

impl FlowSource for ScriptedSource {
    fn fetch(&self, instance: &InstanceConfig) -> Result<Vec<Flow>, FetchError> {
        self.flows
            .borrow()
            .get(&instance.name.0)
            .cloned()
            .ok_or_else(|| FetchError::Remote {
                url: format!("{}/api/v1/chatflows", instance.url),
                status: 500,
                body: "Internal Server Error".to_string(),
            })
    }
}

/// Files under the managed scope, keyed by path relative to the root.
type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

/// Records every call and models the index: `stage` snapshots the managed
/// files on disk, `commit` turns the staged snapshot into `HEAD`.
#[derive(Default)]
struct RecordingCommitStore {
    root: PathBuf,
    calls: RefCell<Vec<String>>,
    staged: RefCell<Snapshot>,
    committed: RefCell<Snapshot>,
    remote_branch_exists: bool,
    fail_pre_sync: bool,
    fail_next_commit: Cell<bool>,
    push_outcome: Option<PushOutcome>,
}

fn commit_store(root: &Path) -> RecordingCommitStore {
    RecordingCommitStore {
        root: root.to_path_buf(),
        ..Default::default()
    }
}

impl RecordingCommitStore {
    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn commits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("commit:").map(str::to_string))
            .collect()
    }

    fn committed_paths(&self) -> Vec<PathBuf> {
        self.committed.borrow().keys().cloned().collect()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    fn snapshot(&self, paths: &[PathBuf]) -> Snapshot {
        let mut files = Snapshot::new();
        for path in paths {
            collect_files(&self.root, &self.root.join(path), &mut files);
        }
        files
    }
}

fn collect_files(root: &Path, path: &Path, files: &mut Snapshot) {
    if path.is_dir() {
        for entry in std::fs::read_dir(path).expect("read_dir") {
            collect_files(root, &entry.expect("entry").path(), files);
        }
    } else if path.is_file() {
        let relative = path.strip_prefix(root).expect("inside root").to_path_buf();
        files.insert(relative, std::fs::read(path).expect("read"));
    }
}

impl CommitStore for RecordingCommitStore {
    fn ensure_repository(&self) -> Result<bool, SyncError> {
        self.record("ensure_repository");
        Ok(false)
    }

    fn ensure_remote(&self, url: Option<&str>) -> Result<(), SyncError> {
        self.record(format!("ensure_remote:{}", url.unwrap_or("-")));
        Ok(())
    }

    fn remote_has_branch(&self, branch: &str) -> Result<bool, SyncError> {
        self.record(format!("remote_has_branch:{branch}"));
        Ok(self.remote_branch_exists)
    }

    fn sync_to_remote_head(&self, branch: &str) -> Result<(), SyncError> {
        self.record(format!("sync_to_remote_head:{branch}"));
        if self.fail_pre_sync {
            return Err(SyncError::Git {
                command: "fetch".to_string(),
                status: Some(128),
                stderr: "fatal: unable to access remote".to_string(),
            });
        }
        Ok(())
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<(), SyncError> {
        self.record(format!("stage:{}", paths.len()));
        *self.staged.borrow_mut() = self.snapshot(paths);
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool, SyncError> {
        Ok(*self.staged.borrow() != *self.committed.borrow())
    }

    fn commit(&self, message: &str) -> Result<(), SyncError> {
        if self.fail_next_commit.replace(false) {
            self.record("commit-failed");
            return Err(SyncError::Git {
                command: "commit".to_string(),
                status: Some(128),
                stderr: "fatal: Unable to create '.git/index.lock': File exists.".to_string(),
            });
        }
        self.record(format!("commit:{message}"));
        *self.committed.borrow_mut() = self.staged.borrow().clone();
        Ok(())
    }

    fn push(&self, branch: &str) -> PushOutcome {
        self.record(format!("push:{branch}"));
        self.push_outcome.clone().unwrap_or(PushOutcome::Pushed)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn instance(name: &str) -> InstanceConfig {
    InstanceConfig {
        name: InstanceName::from(name),
        url: format!("http://{name}.example.com"),
        api_key: "key".to_string(),
        enabled: true,
    }
}

fn config(root: &Path, remote: Option<&str>, instances: Vec<InstanceConfig>) -> Config {
    Config {
        repo_dir: root.to_path_buf(),
        remote_url: remote.map(str::to_string),
        branch: "main".to_string(),
        interval_minutes: 1,
        request_timeout: Duration::from_secs(5),
        git_identity: GitIdentity::default(),
        instances,
    }
}

fn test_flow() -> Flow {
    serde_json::from_value(json!({
        "id": "abc123",
        "name": "Test Flow",
        "flowData": "{\"a\":1}",
        "updatedDate": "T1",
        "type": "chatflow"
    }))
    .expect("flow")
}

fn sweep(
    cfg: &Config,
    source: &ScriptedSource,
    commits: &RecordingCommitStore,
    options: &SweepOptions,
) -> Result<flowkeep_sync::SweepReport, SyncError> {
    let states = FileStateStore::new(&cfg.repo_dir);
    let ctx = SweepContext {
        source,
        states: &states,
        commits,
    };
    run_sweep(cfg, &ctx, options)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn first_sweep_writes_records_and_commits() {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = TempDir::new().expect("root");
    let cfg = config(root.path(), None, vec![instance("inst")]);
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = commit_store(root.path());

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");

    let written = root
        .path()
        .join("flows/inst/chatflow/Test_Flow_id_3123.json");
    assert_eq!(
        std::fs::read_to_string(&written).expect("flow file"),
        "{\n  \"a\": 1\n}\n"
    );
    let state = FileStateStore::new(root.path())
        .load(&InstanceName::from("inst"))
        .expect("state");
    assert_eq!(state[&FlowId::from("abc123")].updated_at, "T1");

    assert_eq!(report.updated(), 1);
    assert_eq!(report.archived(), 0);
    assert_eq!(report.commit.as_deref(), Some("Sync: 1 updated flow(s)"));
    assert_eq!(report.push, None, "no remote configured, nothing pushed");
    assert!(
        commits.calls().contains(&"stage:2".to_string()),
        "flows dir + state file staged: {:?}",
        commits.calls()
    );
    assert_eq!(
        commits.committed_paths(),
        vec![
            PathBuf::from(".flow_state_inst.json"),
            PathBuf::from("flows/inst/chatflow/Test_Flow_id_3123.json"),
        ]
    );
}

#[test]
fn failed_commit_is_retried_on_next_sweep() {
    let root = TempDir::new().expect("root");
    let cfg = config(root.path(), None, vec![instance("inst")]);
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = commit_store(root.path());
    commits.fail_next_commit.set(true);

    let err = sweep(&cfg, &source, &commits, &SweepOptions::default()).unwrap_err();
    assert!(
        matches!(&err, SyncError::Git { command, .. } if command == "commit"),
        "got: {err}"
    );
    assert!(commits.committed_paths().is_empty());
    assert!(root.path().join(".flow_state_inst.json").exists());

    // Upstream is unchanged, so this pass writes nothing new of its own.
    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("retry");
    assert_eq!(report.updated(), 0);
    assert_eq!(report.commit.as_deref(), Some("Sync: refresh flow state"));
    assert_eq!(
        commits.committed_paths(),
        vec![
            PathBuf::from(".flow_state_inst.json"),
            PathBuf::from("flows/inst/chatflow/Test_Flow_id_3123.json"),
        ]
    );

    let settled = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("settled");
    assert_eq!(settled.commit, None);
}

#[test]
fn staging_covers_state_of_every_configured_instance() {
    let root = TempDir::new().expect("root");
    let mut disabled = instance("dev");
    disabled.enabled = false;
    let cfg = config(root.path(), None, vec![disabled, instance("prod")]);
    let source = ScriptedSource::default();
    source.set("prod", vec![]);
    let commits = commit_store(root.path());

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");

    assert!(commits.calls().contains(&"stage:3".to_string()), "{:?}", commits.calls());
    assert_eq!(report.commit, None, "nothing on disk, nothing to commit");
}

#[test]
fn unchanged_remote_produces_no_commit() {
    let root = TempDir::new().expect("root");
    let cfg = config(root.path(), None, vec![instance("inst")]);
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = commit_store(root.path());

    sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("first");
    let second = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("second");

    assert_eq!(second.updated(), 0);
    assert_eq!(second.archived(), 0);
    assert_eq!(second.commit, None);
    assert_eq!(commits.commits().len(), 1);
}

#[test]
fn deleted_upstream_is_archived_and_committed() {
    let root = TempDir::new().expect("root");
    let cfg = config(root.path(), None, vec![instance("inst")]);
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = commit_store(root.path());
    sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("first");

    source.set("inst", vec![]);
    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("second");

    assert_eq!(report.archived(), 1);
    assert_eq!(report.commit.as_deref(), Some("Sync: 1 archived flow(s)"));
    assert!(root
        .path()
        .join("flows/inst/chatflow/deleted/Test_Flow_id_3123.json")
        .exists());
    let state = FileStateStore::new(root.path())
        .load(&InstanceName::from("inst"))
        .expect("state");
    assert!(state.is_empty());
}

#[test]
fn failing_instance_does_not_block_the_others() {
    let root = TempDir::new().expect("root");
    let cfg = config(root.path(), None, vec![instance("dev"), instance("prod")]);
    let source = ScriptedSource::default();
    source.set("prod", vec![test_flow()]);
    let commits = commit_store(root.path());

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");

    let failed: Vec<_> = report.failed().map(|r| r.instance.0.clone()).collect();
    assert_eq!(failed, vec!["dev".to_string()]);
    match &report.instances[0].outcome {
        InstanceOutcome::Failed { error } => assert!(error.contains("HTTP 500"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(root
        .path()
        .join("flows/prod/chatflow/Test_Flow_id_3123.json")
        .exists());
    assert_eq!(report.commit.as_deref(), Some("Sync: 1 updated flow(s)"));
}

#[test]
fn pre_sync_failure_aborts_before_any_instance() {
    let root = TempDir::new().expect("root");
    let cfg = config(
        root.path(),
        Some("git@example.com:flows.git"),
        vec![instance("inst")],
    );
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = RecordingCommitStore {
        remote_branch_exists: true,
        fail_pre_sync: true,
        ..commit_store(root.path())
    };

    let err = sweep(&cfg, &source, &commits, &SweepOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::PreSync(_)), "got: {err}");
    assert!(!root.path().join("flows").exists(), "no instance touched");
    assert!(!commits.calls().iter().any(|c| c.starts_with("stage")));
}

#[test]
fn existing_remote_branch_is_synced_then_pushed() {
    let root = TempDir::new().expect("root");
    let cfg = config(
        root.path(),
        Some("git@example.com:flows.git"),
        vec![instance("inst")],
    );
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = RecordingCommitStore {
        remote_branch_exists: true,
        ..commit_store(root.path())
    };

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");

    let calls = commits.calls();
    assert_eq!(calls[0], "ensure_repository");
    assert_eq!(calls[1], "ensure_remote:git@example.com:flows.git");
    assert_eq!(calls[2], "remote_has_branch:main");
    assert_eq!(calls[3], "sync_to_remote_head:main");
    assert_eq!(calls.last().map(String::as_str), Some("push:main"));
    assert_eq!(report.push, Some(PushOutcome::Pushed));
}

#[test]
fn nothing_to_push_when_remote_is_current() {
    let root = TempDir::new().expect("root");
    let cfg = config(
        root.path(),
        Some("git@example.com:flows.git"),
        vec![instance("inst")],
    );
    let source = ScriptedSource::default();
    source.set("inst", vec![]);
    let commits = RecordingCommitStore {
        remote_branch_exists: true,
        ..commit_store(root.path())
    };

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");
    assert_eq!(report.push, None);
    assert!(!commits.calls().iter().any(|c| c.starts_with("push")));
}

#[test]
fn rejected_push_keeps_the_commit() {
    let root = TempDir::new().expect("root");
    let cfg = config(
        root.path(),
        Some("git@example.com:flows.git"),
        vec![instance("inst")],
    );
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let rejected = PushOutcome::Rejected {
        kind: PushFailure::Access,
        message: "Permission denied (publickey)".to_string(),
    };
    let commits = RecordingCommitStore {
        push_outcome: Some(rejected.clone()),
        ..commit_store(root.path())
    };

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");
    assert_eq!(report.push, Some(rejected));
    assert_eq!(commits.commits(), vec!["Sync: 1 updated flow(s)".to_string()]);
    assert!(root
        .path()
        .join("flows/inst/chatflow/Test_Flow_id_3123.json")
        .exists());
}

#[test]
fn skip_push_commits_locally_only() {
    let root = TempDir::new().expect("root");
    let cfg = config(
        root.path(),
        Some("git@example.com:flows.git"),
        vec![instance("inst")],
    );
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = commit_store(root.path());
    let options = SweepOptions {
        skip_push: true,
        ..Default::default()
    };

    let report = sweep(&cfg, &source, &commits, &options).expect("sweep");
    assert!(report.commit.is_some());
    assert_eq!(report.push, None);
}

#[test]
fn dry_run_touches_neither_files_nor_git() {
    let root = TempDir::new().expect("root");
    let cfg = config(
        root.path(),
        Some("git@example.com:flows.git"),
        vec![instance("inst")],
    );
    let source = ScriptedSource::default();
    source.set("inst", vec![test_flow()]);
    let commits = commit_store(root.path());
    let options = SweepOptions {
        dry_run: true,
        ..Default::default()
    };

    let report = sweep(&cfg, &source, &commits, &options).expect("sweep");
    assert_eq!(report.updated(), 1);
    assert!(report.dry_run);
    assert!(commits.calls().is_empty());
    assert!(!root.path().join("flows").exists());
    assert!(!root.path().join(".flow_state_inst.json").exists());
}

#[test]
fn only_restricts_to_one_instance() {
    let root = TempDir::new().expect("root");
    let cfg = config(root.path(), None, vec![instance("dev"), instance("prod")]);
    let source = ScriptedSource::default();
    source.set("prod", vec![test_flow()]);
    let commits = commit_store(root.path());
    let options = SweepOptions {
        only: Some(InstanceName::from("prod")),
        ..Default::default()
    };

    let report = sweep(&cfg, &source, &commits, &options).expect("sweep");
    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.failed().count(), 0);

    let unknown = SweepOptions {
        only: Some(InstanceName::from("staging")),
        ..Default::default()
    };
    let err = sweep(&cfg, &source, &commits, &unknown).unwrap_err();
    assert!(matches!(err, SyncError::UnknownInstance(_)), "got: {err}");
}

#[test]
fn disabled_instances_are_not_fetched() {
    let root = TempDir::new().expect("root");
    let mut disabled = instance("dev");
    disabled.enabled = false;
    let cfg = config(root.path(), None, vec![disabled, instance("prod")]);
    let source = ScriptedSource::default();
    source.set("prod", vec![]);
    let commits = commit_store(root.path());

    let report = sweep(&cfg, &source, &commits, &SweepOptions::default()).expect("sweep");
    let names: Vec<_> = report.instances.iter().map(|r| r.instance.0.as_str()).collect();
    assert_eq!(names, vec!["prod"]);
}
