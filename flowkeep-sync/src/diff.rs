//! Dry-run unified diff support for `flowkeep diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use flowkeep_core::{Config, InstanceName};

use crate::{
    error::io_err, fetch::FlowSource, layout, reconcile::reconcile, state_store::StateStore,
    writer, ArchiveResult, SyncError,
};

/// A single flow file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Relative to the repository root.
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Diff result for an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffInstanceResult {
    pub instance: InstanceName,
    pub diffs: Vec<FileDiff>,
    /// Files the next sync would move under `deleted/`.
    pub archivals: Vec<ArchiveResult>,
}

/// Fetch `instance` and compare what a sync would write against the files on
/// disk, including local edits a sync would overwrite.
///
/// No files are written.
pub fn diff_instance(
    config: &Config,
    source: &dyn FlowSource,
    states: &dyn StateStore,
    instance: &InstanceName,
) -> Result<DiffInstanceResult, SyncError> {
    let instance_config = config
        .enabled_instances()
        .find(|candidate| &candidate.name == instance)
        .ok_or_else(|| SyncError::UnknownInstance(instance.clone()))?;

    let mut flows = source.fetch(instance_config)?;
    flows.sort_by(|a, b| a.id.cmp(&b.id));
    flows.dedup_by(|later, earlier| later.id == earlier.id);

    let mut diffs = Vec::new();
    for flow in &flows {
        let Ok(Some(document)) = flow.payload_document() else {
            continue;
        };
        let rendered = writer::render_document(&document)?;
        let relative = layout::live_path(
            instance,
            flow.category(),
            &layout::derived_name(&flow.name, &flow.id),
        );
        let existing = read_existing_or_empty(&config.repo_dir.join(&relative))?;
        if existing == rendered {
            continue;
        }

        let old_header = format!("a/{}", relative.display());
        let new_header = format!("b/{}", relative.display());
        let unified = TextDiff::from_lines(&existing, &rendered)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        diffs.push(FileDiff {
            path: relative,
            unified_diff: unified,
        });
    }

    let last_state = states.load(instance)?;
    let plan = reconcile(&config.repo_dir, instance, &flows, &last_state, true)?;

    Ok(DiffInstanceResult {
        instance: instance.clone(),
        diffs,
        archivals: plan.archivals,
    })
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.replace("\r\n", "\n")),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}
