//! State store: last-observed metadata per flow, used for change detection.
//!
//! The file-backed store persists one JSON object per instance at
//! `<repo>/.flow_state_<instance>.json`:
//!
//! ```json
//! { "<id>": { "updatedAt": "...", "name": "...", "fileName": "...", "type": "..." } }
//! ```
//!
//! Writes use the atomic `.tmp` + rename pattern. The file lives inside the
//! working tree so it is committed together with the flow files it describes.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use flowkeep_core::{FlowId, InstanceName, UNCATEGORIZED};

use crate::error::{io_err, SyncError};
use crate::layout;

/// Recorded metadata of one materialized flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFlow {
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,

    /// Raw human name as last seen upstream.
    #[serde(default)]
    pub name: String,

    /// Derived file name; absent in state written by older releases.
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(rename = "type", default = "uncategorized")]
    pub category: String,
}

fn uncategorized() -> String {
    UNCATEGORIZED.to_string()
}

impl RecordedFlow {
    /// The recorded file name, recomputed from `name` + id when missing.
    pub fn file_name_for(&self, id: &FlowId) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| layout::derived_name(&self.name, id))
    }
}

/// Per-instance state: flow id → recorded metadata, kept sorted so the file
/// serializes deterministically.
pub type FlowState = BTreeMap<FlowId, RecordedFlow>;

/// Persistence of [`FlowState`] per instance.
pub trait StateStore {
    /// Load the state for `instance`; empty when nothing was recorded yet.
    fn load(&self, instance: &InstanceName) -> Result<FlowState, SyncError>;

    /// Replace the state for `instance`.
    fn save(&self, instance: &InstanceName, state: &FlowState) -> Result<(), SyncError>;

    /// Path to stage alongside flow files, relative to the repository root,
    /// when the store lives inside the working tree.
    fn tracked_path(&self, instance: &InstanceName) -> Option<PathBuf>;
}

/// [`StateStore`] backed by `.flow_state_<instance>.json` files.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of the state file for `instance`.
    pub fn path_for(&self, instance: &InstanceName) -> PathBuf {
        self.root.join(layout::state_file_name(instance))
    }

    /// Whether a state file has ever been written for `instance`.
    pub fn exists(&self, instance: &InstanceName) -> bool {
        self.path_for(instance).exists()
    }
}

impl StateStore for FileStateStore {
    fn load(&self, instance: &InstanceName) -> Result<FlowState, SyncError> {
        load_from(&self.path_for(instance))
    }

    fn save(&self, instance: &InstanceName, state: &FlowState) -> Result<(), SyncError> {
        save_to(&self.path_for(instance), state)
    }

    fn tracked_path(&self, instance: &InstanceName) -> Option<PathBuf> {
        Some(PathBuf::from(layout::state_file_name(instance)))
    }
}

fn load_from(path: &Path) -> Result<FlowState, SyncError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FlowState::new()),
        Err(err) => return Err(io_err(path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(FlowState::new());
    }
    serde_json::from_str(&contents).map_err(|source| SyncError::StateFile {
        path: path.to_path_buf(),
        source,
    })
}

fn save_to(path: &Path, state: &FlowState) -> Result<(), SyncError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let mut json = serde_json::to_string_pretty(state)?;
    json.push('\n');
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
