//! Reconciler: turns (remote flows, last recorded state) into file writes,
//! archivals and the next state.
//!
//! Processing is driven by id order, never by the order of the remote
//! response, so the same inputs always produce the same mutations.
//!
//! A flow is rewritten when its `updatedAt` token differs from the recorded
//! one, or when its derived location (category directory or file name)
//! moved. In the latter case the stale live file at the old location is
//! archived so no state entry ever points away from the file holding the
//! content. Flows that disappeared upstream are archived under `deleted/`
//! and dropped from the state.

use std::collections::BTreeMap;
use std::path::Path;

use flowkeep_core::{Flow, FlowId, InstanceName};

use crate::error::SyncError;
use crate::layout;
use crate::state_store::{FlowState, RecordedFlow};
use crate::writer::{self, ArchiveResult, WriteResult};

/// Result of reconciling one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub state: FlowState,
    pub writes: Vec<WriteResult>,
    pub archivals: Vec<ArchiveResult>,
    /// Flows left untouched because their payload could not be decoded.
    pub skipped: Vec<FlowId>,
}

impl Reconciliation {
    /// No file was (or would be) written or moved.
    pub fn is_noop(&self) -> bool {
        self.writes.is_empty() && self.archivals.is_empty()
    }
}

/// Reconcile `remote` against `last_state` for `instance`, materializing the
/// result under `root` (or only reporting it when `dry_run`).
pub fn reconcile(
    root: &Path,
    instance: &InstanceName,
    remote: &[Flow],
    last_state: &FlowState,
    dry_run: bool,
) -> Result<Reconciliation, SyncError> {
    let mut state = last_state.clone();
    let mut writes = Vec::new();
    let mut archivals = Vec::new();
    let mut skipped = Vec::new();

    let mut by_id: BTreeMap<&FlowId, &Flow> = BTreeMap::new();
    for flow in remote {
        if by_id.contains_key(&flow.id) {
            tracing::warn!(
                "instance {}: duplicate flow id {} in response; keeping the first occurrence",
                instance,
                flow.id
            );
            continue;
        }
        by_id.insert(&flow.id, flow);
    }

    for (id, flow) in &by_id {
        let document = match flow.payload_document() {
            Ok(Some(document)) => document,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(
                    "instance {}: flow {} ({}) has an undecodable payload, leaving it untouched: {}",
                    instance,
                    id,
                    flow.name,
                    err
                );
                skipped.push((*id).clone());
                continue;
            }
        };

        let category = flow.category();
        let file_name = layout::derived_name(&flow.name, id);
        let previous = last_state.get(*id);

        let content_changed = previous.map_or(true, |p| p.updated_at != flow.updated_at);
        let relocated_from = previous.and_then(|p| {
            let old_file = p.file_name_for(id);
            let moved = layout::category_dir(&p.category) != layout::category_dir(category)
                || old_file != file_name;
            moved.then(|| (p.category.clone(), old_file))
        });

        if let Some((old_category, old_file)) = &relocated_from {
            tracing::info!(
                "instance {}: flow {} moved from {}/{} to {}/{}",
                instance,
                id,
                layout::category_dir(old_category),
                old_file,
                layout::category_dir(category),
                file_name
            );
            archivals.push(writer::archive_flow(
                root,
                &layout::live_path(instance, old_category, old_file),
                &layout::archived_path(instance, old_category, old_file),
                dry_run,
            )?);
        }

        if content_changed || relocated_from.is_some() {
            let rendered = writer::render_document(&document)?;
            let path = layout::live_path(instance, category, &file_name);
            writes.push(writer::write_flow(root, &path, &rendered, dry_run)?);
        }

        state.insert(
            (*id).clone(),
            RecordedFlow {
                updated_at: flow.updated_at.clone(),
                name: flow.name.clone(),
                file_name: Some(file_name),
                category: category.to_string(),
            },
        );
    }

    for (id, recorded) in last_state {
        if by_id.contains_key(id) {
            continue;
        }
        let file_name = recorded.file_name_for(id);
        archivals.push(writer::archive_flow(
            root,
            &layout::live_path(instance, &recorded.category, &file_name),
            &layout::archived_path(instance, &recorded.category, &file_name),
            dry_run,
        )?);
        state.remove(id);
    }

    Ok(Reconciliation {
        state,
        writes,
        archivals,
        skipped,
    })
}
