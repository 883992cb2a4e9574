//! File materializer: atomic flow writes and archival moves.
//!
//! ## `write_flow` protocol
//!
//! 1. Render the payload as pretty JSON (caller, via [`render_document`]).
//! 2. Ensure the category directory exists.
//! 3. Write to `<path>.flowkeep.tmp`.
//! 4. Rename to the final path (atomic on POSIX).
//!
//! Archival is a single rename into the category's `deleted/` directory.
//! Paths passed in and reported back are relative to the repository root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of materializing one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written.
    Written { path: PathBuf },
    /// Dry-run mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::WouldWrite { path } => path,
        }
    }
}

/// Outcome of archiving one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveResult {
    /// The live file was moved under `deleted/`.
    Archived { from: PathBuf, to: PathBuf },
    /// The live file was already gone; bookkeeping proceeds as if archived.
    AlreadyAbsent { from: PathBuf, to: PathBuf },
    /// Dry-run mode: the file *would* have been archived.
    WouldArchive { from: PathBuf, to: PathBuf },
}

impl ArchiveResult {
    pub fn from(&self) -> &Path {
        match self {
            ArchiveResult::Archived { from, .. }
            | ArchiveResult::AlreadyAbsent { from, .. }
            | ArchiveResult::WouldArchive { from, .. } => from,
        }
    }

    pub fn to(&self) -> &Path {
        match self {
            ArchiveResult::Archived { to, .. }
            | ArchiveResult::AlreadyAbsent { to, .. }
            | ArchiveResult::WouldArchive { to, .. } => to,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Stable, human-diffable rendering: two-space indentation, trailing newline.
pub fn render_document(document: &Value) -> Result<String, SyncError> {
    let mut rendered = serde_json::to_string_pretty(document)?;
    rendered.push('\n');
    Ok(rendered)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Atomically write `content` to `root/relative`.
pub(crate) fn write_flow(
    root: &Path,
    relative: &Path,
    content: &str,
    dry_run: bool,
) -> Result<WriteResult, SyncError> {
    let path = root.join(relative);
    let tmp = PathBuf::from(format!("{}.flowkeep.tmp", path.display()));
    write_with_tmp(&path, content, &tmp, dry_run)?;
    Ok(if dry_run {
        WriteResult::WouldWrite {
            path: relative.to_path_buf(),
        }
    } else {
        WriteResult::Written {
            path: relative.to_path_buf(),
        }
    })
}

fn write_with_tmp(path: &Path, content: &str, tmp: &Path, dry_run: bool) -> Result<(), SyncError> {
    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Archival
// ---------------------------------------------------------------------------

/// Move `root/from` to `root/to`.
///
/// A missing source is not an error: it is logged and reported as
/// [`ArchiveResult::AlreadyAbsent`]. An existing archive at `to` is replaced.
pub(crate) fn archive_flow(
    root: &Path,
    from: &Path,
    to: &Path,
    dry_run: bool,
) -> Result<ArchiveResult, SyncError> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    if dry_run {
        tracing::info!("[dry-run] would archive: {} -> {}", from.display(), to.display());
        return Ok(ArchiveResult::WouldArchive { from, to });
    }

    let source = root.join(&from);
    let target = root.join(&to);
    if !source.exists() {
        tracing::warn!(
            "archive source already absent, dropping state entry anyway: {}",
            from.display()
        );
        return Ok(ArchiveResult::AlreadyAbsent { from, to });
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    match std::fs::rename(&source, &target) {
        Ok(()) => {
            tracing::info!("archived: {} -> {}", from.display(), to.display());
            Ok(ArchiveResult::Archived { from, to })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!(
                "archive source vanished during move, dropping state entry anyway: {}",
                from.display()
            );
            Ok(ArchiveResult::AlreadyAbsent { from, to })
        }
        Err(err) => Err(io_err(&source, err)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
