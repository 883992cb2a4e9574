//! `flowkeep status`: what is tracked per instance.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use flowkeep_core::Config;
use flowkeep_sync::{layout, FileStateStore, StateStore};

use super::load_config;

/// Arguments for `flowkeep status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let rows = build_rows(&config)?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&config, rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct InstanceStatus {
    instance: String,
    url: String,
    enabled: bool,
    tracked_flows: usize,
    live_files: usize,
    archived_files: usize,
    state_file: bool,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "instance")]
    instance: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "tracked flows")]
    tracked: usize,
    #[tabled(rename = "files")]
    live: usize,
    #[tabled(rename = "archived")]
    archived: usize,
    #[tabled(rename = "state file")]
    state_file: String,
}

fn build_rows(config: &Config) -> Result<Vec<InstanceStatus>> {
    let states = FileStateStore::new(&config.repo_dir);
    let mut rows = Vec::with_capacity(config.instances.len());

    for instance in &config.instances {
        let state = states
            .load(&instance.name)
            .with_context(|| format!("failed to read state for '{}'", instance.name))?;
        let instance_dir = config.repo_dir.join(layout::instance_dir(&instance.name));
        let (live_files, archived_files) = count_flow_files(&instance_dir)
            .with_context(|| format!("failed to scan '{}'", instance_dir.display()))?;

        rows.push(InstanceStatus {
            instance: instance.name.to_string(),
            url: instance.url.clone(),
            enabled: instance.enabled,
            tracked_flows: state.len(),
            live_files,
            archived_files,
            state_file: states.exists(&instance.name),
        });
    }
    Ok(rows)
}

/// `(live, archived)` JSON files under `flows/<instance>/<category>/`.
fn count_flow_files(instance_dir: &Path) -> std::io::Result<(usize, usize)> {
    let categories = match fs::read_dir(instance_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok((0, 0)),
        Err(err) => return Err(err),
    };

    let mut live = 0;
    let mut archived = 0;
    for category in categories {
        let category = category?.path();
        if !category.is_dir() {
            continue;
        }
        live += count_json(&category)?;
        archived += count_json(&category.join(layout::ARCHIVE_DIR))?;
    }
    Ok((live, archived))
}

fn count_json(dir: &Path) -> std::io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    let mut count = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

fn print_table(config: &Config, rows: Vec<InstanceStatus>) {
    println!(
        "flowkeep v{} | {} | branch {} | remote {}",
        env!("CARGO_PKG_VERSION"),
        config.repo_dir.display(),
        config.branch,
        config.remote_url.as_deref().unwrap_or("none"),
    );

    let missing_state = rows.iter().filter(|row| row.enabled && !row.state_file).count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            instance: row.instance,
            enabled: if row.enabled {
                "yes".green().to_string()
            } else {
                "no".bright_black().to_string()
            },
            tracked: row.tracked_flows,
            live: row.live_files,
            archived: row.archived_files,
            state_file: if row.state_file {
                "present".to_string()
            } else {
                "missing".yellow().to_string()
            },
        })
        .collect();

    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if missing_state > 0 {
        println!("Run 'flowkeep sync' to record state for new instances.");
    }
}
