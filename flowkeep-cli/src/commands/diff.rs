//! `flowkeep diff <instance>`: show unified diffs for what sync would write.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use flowkeep_core::InstanceName;
use flowkeep_sync::{diff_instance, FileStateStore, HttpFlowSource};

use super::load_config;

/// Arguments for `flowkeep diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Instance name to diff.
    pub instance: String,
}

impl DiffArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let source = HttpFlowSource::new(config.request_timeout);
        let states = FileStateStore::new(&config.repo_dir);

        let result = diff_instance(
            &config,
            &source,
            &states,
            &InstanceName::from(self.instance.as_str()),
        )
        .with_context(|| format!("diff failed for '{}'", self.instance))?;

        if result.diffs.is_empty() && result.archivals.is_empty() {
            println!("No differences for '{}'.", result.instance);
            return Ok(());
        }

        for diff in &result.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        for archival in &result.archivals {
            println!(
                "archive {} -> {}",
                archival.from().display(),
                archival.to().display()
            );
        }

        Ok(())
    }
}
