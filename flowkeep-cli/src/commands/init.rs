//! `flowkeep init`: prepare the history repository.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use flowkeep_sync::{CommitStore, GitCli};

use super::load_config;

/// Create the repository (README + initial commit) and point `origin` at the
/// configured remote. Safe to repeat.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let git = GitCli::new(
            &config.repo_dir,
            &config.branch,
            config.git_identity.clone(),
            config.request_timeout,
        );

        let created = git.ensure_repository().with_context(|| {
            format!(
                "failed to initialize repository at '{}'",
                config.repo_dir.display()
            )
        })?;
        git.ensure_remote(config.remote_url.as_deref())
            .context("failed to configure git remote")?;

        if created {
            println!("✓ Created flow history at {}", config.repo_dir.display());
        } else {
            println!("✓ Flow history already present at {}", config.repo_dir.display());
        }
        println!("  branch:    {}", config.branch);
        println!(
            "  remote:    {}",
            config.remote_url.as_deref().unwrap_or("none (commits stay local)")
        );
        println!(
            "  instances: {} enabled of {}",
            config.enabled_instances().count(),
            config.instances.len()
        );
        Ok(())
    }
}
