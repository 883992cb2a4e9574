//! `flowkeep run`: foreground scheduler.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use flowkeep_daemon::start_blocking;

/// Sweep immediately, then every `interval_minutes`, until ctrl-c.
#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        start_blocking(config_path).context("scheduler exited with error")
    }
}
