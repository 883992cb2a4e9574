pub mod diff;
pub mod init;
pub mod run;
pub mod status;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use flowkeep_core::Config;

/// Load the configuration, naming the file in the error.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load_at(path)
        .with_context(|| format!("failed to load configuration from '{}'", path.display()))
}
