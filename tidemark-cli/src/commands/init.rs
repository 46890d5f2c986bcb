//! Init command - write a default configuration file

use std::path::Path;

use anyhow::{bail, Context, Result};
use tidemark_core::config::Config;

use crate::output;

pub fn run(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "File {} already exists, use --force to overwrite it",
            config_path.display()
        );
    }

    Config::default()
        .save(config_path)
        .with_context(|| format!("Failed to write file {}", config_path.display()))?;

    output::success(&format!("File {} was successfully created.", config_path.display()));
    output::info("Set `migrationsDir` and `database.path` before running `tidemark plan`.");
    Ok(())
}
