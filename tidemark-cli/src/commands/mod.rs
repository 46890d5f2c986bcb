//! CLI command implementations

pub mod apply;
pub mod init;
pub mod last;
pub mod plan;
pub mod redo;
pub mod verify;

use std::path::Path;

use anyhow::{bail, Context, Result};
use dialoguer::Confirm;
use tidemark_core::{ExecContext, TidemarkContext};

/// Default number of migrations a batch command touches
pub const DEFAULT_COUNT: usize = 5;

/// Open the context described by the config file
pub fn get_context(config_path: &Path) -> Result<TidemarkContext> {
    if !config_path.exists() {
        bail!(
            "Configuration file {} was not found. Please create one via `tidemark init`",
            config_path.display()
        );
    }

    log::debug!("loading config from {}", config_path.display());
    TidemarkContext::open(config_path)
        .with_context(|| format!("Failed to initialize from {}", config_path.display()))
}

/// Execution context for a CLI invocation
pub fn exec_context() -> ExecContext {
    ExecContext::background()
}

/// Ask before doing something that rewrites the bookkeeping table
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}
