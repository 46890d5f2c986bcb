//! Redo command - rerun the last applied migration

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use super::{confirm, exec_context, get_context};
use crate::output;

pub fn run(config_path: &Path, yes: bool) -> Result<()> {
    let ctx = get_context(config_path)?;

    if !confirm("Delete the last migration record and run it again?", yes)? {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    println!("Redo last migration:");
    let (sink, printer) = output::progress_printer();
    let result = ctx.migrator.redo(&exec_context(), sink);
    let _ = printer.join();

    let redone = result.context("Apply migration error")?;
    output::success(&format!(
        "{} applied again at {}",
        redone.filename,
        output::format_timestamp(&redone.started_at)
    ));
    Ok(())
}
