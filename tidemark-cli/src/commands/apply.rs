//! Run, dryrun and skip commands - act on the first migrations of the plan

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use super::{confirm, exec_context, get_context};
use crate::output;

/// What to do with the selected migrations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Apply them
    Run,
    /// Apply inside one transaction, then roll back
    DryRun,
    /// Record them as applied without running them
    Skip,
}

/// First `count` entries of the plan
fn select(plan: Vec<String>, count: usize) -> Vec<String> {
    plan.into_iter().take(count).collect()
}

pub fn run(config_path: &Path, mode: Mode, count: usize, yes: bool) -> Result<()> {
    let ctx = get_context(config_path)?;
    let exec = exec_context();

    let plan = ctx
        .migrator
        .plan(&exec)
        .context("Failed to plan migrations")?;
    if plan.is_empty() {
        println!("No new migrations were found.");
        return Ok(());
    }
    let selected = select(plan, count);

    if mode == Mode::Skip {
        println!(
            "{}",
            format!("{} migrations will be marked as applied without running them:", selected.len()).yellow()
        );
        for filename in &selected {
            println!("  - {}", filename);
        }
        if !confirm("Are you sure?", yes)? {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
    }

    match mode {
        Mode::Run => println!("Running live migrations:"),
        Mode::DryRun => println!("BEGIN"),
        Mode::Skip => println!("Skipping migrations..."),
    }

    let (sink, printer) = output::progress_printer();
    let result = match mode {
        Mode::Run => ctx.migrator.run(&exec, &selected, sink),
        Mode::DryRun => ctx.migrator.dry_run(&exec, &selected, sink),
        Mode::Skip => ctx.migrator.skip(&exec, &selected, sink),
    };
    // the engine dropped the sender, so the printer is finishing
    let _ = printer.join();

    match (mode, result) {
        (Mode::Run, Err(e)) => Err(e).context("Apply migration error"),
        (Mode::DryRun, Err(e)) => {
            println!("ROLLBACK");
            Err(e).context("Dry run failed")
        }
        (Mode::Skip, Err(e)) => Err(e).context("Skip migration error"),
        (Mode::Run, Ok(())) => {
            output::success(&format!("Applied {} migrations.", selected.len()));
            Ok(())
        }
        (Mode::DryRun, Ok(())) => {
            println!("ROLLBACK");
            Ok(())
        }
        (Mode::Skip, Ok(())) => {
            output::success("Done");
            Ok(())
        }
    }
}
