//! Verify command - show applied migrations whose files changed

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::Cell;

use super::{exec_context, get_context};
use crate::output;

pub fn run(config_path: &Path, json: bool) -> Result<()> {
    let ctx = get_context(config_path)?;
    let invalid = ctx
        .migrator
        .verify(&exec_context())
        .context("Failed to verify migrations")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&invalid)?);
        return Ok(());
    }

    if invalid.is_empty() {
        output::success("All applied migrations are correct!");
        return Ok(());
    }

    output::warning(&format!("Found {} invalid applied migrations:", invalid.len()));
    let mut table = output::create_table(&[
        "ID",
        "StartedAt",
        "Filename",
        "MD5sum (applied)",
        "MD5sum (local)",
    ]);
    for m in &invalid {
        let started = if m.applied.finished_at.is_some() {
            output::format_timestamp(&m.applied.started_at)
        } else {
            format!("{} (error while applying)", output::format_timestamp(&m.applied.started_at))
        };
        table.add_row(vec![
            output::id_cell(m.applied.id),
            Cell::new(started),
            Cell::new(&m.applied.filename),
            Cell::new(&m.applied.md5sum),
            Cell::new(&m.local_md5sum),
        ]);
    }
    println!("{}", table);

    Ok(())
}
