//! Plan command - show migration files which can be applied

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::Cell;

use super::{exec_context, get_context};
use crate::output;

pub fn run(config_path: &Path, json: bool) -> Result<()> {
    let ctx = get_context(config_path)?;
    let plan = ctx
        .migrator
        .plan(&exec_context())
        .context("Failed to plan migrations")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if plan.is_empty() {
        println!("No new migrations were found.");
        return Ok(());
    }

    println!("Planning to apply {} migrations:", plan.len());
    let mut table = output::create_table(&["ID", "Filename"]);
    for (i, filename) in plan.iter().enumerate() {
        table.add_row(vec![output::id_cell(i + 1), Cell::new(filename)]);
    }
    println!("{}", table);

    Ok(())
}
