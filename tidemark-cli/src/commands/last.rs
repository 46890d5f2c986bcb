//! Last command - show recently applied migrations

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use tidemark_core::MigrationStatus;

use super::{exec_context, get_context};
use crate::output;

pub fn run(config_path: &Path, count: usize, json: bool) -> Result<()> {
    let ctx = get_context(config_path)?;
    let rows = ctx
        .migrator
        .last(&exec_context(), count)
        .with_context(|| format!("Failed to fetch last {} migrations", count))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Showing last {} migrations in {}:", count, ctx.config.app.table);
    let mut table = output::create_table(&["ID", "StartedAt", "FinishedAt", "Duration", "Filename"]);
    for row in &rows {
        let (finished, duration) = match (row.status(), &row.finished_at) {
            (MigrationStatus::Completed { duration }, Some(finished)) => (
                Cell::new(output::format_timestamp(finished)),
                Cell::new(output::format_duration(duration.to_std().unwrap_or_default())),
            ),
            _ => (
                Cell::new("error while applying").fg(Color::Red),
                Cell::new(""),
            ),
        };
        table.add_row(vec![
            output::id_cell(row.id),
            Cell::new(output::format_timestamp(&row.started_at)),
            finished,
            duration,
            Cell::new(&row.filename),
        ]);
    }
    println!("{}", table);

    let errored = rows
        .iter()
        .filter(|r| r.status() == MigrationStatus::Errored)
        .count();
    if errored > 0 {
        output::warning(&format!(
            "{} non-transactional migrations never finished; check them manually.",
            errored
        ));
    }

    Ok(())
}
