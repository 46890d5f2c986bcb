//! Output formatting utilities

use std::io::Write;
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, ContentArrangement, Table};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table with green, underlined headers
pub fn create_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Green).add_attribute(Attribute::Underlined)),
    );
    table
}

/// First column cell, highlighted
pub fn id_cell(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).fg(Color::Yellow)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DATE_FORMAT).to_string()
}

pub fn format_duration(d: Duration) -> String {
    format!("{:.2?}", d)
}

/// Spawn the consumer that prints each migration as the engine starts it
///
/// The returned sender is a rendezvous channel: the engine blocks until the
/// line is printed. The thread ends once the engine drops the sender.
pub fn progress_printer() -> (SyncSender<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::sync_channel::<String>(0);
    let handle = thread::spawn(move || {
        let mut last_start: Option<Instant> = None;
        for filename in rx {
            if let Some(start) = last_start {
                println!("done in {}", format_duration(start.elapsed()));
            }
            print!("  - {} \t...", filename);
            let _ = std::io::stdout().flush();
            last_start = Some(Instant::now());
        }
        if let Some(start) = last_start {
            println!("done in {}", format_duration(start.elapsed()));
        }
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_progress_printer_finishes_when_sender_dropped() {
        let (tx, handle) = progress_printer();
        tx.send("2024-01-01-a.sql".to_string()).unwrap();
        drop(tx);
        handle.join().unwrap();
    }
}
