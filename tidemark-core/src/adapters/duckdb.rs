//! DuckDB bookkeeping store
//!
//! Owns the connection the engine runs migrations on and the SQL for the
//! bookkeeping table. Ledger helpers take a `&Connection` so they work the
//! same on the bare connection and inside a `duckdb::Transaction`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, params_from_iter, Connection};

use crate::config::TableName;
use crate::domain::result::{Error, Result};
use crate::domain::{AppliedMigration, ExecContext, NewAppliedMigration};

/// Waits between attempts to open a database file held by someone else
const OPEN_BACKOFF_MS: [u64; 4] = [50, 100, 200, 400];

/// How often the statement watchdog checks its deadlines
const WATCHDOG_TICK: Duration = Duration::from_millis(10);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Messages DuckDB reports when another handle holds the file lock
const LOCK_CONFLICT_MARKERS: [&str; 4] = [
    "could not set lock on file",
    "conflicting lock",
    "database is locked",
    "being used by another process",
];

fn is_lock_conflict(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    LOCK_CONFLICT_MARKERS.iter().any(|m| lower.contains(m))
}

/// DuckDB connection plus the bookkeeping table it manages
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    ledger: Ledger,
}

impl DuckDbStore {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock. Any other failure is reported as a connectivity error.
    pub fn open(db_path: &Path, table: TableName) -> Result<Self> {
        let mut backoff = OPEN_BACKOFF_MS.iter();
        let conn = loop {
            let err = match Self::try_open_connection(db_path) {
                Ok(conn) => break conn,
                Err(e) => e.to_string(),
            };
            match backoff.next() {
                Some(&wait) if is_lock_conflict(&err) => {
                    log::warn!("{} is locked, retrying in {}ms: {}", db_path.display(), wait, err);
                    thread::sleep(Duration::from_millis(wait));
                }
                _ => {
                    return Err(Error::Connectivity(format!("{}: {}", db_path.display(), err)));
                }
            }
        };

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
            ledger: Ledger::new(table),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory(table: TableName) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::Connectivity(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
            ledger: Ledger::new(table),
        })
    }

    fn try_open_connection(db_path: &Path) -> std::result::Result<Connection, duckdb::Error> {
        if db_path == Path::new(":memory:") {
            return Connection::open_in_memory();
        }
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Exclusive access to the connection
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

/// SQL for the bookkeeping table
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
    sequence: String,
    schema: Option<String>,
}

impl Ledger {
    pub fn new(table: TableName) -> Self {
        Self {
            table: table.quoted(),
            sequence: table.sequence_quoted(),
            schema: table.schema.clone(),
        }
    }

    fn select_columns(&self) -> String {
        format!(
            r#"SELECT id, filename, CAST("startedAt" AS VARCHAR), CAST("finishedAt" AS VARCHAR),
                      transactional, md5sum
               FROM {}"#,
            self.table
        )
    }

    /// Create the table and its id sequence if missing
    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let schema = match &self.schema {
            Some(s) => format!("CREATE SCHEMA IF NOT EXISTS \"{}\";", s),
            None => String::new(),
        };
        conn.execute_batch(&format!(
            r#"
            {schema}
            CREATE SEQUENCE IF NOT EXISTS {seq};
            CREATE TABLE IF NOT EXISTS {table} (
                id            BIGINT      NOT NULL DEFAULT nextval('{seq_lit}'),
                filename      VARCHAR     NOT NULL,
                "startedAt"   TIMESTAMP   NOT NULL DEFAULT current_timestamp,
                "finishedAt"  TIMESTAMP,
                transactional BOOLEAN     NOT NULL DEFAULT true,
                md5sum        VARCHAR(32) NOT NULL,
                PRIMARY KEY (id),
                UNIQUE (filename)
            );
            "#,
            schema = schema,
            seq = self.sequence,
            seq_lit = self.sequence.replace('\'', "''"),
            table = self.table,
        ))?;
        Ok(())
    }

    /// Which of `filenames` already have a row
    pub fn recorded_filenames(&self, conn: &Connection, filenames: &[String]) -> Result<Vec<String>> {
        if filenames.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT filename FROM {} WHERE filename IN ({})",
            self.table,
            placeholders(filenames.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filenames.iter()), |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in rows {
            result.push(name?);
        }
        log::debug!("{} of {} candidates already recorded", result.len(), filenames.len());
        Ok(result)
    }

    /// Insert a row and return its id
    pub fn insert(&self, conn: &Connection, row: &NewAppliedMigration) -> Result<i64> {
        let sql = format!(
            r#"INSERT INTO {} (filename, "startedAt", "finishedAt", transactional, md5sum)
               VALUES (?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?)
               RETURNING id"#,
            self.table
        );
        let id = conn.query_row(
            &sql,
            params![
                row.filename,
                format_timestamp(&row.started_at),
                row.finished_at.as_ref().map(format_timestamp),
                row.transactional,
                row.md5sum,
            ],
            |r| r.get::<_, i64>(0),
        )?;
        Ok(id)
    }

    /// Set `finishedAt` on a row
    pub fn mark_finished(&self, conn: &Connection, id: i64, finished_at: DateTime<Utc>) -> Result<()> {
        let sql = format!(
            r#"UPDATE {} SET "finishedAt" = CAST(? AS TIMESTAMP) WHERE id = ?"#,
            self.table
        );
        let updated = conn.execute(&sql, params![format_timestamp(&finished_at), id])?;
        if updated == 0 {
            return Err(Error::not_found(format!("migration row {}", id)));
        }
        Ok(())
    }

    /// Most recent `limit` rows, newest first
    pub fn last(&self, conn: &Connection, limit: usize) -> Result<Vec<AppliedMigration>> {
        let sql = format!("{} ORDER BY id DESC LIMIT ?", self.select_columns());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_values)?;
        collect_rows(rows)
    }

    /// Rows for exactly these filenames, in id order
    pub fn find_by_filenames(
        &self,
        conn: &Connection,
        filenames: &[String],
    ) -> Result<Vec<AppliedMigration>> {
        if filenames.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE filename IN ({}) ORDER BY id",
            self.select_columns(),
            placeholders(filenames.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filenames.iter()), row_values)?;
        collect_rows(rows)
    }

    /// Delete one row by primary key
    pub fn delete(&self, conn: &Connection, id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let deleted = conn.execute(&sql, params![id])?;
        if deleted == 0 {
            return Err(Error::not_found(format!("migration row {}", id)));
        }
        Ok(())
    }
}

type RawRow = (i64, String, String, Option<String>, bool, String);

fn row_values(row: &duckdb::Row) -> duckdb::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn collect_rows(
    rows: impl Iterator<Item = duckdb::Result<RawRow>>,
) -> Result<Vec<AppliedMigration>> {
    let mut result = Vec::new();
    for row in rows {
        let (id, filename, started_at, finished_at, transactional, md5sum) = row?;
        result.push(AppliedMigration {
            id,
            filename,
            started_at: parse_timestamp(&started_at)?,
            finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            transactional,
            md5sum,
        });
    }
    Ok(result)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a TIMESTAMP rendered by DuckDB; stored values are UTC
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::database(format!("invalid timestamp {:?}: {}", s, e)))
}

/// Execute a migration body, interrupting it on timeout or cancellation
pub fn execute_migration(
    conn: &Connection,
    sql: &str,
    statement_timeout: Option<Duration>,
    ctx: &ExecContext,
) -> Result<()> {
    ctx.check()?;
    let watchdog = Watchdog::spawn(conn, statement_timeout, ctx.clone());
    let outcome = conn.execute_batch(sql);
    let timed_out = watchdog.stop();

    match outcome {
        Ok(()) => Ok(()),
        Err(_) if ctx.is_done() => Err(Error::Cancelled),
        Err(e) if timed_out => Err(Error::Execution(format!(
            "statement timeout of {:?} exceeded: {}",
            statement_timeout.unwrap_or_default(),
            e
        ))),
        Err(e) => Err(Error::Execution(e.to_string())),
    }
}

/// Background thread that interrupts the connection when time runs out
struct Watchdog {
    done: Arc<AtomicBool>,
    timed_out: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(conn: &Connection, timeout: Option<Duration>, ctx: ExecContext) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let timed_out = Arc::new(AtomicBool::new(false));
        let interrupt = conn.interrupt_handle();

        let handle = {
            let done = Arc::clone(&done);
            let timed_out = Arc::clone(&timed_out);
            thread::spawn(move || {
                let started = Instant::now();
                while !done.load(Ordering::SeqCst) {
                    let expired = timeout.map_or(false, |t| started.elapsed() >= t);
                    if expired || ctx.is_done() {
                        timed_out.store(expired, Ordering::SeqCst);
                        interrupt.interrupt();
                        return;
                    }
                    thread::sleep(WATCHDOG_TICK);
                }
            })
        };

        Self {
            done,
            timed_out,
            handle: Some(handle),
        }
    }

    /// Stop watching; returns true if the statement timeout fired
    fn stop(mut self) -> bool {
        self.shutdown();
        self.timed_out.load(Ordering::SeqCst)
    }

    fn shutdown(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}
