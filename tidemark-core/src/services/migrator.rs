//! Migration engine - plans, applies, skips, redoes and verifies migrations
//!
//! Every applied migration is tracked in the bookkeeping table. Transactional
//! migrations run together with their bookkeeping insert in one transaction,
//! so they either fully apply or leave no trace. Non-transactional migrations
//! (`*NONTR.sql`) are recorded before they run and marked finished after; a
//! failure in between leaves a row with no `finishedAt`, which `last` shows as
//! an error and which is never repaired automatically.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use duckdb::Connection;

use crate::adapters::duckdb::{execute_migration, DuckDbStore};
use crate::adapters::filesystem::{list_candidates, load_all};
use crate::config::Config;
use crate::domain::result::{Error, Phase, Result};
use crate::domain::{
    first_non_transactional, AppliedMigration, ExecContext, InvalidMigration, MigrationFile,
    MigrationKind, NewAppliedMigration,
};
use crate::ports::ProgressSink;

/// Timestamps are stored with microsecond precision
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The migration engine
pub struct Migrator {
    store: Arc<DuckDbStore>,
    root_dir: PathBuf,
    mask: regex::Regex,
    statement_timeout: Option<Duration>,
}

impl Migrator {
    /// Create an engine over `store`, reading migrations from the configured directory
    pub fn new(store: Arc<DuckDbStore>, config: &Config) -> Result<Self> {
        Ok(Self {
            store,
            root_dir: config.migrations_dir(),
            mask: config.app.file_mask()?,
            statement_timeout: config.app.statement_timeout()?,
        })
    }

    pub fn root_dir(&self) -> &std::path::Path {
        &self.root_dir
    }

    fn ensure_table(&self, conn: &Connection, ctx: &ExecContext) -> Result<()> {
        ctx.check()?;
        self.store.ledger().create_table(conn)
    }

    /// Filenames on disk that have no bookkeeping row yet, in apply order
    pub fn plan(&self, ctx: &ExecContext) -> Result<Vec<String>> {
        let conn = self.store.lock()?;
        self.ensure_table(&conn, ctx)?;

        let candidates = list_candidates(&self.root_dir, &self.mask)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        ctx.check()?;
        let recorded: HashSet<String> = self
            .store
            .ledger()
            .recorded_filenames(&conn, &candidates)?
            .into_iter()
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|name| !recorded.contains(name))
            .collect())
    }

    /// Apply `filenames` in order, stopping at the first failure
    ///
    /// Every file is loaded before anything runs. Migrations that committed
    /// before a failure stay applied.
    pub fn run(
        &self,
        ctx: &ExecContext,
        filenames: &[String],
        mut progress: impl ProgressSink,
    ) -> Result<()> {
        let mut conn = self.store.lock()?;
        self.ensure_table(&conn, ctx)?;

        let migrations = load_all(&self.root_dir, filenames)?;

        for migration in &migrations {
            progress.started(&migration.filename);
            let outcome = match migration.kind {
                MigrationKind::Transactional => self.apply_transactional(&mut conn, ctx, migration),
                MigrationKind::NonTransactional => self.apply_non_transactional(&conn, ctx, migration),
            };

            if let Err((phase, err)) = outcome {
                log::error!("migration {} failed during {}: {}", migration.filename, phase, err);
                return Err(err.in_migration(migration.filename.as_str(), phase));
            }
            log::info!("applied migration {}", migration.filename);
        }

        Ok(())
    }

    /// Body and bookkeeping row in one transaction; dropping `tx` on error rolls back
    fn apply_transactional(
        &self,
        conn: &mut Connection,
        ctx: &ExecContext,
        migration: &MigrationFile,
    ) -> std::result::Result<(), (Phase, Error)> {
        ctx.check().map_err(|e| (Phase::Begin, e))?;
        let tx = conn.transaction().map_err(|e| (Phase::Begin, e.into()))?;

        let started_at = now();
        execute_migration(&tx, &migration.sql(), self.statement_timeout, ctx)
            .map_err(|e| (Phase::Execute, e))?;

        ctx.check().map_err(|e| (Phase::Record, e))?;
        let row = NewAppliedMigration::from_file(migration, started_at, Some(now()));
        self.store
            .ledger()
            .insert(&tx, &row)
            .map_err(|e| (Phase::Record, e))?;

        tx.commit().map_err(|e| (Phase::Commit, e.into()))
    }

    /// Record, execute on the bare connection, then mark finished
    fn apply_non_transactional(
        &self,
        conn: &Connection,
        ctx: &ExecContext,
        migration: &MigrationFile,
    ) -> std::result::Result<(), (Phase, Error)> {
        ctx.check().map_err(|e| (Phase::Record, e))?;
        let row = NewAppliedMigration::from_file(migration, now(), None);
        let id = self
            .store
            .ledger()
            .insert(conn, &row)
            .map_err(|e| (Phase::Record, e))?;

        if let Err(e) = execute_migration(conn, &migration.sql(), self.statement_timeout, ctx) {
            log::warn!(
                "non-transactional migration {} left unfinished (row {})",
                migration.filename,
                id
            );
            return Err((Phase::Execute, e));
        }

        self.store
            .ledger()
            .mark_finished(conn, id, now())
            .map_err(|e| (Phase::Finish, e))
    }

    /// Run `filenames` in one transaction and always roll it back
    ///
    /// Refuses batches containing a non-transactional migration before
    /// executing anything.
    pub fn dry_run(
        &self,
        ctx: &ExecContext,
        filenames: &[String],
        mut progress: impl ProgressSink,
    ) -> Result<()> {
        let mut conn = self.store.lock()?;
        self.ensure_table(&conn, ctx)?;

        let migrations = load_all(&self.root_dir, filenames)?;
        if let Some(m) = first_non_transactional(&migrations) {
            return Err(Error::precondition(format!(
                "non transactional migration found \"{}\", run all migrations before it, please",
                m.filename
            ))
            .in_migration(m.filename.as_str(), Phase::Load));
        }
        let (first, last) = match (migrations.first(), migrations.last()) {
            (Some(first), Some(last)) => (first.filename.as_str(), last.filename.as_str()),
            _ => return Ok(()),
        };

        let tx = conn
            .transaction()
            .map_err(|e| Error::from(e).in_migration(first, Phase::Begin))?;
        let outcome = (|| -> Result<()> {
            for migration in &migrations {
                progress.started(&migration.filename);

                let started_at = now();
                execute_migration(&tx, &migration.sql(), self.statement_timeout, ctx)
                    .map_err(|e| e.in_migration(migration.filename.as_str(), Phase::Execute))?;

                let row = NewAppliedMigration::from_file(migration, started_at, Some(now()));
                self.store
                    .ledger()
                    .insert(&tx, &row)
                    .map_err(|e| e.in_migration(migration.filename.as_str(), Phase::Record))?;
            }
            Ok(())
        })();

        let rollback = tx.rollback();
        outcome?;
        rollback.map_err(|e| Error::from(e).in_migration(last, Phase::Commit))?;
        log::info!("dry run of {} migrations rolled back", migrations.len());
        Ok(())
    }

    /// Record `filenames` as applied without executing them
    ///
    /// All rows go in one transaction; any failure records none of them.
    pub fn skip(
        &self,
        ctx: &ExecContext,
        filenames: &[String],
        mut progress: impl ProgressSink,
    ) -> Result<()> {
        let mut conn = self.store.lock()?;
        self.ensure_table(&conn, ctx)?;

        let migrations = load_all(&self.root_dir, filenames)?;
        let (first, last) = match (migrations.first(), migrations.last()) {
            (Some(first), Some(last)) => (first.filename.as_str(), last.filename.as_str()),
            _ => return Ok(()),
        };

        let tx = conn
            .transaction()
            .map_err(|e| Error::from(e).in_migration(first, Phase::Begin))?;
        for migration in &migrations {
            progress.started(&migration.filename);
            ctx.check()
                .map_err(|e| e.in_migration(migration.filename.as_str(), Phase::Record))?;

            let at = now();
            let row = NewAppliedMigration::from_file(migration, at, Some(at));
            self.store
                .ledger()
                .insert(&tx, &row)
                .map_err(|e| e.in_migration(migration.filename.as_str(), Phase::Record))?;
        }
        tx.commit()
            .map_err(|e| Error::from(e).in_migration(last, Phase::Commit))?;

        log::info!("marked {} migrations as applied without running them", migrations.len());
        Ok(())
    }

    /// Delete the most recent row and run its file again
    ///
    /// Returns the freshly recorded row. If the re-run fails, the old row
    /// stays deleted and the migration shows up in `plan` again.
    pub fn redo(&self, ctx: &ExecContext, progress: impl ProgressSink) -> Result<AppliedMigration> {
        let last = {
            let conn = self.store.lock()?;
            self.ensure_table(&conn, ctx)?;

            let last = self
                .store
                .ledger()
                .last(&conn, 1)?
                .into_iter()
                .next()
                .ok_or(Error::NothingToRedo)?;

            MigrationFile::load(&self.root_dir, &last.filename)
                .map_err(|e| e.in_migration(last.filename.as_str(), Phase::Load))?;

            ctx.check()?;
            self.store.ledger().delete(&conn, last.id)?;
            log::info!("removed record {} of {} for redo", last.id, last.filename);
            last
        };

        self.run(ctx, std::slice::from_ref(&last.filename), progress)?;

        let conn = self.store.lock()?;
        self.store
            .ledger()
            .find_by_filenames(&conn, std::slice::from_ref(&last.filename))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("record of {} after redo", last.filename)))
    }

    /// The `n` most recent bookkeeping rows, newest first
    pub fn last(&self, ctx: &ExecContext, n: usize) -> Result<Vec<AppliedMigration>> {
        let conn = self.store.lock()?;
        self.ensure_table(&conn, ctx)?;
        ctx.check()?;
        self.store.ledger().last(&conn, n)
    }

    /// Applied migrations whose file on disk no longer matches the stored checksum
    ///
    /// Only files that are still candidates are compared.
    pub fn verify(&self, ctx: &ExecContext) -> Result<Vec<InvalidMigration>> {
        let conn = self.store.lock()?;
        self.ensure_table(&conn, ctx)?;

        let candidates = list_candidates(&self.root_dir, &self.mask)?;
        let local = load_all(&self.root_dir, &candidates)?;

        ctx.check()?;
        let applied = self.store.ledger().find_by_filenames(&conn, &candidates)?;

        Ok(compare_checksums(&local, applied))
    }
}

/// Stored rows whose checksum differs from the local file with the same name
fn compare_checksums(local: &[MigrationFile], applied: Vec<AppliedMigration>) -> Vec<InvalidMigration> {
    let sums: HashMap<&str, &str> = local
        .iter()
        .map(|m| (m.filename.as_str(), m.checksum.as_str()))
        .collect();

    applied
        .into_iter()
        .filter_map(|row| {
            let local_sum = sums.get(row.filename.as_str())?;
            if *local_sum == row.md5sum {
                return None;
            }
            Some(InvalidMigration {
                local_md5sum: local_sum.to_string(),
                applied: row,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(filename: &str, md5sum: &str) -> AppliedMigration {
        AppliedMigration {
            id: 1,
            filename: filename.to_string(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            transactional: true,
            md5sum: md5sum.to_string(),
        }
    }

    #[test]
    fn test_compare_checksums_all_valid() {
        let local = vec![
            MigrationFile::new("2022-12-12-01-a.sql", b"one".to_vec()),
            MigrationFile::new("2022-12-12-02-b.sql", b"two".to_vec()),
        ];
        let applied = local.iter().map(|m| row(&m.filename, &m.checksum)).collect();
        assert!(compare_checksums(&local, applied).is_empty());
    }

    #[test]
    fn test_compare_checksums_reports_mismatch() {
        let local = vec![
            MigrationFile::new("2022-12-12-01-a.sql", b"one".to_vec()),
            MigrationFile::new("2022-12-12-02-b.sql", b"two".to_vec()),
        ];
        let applied = vec![
            row("2022-12-12-01-a.sql", &local[0].checksum),
            row("2022-12-12-02-b.sql", "invalid!!!"),
        ];

        let invalid = compare_checksums(&local, applied);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].applied.filename, "2022-12-12-02-b.sql");
        assert_eq!(invalid[0].applied.md5sum, "invalid!!!");
        assert_eq!(invalid[0].local_md5sum, local[1].checksum);
    }

    #[test]
    fn test_compare_checksums_ignores_rows_without_local_file() {
        let local = vec![MigrationFile::new("2022-12-12-01-a.sql", b"one".to_vec())];
        let applied = vec![row("2022-12-11-01-gone.sql", "whatever")];
        assert!(compare_checksums(&local, applied).is_empty());
    }
}
