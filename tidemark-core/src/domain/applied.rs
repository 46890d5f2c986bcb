//! Bookkeeping rows for applied migrations

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::migration::MigrationFile;

/// One row of the bookkeeping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigration {
    pub id: i64,
    pub filename: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transactional: bool,
    pub md5sum: String,
}

/// Outcome of an applied migration as recorded in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Completed { duration: Duration },
    /// Started but never finished. Only non-transactional migrations end up here.
    Errored,
}

impl AppliedMigration {
    pub fn status(&self) -> MigrationStatus {
        match self.finished_at {
            Some(finished) => MigrationStatus::Completed {
                duration: finished - self.started_at,
            },
            None => MigrationStatus::Errored,
        }
    }
}

/// Values written when a migration gets recorded
#[derive(Debug, Clone)]
pub struct NewAppliedMigration {
    pub filename: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transactional: bool,
    pub md5sum: String,
}

impl NewAppliedMigration {
    pub fn from_file(
        file: &MigrationFile,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            filename: file.filename.clone(),
            started_at,
            finished_at,
            transactional: file.kind.is_transactional(),
            md5sum: file.checksum.clone(),
        }
    }
}

/// Applied migration whose file changed on disk since it was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidMigration {
    #[serde(flatten)]
    pub applied: AppliedMigration,
    pub local_md5sum: String,
}
