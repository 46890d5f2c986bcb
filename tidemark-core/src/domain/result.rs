//! Result and error types for the core library

use std::fmt;

use thiserror::Error;

/// Step of a migration at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading the file from disk
    Load,
    /// Opening the transaction or preparing the connection
    Begin,
    /// Executing the migration body
    Execute,
    /// Writing the bookkeeping row
    Record,
    /// Setting `finishedAt` on a non-transactional row
    Finish,
    /// Committing the transaction
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Load => "load",
            Phase::Begin => "begin",
            Phase::Execute => "execute",
            Phase::Record => "record",
            Phase::Finish => "finish",
            Phase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Cannot connect to database: {0}")]
    Connectivity(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("applied migrations were not found")]
    NothingToRedo,

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{filename} ({phase}): {source}")]
    Migration {
        filename: String,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Attach the migration filename and phase to an error
    pub fn in_migration(self, filename: impl Into<String>, phase: Phase) -> Self {
        Self::Migration {
            filename: filename.into(),
            phase,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping migration wrappers
    pub fn kind(&self) -> &Error {
        match self {
            Self::Migration { source, .. } => source.kind(),
            other => other,
        }
    }

    /// Filename of the migration that failed, if any
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Migration { filename, .. } => Some(filename),
            _ => None,
        }
    }

    /// Phase at which the migration failed, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Migration { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        if is_constraint_violation(&msg) {
            Self::Conflict(msg)
        } else {
            Self::Database(msg)
        }
    }
}

/// DuckDB reports unique violations as "Constraint Error: Duplicate key ..."
fn is_constraint_violation(msg: &str) -> bool {
    msg.contains("Constraint Error") || msg.contains("Duplicate key")
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_wrapper_display() {
        let err = Error::Execution("syntax error".to_string())
            .in_migration("2024-01-01-init.sql", Phase::Execute);
        assert_eq!(
            err.to_string(),
            "2024-01-01-init.sql (execute): Execution error: syntax error"
        );
        assert_eq!(err.filename(), Some("2024-01-01-init.sql"));
        assert_eq!(err.phase(), Some(Phase::Execute));
        assert!(matches!(err.kind(), Error::Execution(_)));
    }

    #[test]
    fn test_kind_of_plain_error() {
        let err = Error::NothingToRedo;
        assert!(matches!(err.kind(), Error::NothingToRedo));
        assert!(err.filename().is_none());
    }

    #[test]
    fn test_constraint_violation_detection() {
        assert!(is_constraint_violation(
            "Constraint Error: Duplicate key \"filename: a.sql\" violates unique constraint."
        ));
        assert!(!is_constraint_violation("Parser Error: syntax error at or near \"SELEC\""));
    }
}
