//! Tidemark Core - ordered, file-based database migrations
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: migration files, bookkeeping rows, errors, execution context
//! - **ports**: interfaces the engine talks to (progress sink)
//! - **services**: the migration engine
//! - **adapters**: DuckDB bookkeeping store, filesystem source reader

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::duckdb::DuckDbStore;
use config::Config;

pub use domain::result::{Error, Phase, Result};
pub use domain::{
    AppliedMigration, ExecContext, InvalidMigration, MigrationFile, MigrationKind, MigrationStatus,
};
pub use ports::{NoProgress, ProgressSink};
pub use services::Migrator;

/// Main context for Tidemark operations
///
/// Holds the loaded configuration, the database store and the engine.
pub struct TidemarkContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub migrator: Migrator,
}

impl TidemarkContext {
    /// Load the config file and open the configured database
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = Config::load(config_path)?;
        Self::from_config(config)
    }

    /// Open the database described by an already loaded config
    pub fn from_config(config: Config) -> Result<Self> {
        let table = config.app.table_name()?;
        let store = Arc::new(DuckDbStore::open(&config.database_path(), table)?);
        let migrator = Migrator::new(Arc::clone(&store), &config)?;

        log::debug!(
            "opened {} with migrations from {}",
            store.db_path().display(),
            migrator.root_dir().display()
        );

        Ok(Self {
            config,
            store,
            migrator,
        })
    }
}
