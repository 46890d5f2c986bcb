//! Core domain entities
//!
//! Plain data structures describing migration files, bookkeeping rows and
//! the errors the engine reports. No database access lives here.

mod applied;
mod context;
mod migration;
pub mod result;

pub use applied::{AppliedMigration, InvalidMigration, MigrationStatus, NewAppliedMigration};
pub use context::ExecContext;
pub use migration::{
    first_non_transactional, md5_hex, MigrationFile, MigrationKind, MANUAL_SUFFIX,
    NON_TRANSACTIONAL_SUFFIX,
};
