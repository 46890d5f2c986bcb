//! Service layer - migration orchestration

pub mod migrator;

pub use migrator::Migrator;
