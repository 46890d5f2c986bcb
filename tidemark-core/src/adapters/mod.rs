//! Adapter implementations
//!
//! Concrete technologies behind the engine:
//! - DuckDB for the bookkeeping store and migration execution
//! - Local filesystem for reading migration files

pub mod duckdb;
pub mod filesystem;
