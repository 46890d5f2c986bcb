//! Configuration management
//!
//! Settings live in a JSON file next to the migrations:
//! ```json
//! {
//!   "app": { "table": "main.schema_migrations", "statementTimeout": "5s", "fileMask": "..." },
//!   "database": { "path": "tidemark.duckdb" },
//!   "migrationsDir": null
//! }
//! ```
//! Relative paths are resolved against the directory holding the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// Default settings file name
pub const DEFAULT_CONFIG_FILE: &str = "tidemark.json";

/// Environment variable overriding `database.path`
pub const DATABASE_ENV: &str = "TIDEMARK_DATABASE";

const DEFAULT_TABLE: &str = "main.schema_migrations";
const DEFAULT_STATEMENT_TIMEOUT: &str = "5s";
const DEFAULT_FILE_MASK: &str = r"\d{4}-\d{2}-\d{2}-\S+.sql";
const DEFAULT_DATABASE_PATH: &str = "tidemark.duckdb";

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Bookkeeping table, optionally schema-qualified
    pub table: String,
    /// Statement timeout such as "5s" or "500ms"; empty disables it
    pub statement_timeout: String,
    /// Regular expression candidate filenames must match
    pub file_mask: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT.to_string(),
            file_mask: DEFAULT_FILE_MASK.to_string(),
        }
    }
}

impl AppConfig {
    /// Parse the bookkeeping table name
    pub fn table_name(&self) -> Result<TableName> {
        TableName::parse(&self.table)
    }

    /// Parsed statement timeout, `None` when disabled
    pub fn statement_timeout(&self) -> Result<Option<Duration>> {
        parse_duration(&self.statement_timeout)
    }

    /// Compile the file mask
    pub fn file_mask(&self) -> Result<Regex> {
        Regex::new(&self.file_mask)
            .map_err(|e| Error::config(format!("invalid file mask {:?}: {}", self.file_mask, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    /// DuckDB file, or ":memory:"
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

/// Tidemark configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Directory with migration files; defaults to the config file's directory
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    /// Load config from a settings file
    ///
    /// The database path can be overridden with `TIDEMARK_DATABASE`.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", config_path.display(), e))
        })?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("invalid {}: {}", config_path.display(), e)))?;

        config.base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if let Ok(path) = std::env::var(DATABASE_ENV) {
            if !path.is_empty() {
                config.database.path = path;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Write config to a settings file
    pub fn save(&self, config_path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content + "\n")?;
        Ok(())
    }

    /// Set the directory relative paths are resolved against
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Check every derived setting parses
    pub fn validate(&self) -> Result<()> {
        self.app.table_name()?;
        self.app.statement_timeout()?;
        self.app.file_mask()?;
        Ok(())
    }

    /// Directory the migration files are read from
    pub fn migrations_dir(&self) -> PathBuf {
        match &self.migrations_dir {
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.clone(),
        }
    }

    /// Database location; ":memory:" is passed through untouched
    pub fn database_path(&self) -> PathBuf {
        if self.database.path == ":memory:" {
            PathBuf::from(":memory:")
        } else {
            self.base_dir.join(&self.database.path)
        }
    }
}

/// Possibly schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('.').map(str::trim).collect();
        let valid = |p: &str| !p.is_empty() && !p.contains('"');
        match parts.as_slice() {
            [name] if valid(name) => Ok(Self {
                schema: None,
                name: name.to_string(),
            }),
            [schema, name] if valid(schema) && valid(name) => Ok(Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            }),
            _ => Err(Error::config(format!("invalid table name {:?}", raw))),
        }
    }

    /// Quoted table identifier
    pub fn quoted(&self) -> String {
        self.qualify(&self.name)
    }

    /// Quoted identifier of the sequence backing `id`
    pub fn sequence_quoted(&self) -> String {
        self.qualify(&format!("{}_id_seq", self.name))
    }

    fn qualify(&self, object: &str) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, object),
            None => format!("\"{}\"", object),
        }
    }
}

/// Parse a timeout such as "5s", "250ms", "2min" or "1h"
///
/// A bare number is taken as milliseconds. Empty or "0" disables the timeout.
pub fn parse_duration(raw: &str) -> Result<Option<Duration>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid duration {:?}", raw)))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::config(format!("duration {:?} is too large", raw)))
    };
    let duration = match unit.trim() {
        "" | "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "min" | "m" => secs(60)?,
        "h" => secs(3600)?,
        _ => return Err(Error::config(format!("invalid duration unit in {:?}", raw))),
    };

    Ok(if duration.is_zero() { None } else { Some(duration) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_file_mask_matches_dated_names() {
        let mask = AppConfig::default().file_mask().unwrap();
        assert!(mask.is_match("2022-12-12-01-create-table-statuses.sql"));
        assert!(mask.is_match("2022-12-12-03-add-comments-news-NONTR.sql"));
        assert!(!mask.is_match("create-table.sql"));
        assert!(!mask.is_match("README.md"));
    }

    #[test]
    fn test_invalid_file_mask() {
        let app = AppConfig {
            file_mask: "([".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(app.file_mask(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s").unwrap(), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("250ms").unwrap(), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2min").unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h").unwrap(), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1500").unwrap(), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("").unwrap(), None);
        assert_eq!(parse_duration("0").unwrap(), None);
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("5 weeks").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(matches!(parse_duration("99999999999999999h"), Err(Error::Config(_))));
        assert!(matches!(parse_duration("999999999999999999min"), Err(Error::Config(_))));
    }

    #[test]
    fn test_table_name() {
        let t = TableName::parse("main.schema_migrations").unwrap();
        assert_eq!(t.quoted(), "\"main\".\"schema_migrations\"");
        assert_eq!(t.sequence_quoted(), "\"main\".\"schema_migrations_id_seq\"");

        let t = TableName::parse("migrations").unwrap();
        assert_eq!(t.quoted(), "\"migrations\"");

        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("a.b.c").is_err());
        assert!(TableName::parse("bad\"name").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let config = Config {
            migrations_dir: Some(PathBuf::from("sql")),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.app, AppConfig::default());
        assert_eq!(loaded.migrations_dir(), dir.path().join("sql"));
        if std::env::var(DATABASE_ENV).is_err() {
            assert_eq!(loaded.database_path(), dir.path().join("tidemark.duckdb"));
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, r#"{ "app": { "statementTimeout": "" } }"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.app.table, "main.schema_migrations");
        assert_eq!(loaded.app.statement_timeout().unwrap(), None);
        assert_eq!(loaded.migrations_dir(), dir.path());
    }

    #[test]
    fn test_load_rejects_bad_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, r#"{ "app": { "table": "a.b.c" } }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
