//! Migration file loaded from disk

use std::path::Path;

use md5::{Digest, Md5};

use super::result::{Error, Result};

/// Filename suffix of migrations that must run outside a transaction
pub const NON_TRANSACTIONAL_SUFFIX: &str = "NONTR.sql";

/// Filename suffix of migrations that are never picked up automatically
pub const MANUAL_SUFFIX: &str = "MANUAL.sql";

/// How a migration is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// Body and bookkeeping row share one transaction
    Transactional,
    /// Body runs on the bare connection, bracketed by two bookkeeping writes
    NonTransactional,
}

impl MigrationKind {
    /// Derive the kind from a filename
    pub fn from_filename(filename: &str) -> Self {
        if filename.ends_with(NON_TRANSACTIONAL_SUFFIX) {
            MigrationKind::NonTransactional
        } else {
            MigrationKind::Transactional
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, MigrationKind::Transactional)
    }
}

/// A migration file with its content and checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub filename: String,
    pub content: Vec<u8>,
    pub checksum: String,
    pub kind: MigrationKind,
}

impl MigrationFile {
    /// Build a migration from in-memory content
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        let filename = filename.into();
        let checksum = md5_hex(&content);
        let kind = MigrationKind::from_filename(&filename);
        Self {
            filename,
            content,
            checksum,
            kind,
        }
    }

    /// Read `filename` from `root_dir`
    ///
    /// A missing or unreadable file is reported as `NotFound`, since it
    /// usually means the file was removed after it was planned.
    pub fn load(root_dir: &Path, filename: &str) -> Result<Self> {
        let path = root_dir.join(filename);
        let content = std::fs::read(&path)
            .map_err(|e| Error::not_found(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(filename, content))
    }

    /// Migration body as SQL text
    pub fn sql(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// MD5 of `data` as 32 lowercase hex characters
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// First non-transactional migration in a batch
pub fn first_non_transactional(migrations: &[MigrationFile]) -> Option<&MigrationFile> {
    migrations.iter().find(|m| !m.kind.is_transactional())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(
            MigrationKind::from_filename("2022-12-12-03-add-comments-news-NONTR.sql"),
            MigrationKind::NonTransactional
        );
        assert_eq!(
            MigrationKind::from_filename("2022-12-12-01-create-table-statuses.sql"),
            MigrationKind::Transactional
        );
        // suffix match is case-sensitive
        assert_eq!(
            MigrationKind::from_filename("2022-12-12-03-add-comments-nontr.sql"),
            MigrationKind::Transactional
        );
    }

    #[test]
    fn test_kind_ignores_content() {
        let m = MigrationFile::new("2024-01-01-a.sql", b"-- NONTR.sql".to_vec());
        assert_eq!(m.kind, MigrationKind::Transactional);
    }

    #[test]
    fn test_md5_known_values() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_identical_content_identical_checksum() {
        let a = MigrationFile::new("a.sql", b"CREATE TABLE t (id INTEGER);".to_vec());
        let b = MigrationFile::new("b.sql", b"CREATE TABLE t (id INTEGER);".to_vec());
        let c = MigrationFile::new("c.sql", b"CREATE TABLE t (id INTEGER) ".to_vec());
        assert_eq!(a.checksum, b.checksum);
        assert_ne!(a.checksum, c.checksum);
        assert_eq!(a.checksum.len(), 32);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = MigrationFile::load(dir.path(), "2024-01-01-gone.sql").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_load_reads_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("2024-01-01-a-NONTR.sql"), "SELECT 1;").unwrap();
        let m = MigrationFile::load(dir.path(), "2024-01-01-a-NONTR.sql").unwrap();
        assert_eq!(m.sql(), "SELECT 1;");
        assert_eq!(m.kind, MigrationKind::NonTransactional);
        assert_eq!(m.checksum, md5_hex(b"SELECT 1;"));
    }

    #[test]
    fn test_first_non_transactional() {
        let batch = vec![
            MigrationFile::new("a.sql", vec![]),
            MigrationFile::new("b-NONTR.sql", vec![]),
            MigrationFile::new("c-NONTR.sql", vec![]),
        ];
        assert_eq!(
            first_non_transactional(&batch).map(|m| m.filename.as_str()),
            Some("b-NONTR.sql")
        );
        assert!(first_non_transactional(&batch[..1]).is_none());
    }
}
