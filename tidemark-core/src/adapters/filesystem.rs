//! Migration source reader - lists migration files in a directory

use std::path::Path;

use regex::Regex;

use crate::domain::result::Result;
use crate::domain::{MigrationFile, MANUAL_SUFFIX};

/// List candidate migration filenames in `root_dir`
///
/// Keeps regular files whose name matches `mask`, drops manual migrations,
/// and sorts by name. The naming convention makes lexical order temporal.
pub fn list_candidates(root_dir: &Path, mask: &Regex) -> Result<Vec<String>> {
    let mut filenames = Vec::new();

    for entry in std::fs::read_dir(root_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        // Non UTF-8 names cannot match a mask anyway
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if !mask.is_match(&name) || name.ends_with(MANUAL_SUFFIX) {
            continue;
        }

        filenames.push(name);
    }

    filenames.sort();
    Ok(filenames)
}

/// Load every file in `filenames` from `root_dir`, in order
pub fn load_all(root_dir: &Path, filenames: &[String]) -> Result<Vec<MigrationFile>> {
    filenames
        .iter()
        .map(|name| {
            MigrationFile::load(root_dir, name)
                .map_err(|e| e.in_migration(name.as_str(), crate::domain::result::Phase::Load))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::result::Error;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "SELECT 1;").unwrap();
    }

    #[test]
    fn test_list_candidates_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "2022-12-13-02-create-tags-table.sql");
        touch(dir.path(), "2022-12-12-01-create-table-statuses.sql");
        touch(dir.path(), "2022-12-12-03-add-comments-news-NONTR.sql");
        touch(dir.path(), "2022-12-12-02-create-table-news.sql");
        touch(dir.path(), "2022-12-14-01-reindex-MANUAL.sql");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "tidemark.json");
        std::fs::create_dir(dir.path().join("2022-12-15-01-dir.sql")).unwrap();

        let mask = AppConfig::default().file_mask().unwrap();
        let got = list_candidates(dir.path(), &mask).unwrap();

        assert_eq!(
            got,
            vec![
                "2022-12-12-01-create-table-statuses.sql",
                "2022-12-12-02-create-table-news.sql",
                "2022-12-12-03-add-comments-news-NONTR.sql",
                "2022-12-13-02-create-tags-table.sql",
            ]
        );
    }

    #[test]
    fn test_list_candidates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let mask = AppConfig::default().file_mask().unwrap();
        let err = list_candidates(&dir.path().join("missing"), &mask).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_load_all_names_missing_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "2024-01-01-a.sql");
        let names = vec!["2024-01-01-a.sql".to_string(), "2024-01-02-b.sql".to_string()];

        let err = load_all(dir.path(), &names).unwrap_err();
        assert_eq!(err.filename(), Some("2024-01-02-b.sql"));
        assert!(matches!(err.kind(), Error::NotFound(_)));
    }
}
