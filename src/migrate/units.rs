use std::path::{Path, PathBuf};

use tracing::warn;

use super::MigrationError;

pub const SCRIPT_EXT: &str = ".sql";
pub const ROLLBACK_SUFFIX: &str = "_rollback.sql";

/// A forward script found on disk. Its file name is its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub name: String,
    pub path: PathBuf,
}

impl MigrationUnit {
    pub async fn read_script(&self) -> Result<String, MigrationError> {
        read_script(&self.path).await
    }
}

pub(crate) async fn read_script(path: &Path) -> Result<String, MigrationError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| MigrationError::Discovery {
            path: path.to_path_buf(),
            source,
        })
}

pub fn is_forward_script(file_name: &str) -> bool {
    file_name.ends_with(SCRIPT_EXT) && !file_name.ends_with(ROLLBACK_SUFFIX)
}

/// `003_x.sql` -> `003_x_rollback.sql`.
pub fn rollback_name(unit_name: &str) -> String {
    let stem = unit_name.strip_suffix(SCRIPT_EXT).unwrap_or(unit_name);
    format!("{stem}{ROLLBACK_SUFFIX}")
}

/// Forward scripts in `dir`, sorted by file name.
pub async fn discover(dir: &Path) -> Result<Vec<MigrationUnit>, MigrationError> {
    let io_err = |source| MigrationError::Discovery {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut units = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(file = ?entry.file_name(), "skipping non UTF-8 file name in migrations directory");
            continue;
        };
        if !is_forward_script(&name) {
            continue;
        }
        let path = entry.path();
        let meta = tokio::fs::metadata(&path).await.map_err(|source| MigrationError::Discovery {
            path: path.clone(),
            source,
        })?;
        if !meta.is_file() {
            continue;
        }
        units.push(MigrationUnit { name, path });
    }

    units.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(units)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    /// Fresh directory under the system temp dir holding `files`.
    pub fn scratch_dir(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("zb-migrations-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        for (name, body) in files {
            std::fs::write(dir.join(name), body).expect("write script");
        }
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::testing::scratch_dir;
    use super::*;

    fn names(units: &[MigrationUnit]) -> Vec<&str> {
        units.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn rollback_names() {
        assert_eq!(rollback_name("003_x.sql"), "003_x_rollback.sql");
        assert_eq!(rollback_name("004_noext"), "004_noext_rollback.sql");
    }

    #[test]
    fn forward_script_filter() {
        assert!(is_forward_script("001_init.sql"));
        assert!(!is_forward_script("001_init_rollback.sql"));
        assert!(!is_forward_script("README.md"));
        assert!(!is_forward_script("001_init.sql.bak"));
        // only the suffix marks a rollback
        assert!(is_forward_script("002_rollback_support.sql"));
    }

    #[tokio::test]
    async fn discovers_sorted_forward_scripts_only() {
        let dir = scratch_dir(&[
            ("010_late.sql", "SELECT 1;"),
            ("002_add_col.sql", "SELECT 1;"),
            ("002_add_col_rollback.sql", "SELECT 1;"),
            ("001_init.sql", "SELECT 1;"),
            ("notes.txt", "ignored"),
        ]);
        std::fs::create_dir(dir.join("003_dir.sql")).expect("mkdir");

        let units = discover(&dir).await.expect("discover");
        assert_eq!(names(&units), vec!["001_init.sql", "002_add_col.sql", "010_late.sql"]);
        assert_eq!(units[0].path, dir.join("001_init.sql"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_directory_is_a_discovery_error() {
        let dir = std::env::temp_dir().join(format!("zb-missing-{}", uuid::Uuid::new_v4()));
        let err = discover(&dir).await.unwrap_err();
        assert!(matches!(err, MigrationError::Discovery { .. }));
    }
}
