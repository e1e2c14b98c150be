//! Temp directory cleanup

use std::io;
use std::path::PathBuf;

use tracing::{debug, info};

use super::paths::TempDirPrefix;
use crate::error::{DeployError, DeployResult};

/// Removes every `<basename>_temp_*` entry next to an app's local path.
#[derive(Clone, Copy, Debug, Default)]
pub struct TempDirJanitor;

impl TempDirJanitor {
    /// Matching entries, sorted. A missing parent yields none.
    pub async fn find(&self, prefix: &TempDirPrefix) -> DeployResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&prefix.parent).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DeployError::fs("read directory", &prefix.parent, e)),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DeployError::fs("read directory", &prefix.parent, e))?
        {
            if prefix.matches(&entry.file_name().to_string_lossy()) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Returns the number of entries removed. Nothing to remove is not an error.
    pub async fn clean(&self, prefix: &TempDirPrefix) -> DeployResult<usize> {
        info!(pattern = %prefix.pattern(), "Deleting temp directories");

        let mut removed = 0;
        for path in self.find(prefix).await? {
            let file_type = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta.file_type(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(DeployError::fs("inspect", &path, e)),
            };
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed temp directory");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(DeployError::fs("delete", &path, e)),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_clean_removes_only_matching_entries_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("demo_temp_1/data")).unwrap();
        fs::create_dir_all(dir.path().join("demo_temp_2")).unwrap();
        fs::create_dir_all(dir.path().join("demo")).unwrap();
        fs::create_dir_all(dir.path().join("other_temp_1")).unwrap();

        let prefix = TempDirPrefix {
            parent: dir.path().to_path_buf(),
            name_prefix: "demo_temp_".to_string(),
        };

        assert_eq!(TempDirJanitor.clean(&prefix).await.unwrap(), 2);
        assert!(dir.path().join("demo").exists());
        assert!(dir.path().join("other_temp_1").exists());
        assert!(!dir.path().join("demo_temp_1").exists());

        assert_eq!(TempDirJanitor.clean(&prefix).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_lists_matching_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("demo_temp_2")).unwrap();
        fs::create_dir_all(dir.path().join("demo_temp_1")).unwrap();
        fs::create_dir_all(dir.path().join("demo")).unwrap();

        let prefix = TempDirPrefix {
            parent: dir.path().to_path_buf(),
            name_prefix: "demo_temp_".to_string(),
        };

        assert_eq!(
            TempDirJanitor.find(&prefix).await.unwrap(),
            vec![dir.path().join("demo_temp_1"), dir.path().join("demo_temp_2")]
        );
    }

    #[tokio::test]
    async fn test_clean_with_missing_parent_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = TempDirPrefix {
            parent: dir.path().join("missing"),
            name_prefix: "demo_temp_".to_string(),
        };
        assert_eq!(TempDirJanitor.clean(&prefix).await.unwrap(), 0);
    }
}
