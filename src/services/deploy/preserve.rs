//! File preservation across a wipe-and-reclone
//!
//! The working tree is renamed into a holding directory, pruned down to the
//! kept set, and after the fresh clone the remaining entries are merged back.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{DeployError, DeployResult};

/// Keep patterns resolved against a concrete tree.
///
/// Built before anything is moved or deleted, since pattern resolution depends on
/// the pre-deletion contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeepPlan {
    /// Matched paths, relative to the working tree root. A matched directory is
    /// kept with everything below it.
    kept: BTreeSet<PathBuf>,
}

impl KeepPlan {
    pub fn kept(&self) -> impl Iterator<Item = &Path> {
        self.kept.iter().map(PathBuf::as_path)
    }

    /// `rel` is a kept path or lies inside one.
    pub fn keeps(&self, rel: &Path) -> bool {
        self.kept.iter().any(|k| rel.starts_with(k))
    }

    /// `rel` is a directory that contains a kept path and must survive pruning.
    pub fn contains_kept(&self, rel: &Path) -> bool {
        self.kept.iter().any(|k| k != rel && k.starts_with(rel))
    }
}

fn build_globset(root: &Path, patterns: &[String]) -> DeployResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for raw in patterns {
        let candidate = Path::new(raw.as_str());
        let relative = if candidate.is_absolute() {
            match candidate.strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => {
                    warn!(pattern = %raw, root = %root.display(), "Keep pattern outside local path ignored");
                    continue;
                }
            }
        } else {
            candidate
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect::<PathBuf>()
        };

        let pattern = relative.to_string_lossy().trim_end_matches('/').to_string();
        if pattern.is_empty() {
            continue;
        }

        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                DeployError::Configuration(format!("Invalid keep pattern \"{}\": {}", raw, e))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| DeployError::Configuration(format!("Invalid keep patterns: {}", e)))
}

/// Moves a working tree in and out of a holding directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilePreserver;

impl FilePreserver {
    /// Resolve `patterns` against the current contents of `local_path`.
    pub async fn plan(&self, local_path: &Path, patterns: &[String]) -> DeployResult<KeepPlan> {
        let root = local_path.to_path_buf();
        let patterns = patterns.to_vec();
        blocking("resolve keep patterns in", local_path, move || {
            resolve_plan(&root, &patterns)
        })
        .await
    }

    /// Rename the whole `local_path` to `temp_dir`. Afterwards `local_path` no
    /// longer exists.
    pub async fn preserve(&self, local_path: &Path, temp_dir: &Path) -> DeployResult<()> {
        if let Some(parent) = temp_dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeployError::fs("create directory", parent, e))?;
        }

        info!(
            from = %local_path.display(),
            to = %temp_dir.display(),
            "Moving working tree to temp directory"
        );
        tokio::fs::rename(local_path, temp_dir)
            .await
            .map_err(|e| DeployError::fs("move working tree to", temp_dir, e))
    }

    /// Delete everything in the held tree that the plan does not keep.
    pub async fn prune(&self, held_root: &Path, plan: &KeepPlan) -> DeployResult<usize> {
        let root = held_root.to_path_buf();
        let plan = plan.clone();
        blocking("prune", held_root, move || prune_dir(&root, Path::new(""), &plan)).await
    }

    /// Move every entry under `temp_dir` to the same relative position under
    /// `local_path`. Existing directories are merged; existing files are replaced.
    ///
    /// Stops at the first failure. Entries moved before it stay moved.
    pub async fn restore(&self, temp_dir: &Path, local_path: &Path) -> DeployResult<usize> {
        let from = temp_dir.to_path_buf();
        let to = local_path.to_path_buf();
        let moved = tokio::task::spawn_blocking(move || restore_entries(&from, &to))
            .await
            .map_err(|e| DeployError::Restore {
                from: temp_dir.to_path_buf(),
                to: local_path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, e),
            })??;
        info!(count = moved, to = %local_path.display(), "Restored kept files");
        Ok(moved)
    }
}

async fn blocking<T, F>(op: &'static str, path: &Path, f: F) -> DeployResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DeployResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeployError::fs(op, path, io::Error::new(io::ErrorKind::Other, e)))?
}

fn resolve_plan(root: &Path, patterns: &[String]) -> DeployResult<KeepPlan> {
    let globs = build_globset(root, patterns)?;
    let mut kept = BTreeSet::new();

    let mut entries = WalkDir::new(root).min_depth(1).follow_links(false).into_iter();
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            DeployError::fs("walk", path, e.into())
        })?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if globs.is_match(rel) {
            kept.insert(rel.to_path_buf());
            if entry.file_type().is_dir() {
                entries.skip_current_dir();
            }
        }
    }

    debug!(root = %root.display(), kept = kept.len(), "Resolved keep patterns");
    Ok(KeepPlan { kept })
}

fn prune_dir(root: &Path, rel_dir: &Path, plan: &KeepPlan) -> DeployResult<usize> {
    let dir = root.join(rel_dir);
    let mut removed = 0;
    let entries = fs::read_dir(&dir).map_err(|e| DeployError::fs("read directory", &dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| DeployError::fs("read directory", &dir, e))?;
        let rel = rel_dir.join(entry.file_name());
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| DeployError::fs("inspect", &path, e))?;

        if plan.keeps(&rel) {
            continue;
        }
        if file_type.is_dir() && plan.contains_kept(&rel) {
            removed += prune_dir(root, &rel, plan)?;
            continue;
        }

        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| DeployError::fs("delete", &path, e))?;
        } else {
            fs::remove_file(&path).map_err(|e| DeployError::fs("delete", &path, e))?;
        }
        removed += 1;
    }

    Ok(removed)
}

fn restore_entries(from_dir: &Path, to_dir: &Path) -> DeployResult<usize> {
    let restore_err = |from: &Path, to: &Path, source: io::Error| DeployError::Restore {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::create_dir_all(to_dir).map_err(|e| restore_err(from_dir, to_dir, e))?;
    let mut entries = fs::read_dir(from_dir)
        .and_then(|dir| dir.collect::<io::Result<Vec<_>>>())
        .map_err(|e| restore_err(from_dir, to_dir, e))?;
    // 按名称顺序移动，部分恢复时结果可预期
    entries.sort_by_key(|entry| entry.file_name());

    let mut moved = 0;
    for entry in entries {
        let src = entry.path();
        let dst = to_dir.join(entry.file_name());
        let src_is_dir = entry
            .file_type()
            .map_err(|e| restore_err(&src, &dst, e))?
            .is_dir();

        match fs::symlink_metadata(&dst) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(from = %src.display(), to = %dst.display(), "Moving kept entry");
                fs::rename(&src, &dst).map_err(|e| restore_err(&src, &dst, e))?;
                moved += 1;
            }
            Err(e) => return Err(restore_err(&src, &dst, e)),
            Ok(meta) if src_is_dir && meta.is_dir() => {
                moved += restore_entries(&src, &dst)?;
                fs::remove_dir(&src).map_err(|e| restore_err(&src, &dst, e))?;
            }
            Ok(meta) => {
                debug!(to = %dst.display(), "Replacing cloned entry with kept entry");
                if meta.is_dir() {
                    fs::remove_dir_all(&dst).map_err(|e| restore_err(&src, &dst, e))?;
                } else {
                    fs::remove_file(&dst).map_err(|e| restore_err(&src, &dst, e))?;
                }
                fs::rename(&src, &dst).map_err(|e| restore_err(&src, &dst, e))?;
                moved += 1;
            }
        }
    }

    Ok(moved)
}
