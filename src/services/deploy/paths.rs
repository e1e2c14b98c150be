//! Local deployment paths and temp-directory naming

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};

const TEMP_MARKER: &str = "_temp_";

/// Names the holding directories of one application.
///
/// Every temp dir of an app lives next to its local path and is named
/// `<basename>_temp_<suffix>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TempDirPrefix {
    pub parent: PathBuf,
    pub name_prefix: String,
}

impl TempDirPrefix {
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.name_prefix)
    }

    pub fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.parent.join(format!("{}{}", self.name_prefix, suffix))
    }

    /// Glob form, for logs.
    pub fn pattern(&self) -> String {
        format!("{}*", self.parent.join(&self.name_prefix).display())
    }
}

/// Resolves configured apps to directories under the base dir.
#[derive(Clone, Debug)]
pub struct PathResolver {
    base_dir: PathBuf,
    config: Arc<DeployConfig>,
}

impl PathResolver {
    /// A relative `base_dir` is resolved against the current directory once, here.
    pub fn new(base_dir: impl Into<PathBuf>, config: Arc<DeployConfig>) -> Self {
        Self {
            base_dir: absolutize(base_dir.into()),
            config,
        }
    }

    /// `base_dir / localPath`
    pub fn local_path(&self, app: &str) -> DeployResult<PathBuf> {
        let app_config = self.config.get(app)?;
        Ok(self.base_dir.join(&app_config.local_path))
    }

    pub fn temp_dir_prefix(&self, app: &str) -> DeployResult<TempDirPrefix> {
        let local_path = self.local_path(app)?;
        let basename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DeployError::Configuration(format!(
                    "Local path {} of app \"{}\" has no directory name",
                    local_path.display(),
                    app
                ))
            })?;
        let parent = local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());

        Ok(TempDirPrefix {
            parent,
            name_prefix: format!("{}{}", basename, TEMP_MARKER),
        })
    }

    /// Fresh holding directory name: millisecond timestamp plus a short random tag.
    pub fn temp_dir_name(&self, app: &str) -> DeployResult<PathBuf> {
        let prefix = self.temp_dir_prefix(app)?;
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let suffix = format!("{}_{}", Utc::now().timestamp_millis(), &tag[..8]);
        Ok(prefix.with_suffix(&suffix))
    }
}

fn absolutize(base_dir: PathBuf) -> PathBuf {
    if base_dir.is_absolute() {
        return base_dir;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(base_dir),
        Err(e) => {
            warn!(base_dir = %base_dir.display(), error = %e, "Cannot resolve relative base dir");
            base_dir
        }
    }
}
