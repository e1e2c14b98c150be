//! Git 仓库来源
//!
//! 通过 git CLI 执行 clone

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::command::CommandRunner;
use crate::error::{DeployError, DeployResult};

/// 把远程仓库 clone 到本地目录
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// clone `repo` 到 `local_path`；`local_path` 必须不存在或为空目录
    async fn clone_repo(&self, repo: &str, local_path: &Path, branch: Option<&str>)
        -> DeployResult<()>;
}

/// 基于 `git clone` 的实现
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    /// 使用指定的 git 可执行文件
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn clone_args<'a>(repo: &'a str, target: &'a str, branch: Option<&'a str>) -> Vec<&'a str> {
    let mut args = vec!["clone"];
    if let Some(branch) = branch {
        args.push("--branch");
        args.push(branch);
    }
    args.push("--");
    args.push(repo);
    args.push(target);
    args
}

#[async_trait]
impl RepositorySource for GitCli {
    async fn clone_repo(
        &self,
        repo: &str,
        local_path: &Path,
        branch: Option<&str>,
    ) -> DeployResult<()> {
        let clone_error = |message: String| DeployError::Clone {
            repo: repo.to_string(),
            path: local_path.to_path_buf(),
            message,
        };

        let parent = local_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DeployError::fs("create directory", parent, e))?;

        // git 在 parent 中运行，目标用相对于 parent 的目录名
        let target = local_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .ok_or_else(|| clone_error("local path has no directory name".to_string()))?;
        let args = clone_args(repo, &target, branch);

        info!(
            repo = %repo,
            branch = branch.unwrap_or("(default)"),
            path = %local_path.display(),
            "Cloning repository"
        );

        let output = CommandRunner::run_capturing(&self.program, &args, parent, &[])
            .await
            .map_err(|e| clone_error(e.to_string()))?;

        if !output.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(clone_error(format!("git exited with {}: {}", code, stderr)));
        }

        debug!(path = %local_path.display(), "Clone finished");
        Ok(())
    }
}
