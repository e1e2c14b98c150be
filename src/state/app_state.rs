//! 应用状态

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{DeployConfig, EnvConfig};
use crate::infra::{GitCli, RepositorySource};
use crate::services::deploy::{DependencyInstaller, Orchestrator, ProcessInstaller};

use super::task_store::TaskStore;

/// 应用状态
pub struct AppState {
    // ========== 核心配置 ==========
    /// 环境配置
    pub config: EnvConfig,
    /// GitHub webhook 共享密钥
    pub github_secret: String,
    /// 应用部署配置
    pub deploy_config: Arc<DeployConfig>,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,

    // ========== 部署 ==========
    /// 部署编排器
    pub orchestrator: Arc<Orchestrator>,
    /// 任务存储
    pub task_store: Arc<TaskStore>,
}

impl AppState {
    /// 使用 git CLI 和子进程安装器创建应用状态
    pub fn new(config: EnvConfig, deploy_config: DeployConfig) -> anyhow::Result<Self> {
        let installer = ProcessInstaller::new(config.node_env.clone());
        Self::with_backends(
            config,
            deploy_config,
            Arc::new(GitCli::default()),
            Arc::new(installer),
        )
    }

    /// 使用指定的代码源和安装器创建应用状态
    pub fn with_backends(
        config: EnvConfig,
        deploy_config: DeployConfig,
        source: Arc<dyn RepositorySource>,
        installer: Arc<dyn DependencyInstaller>,
    ) -> anyhow::Result<Self> {
        let github_secret = config
            .github_secret
            .clone()
            .context("GITHUB_SECRET must be set to verify webhook signatures")?;

        tracing::info!(
            port = config.port,
            base_dir = %config.base_dir.display(),
            config_path = %config.config_path.display(),
            api_key = config.api_key.is_some(),
            app_count = deploy_config.apps.len(),
            "Loaded configuration"
        );

        for (name, app) in &deploy_config.apps {
            tracing::info!(
                app = %name,
                repo = %app.repo,
                local_path = %app.local_path.display(),
                keep_patterns = app.files_to_keep.len(),
                "Registered app"
            );
        }

        let deploy_config = Arc::new(deploy_config);
        let orchestrator = Orchestrator::new(
            deploy_config.clone(),
            config.base_dir.clone(),
            source,
            installer,
        );

        Ok(Self {
            config,
            github_secret,
            deploy_config,
            started_at: Utc::now(),
            orchestrator: Arc::new(orchestrator),
            task_store: Arc::new(TaskStore::new()),
        })
    }
}
