//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use tracing::warn;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// 应用 local_path 的基准目录
    pub base_dir: PathBuf,
    /// GitHub webhook 共享密钥
    pub github_secret: Option<String>,
    /// 部署配置文件路径
    pub config_path: PathBuf,
    /// NODE_ENV（development 时错误响应包含详细信息）
    pub node_env: Option<String>,
    /// 运维接口（install / temp-dirs）的 API 密钥，未设置则不校验
    pub api_key: Option<String>,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::DEFAULT_PORT);

        let base_dir = load_with_fallback("DEPLOY_TARGET_BASE", "HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                warn!("Neither DEPLOY_TARGET_BASE nor HOME is set, using current directory");
                PathBuf::from(".")
            });

        let github_secret = env::var("GITHUB_SECRET").ok().filter(|s| !s.is_empty());

        let config_path = env::var("DEPLOY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(constants::DEFAULT_CONFIG_FILE));

        let node_env = env::var("NODE_ENV").ok().filter(|s| !s.is_empty());

        let api_key = env::var("DEPLOY_AGENT_API_KEY").ok().filter(|s| !s.is_empty());

        Self {
            port,
            base_dir,
            github_secret,
            config_path,
            node_env,
            api_key,
        }
    }

    /// 是否为开发模式
    pub fn is_development(&self) -> bool {
        self.node_env.as_deref() == Some("development")
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    pub const DEFAULT_PORT: u16 = 3000;

    pub const DEFAULT_CONFIG_FILE: &str = "deploy.config.json";

    /// 任务历史最大保存数量
    pub const MAX_TASK_HISTORY: usize = 100;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
