//! Hook Deploy Agent - webhook 驱动的应用重新部署代理
//!
//! 收到 GitHub push webhook 后重新 clone 应用仓库、安装依赖，
//! 并在重新部署时保留配置的文件

pub mod error;
pub mod middleware;
pub mod infra;
pub mod domain;
pub mod config;
pub mod state;
pub mod api;
pub mod services;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{DeployConfig, EnvConfig};
use crate::state::AppState;

/// 命令行覆盖的运行参数
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖 PORT 环境变量
    pub port_override: Option<u16>,
}

/// 初始化日志（只应调用一次）
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hook_deploy_agent=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 加载环境变量和部署配置
pub fn load_config() -> anyhow::Result<(EnvConfig, DeployConfig)> {
    let env = EnvConfig::from_env();
    error::set_verbose_errors(env.is_development());
    let deploy_config = DeployConfig::load(&env.config_path)?;
    Ok((env, deploy_config))
}

/// 启动 HTTP 服务，直到收到 Ctrl-C
pub async fn init_and_run_agent_with_config(runtime: RuntimeConfig) -> anyhow::Result<()> {
    let (mut env, deploy_config) = load_config()?;
    if let Some(port) = runtime.port_override {
        env.port = port;
    }
    let port = env.port;

    let state = Arc::new(AppState::new(env, deploy_config)?);
    let app = api::router(state.clone());

    spawn_task_cleanup(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, version = config::env::constants::VERSION, "Hook deploy agent listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// 定期清理过期的任务历史
fn spawn_task_cleanup(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            state.task_store.cleanup_stale().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
