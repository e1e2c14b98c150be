//! 部署服务模块
//!
//! 路径解析、文件保留、依赖安装、临时目录清理以及串联它们的编排器

pub mod context;
pub mod install;
pub mod janitor;
pub mod locks;
pub mod orchestrator;
pub mod paths;
pub mod preserve;

use std::sync::Arc;

use crate::domain::deploy::DeployStatus;
use crate::state::AppState;

pub use context::DeployContext;
pub use install::{DependencyInstaller, ProcessInstaller};
pub use janitor::TempDirJanitor;
pub use locks::DeployLocks;
pub use orchestrator::{DeployReport, Orchestrator};
pub use paths::{PathResolver, TempDirPrefix};
pub use preserve::{FilePreserver, KeepPlan};

/// 执行 webhook 触发的部署任务
///
/// 在后台运行，结果写入任务存储；失败只记录日志，不会传给 webhook 调用方
pub async fn execute(state: Arc<AppState>, task_id: String, app: String) {
    let ctx = DeployContext::tracked(task_id.clone(), app.clone(), state.task_store.clone());

    match state.orchestrator.deploy_with_context(&ctx).await {
        Ok(report) => {
            let install_ok = report.install.as_ref().map_or(true, |o| o.succeeded);
            tracing::info!(
                task_id = %task_id,
                app = %app,
                preserved = report.preserved,
                install_ok,
                "Deployment completed"
            );
            ctx.finish(DeployStatus::Success, None, report.stages).await;
        }
        Err(e) => {
            tracing::error!(task_id = %task_id, app = %app, error = %e, "Deployment failed");
            let stages = state
                .task_store
                .get(&task_id)
                .await
                .map(|t| t.stages)
                .unwrap_or_default();
            ctx.finish(DeployStatus::Failed, Some(e.to_string()), stages).await;
        }
    }
}
