//! 部署上下文
//!
//! 部署执行期间的任务信息与阶段上报

use std::sync::Arc;

use crate::domain::deploy::{DeployStage, DeployStatus};
use crate::state::TaskStore;

/// 部署执行上下文
///
/// 通过 webhook 触发的部署带有 task_id 和任务存储，阶段变化会写入 `TaskStore`；
/// CLI 一次性部署使用 `detached`，不记录任务。
#[derive(Clone)]
pub struct DeployContext {
    /// 任务 ID
    pub task_id: Option<String>,
    /// 应用名称
    pub app: String,
    /// 任务存储
    pub task_store: Option<Arc<TaskStore>>,
}

impl DeployContext {
    /// 不记录任务的上下文
    pub fn detached(app: impl Into<String>) -> Self {
        Self {
            task_id: None,
            app: app.into(),
            task_store: None,
        }
    }

    /// 记录到任务存储的上下文
    pub fn tracked(task_id: impl Into<String>, app: impl Into<String>, store: Arc<TaskStore>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            app: app.into(),
            task_store: Some(store),
        }
    }

    /// 日志中使用的任务 ID
    pub fn task_label(&self) -> &str {
        self.task_id.as_deref().unwrap_or("-")
    }

    /// 更新任务阶段
    pub async fn update_stages(&self, stages: &[DeployStage]) {
        if let (Some(task_id), Some(store)) = (&self.task_id, &self.task_store) {
            store.update_stages(task_id, stages.to_vec()).await;
        }
    }

    /// 完成任务
    pub async fn finish(&self, status: DeployStatus, error: Option<String>, stages: Vec<DeployStage>) {
        if let (Some(task_id), Some(store)) = (&self.task_id, &self.task_store) {
            store.update_stages(task_id, stages).await;
            store.finish(task_id, status, error).await;
        }
    }
}
