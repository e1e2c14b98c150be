//! 部署任务与阶段记录
//!
//! webhook 触发的每次部署对应一个 `DeployTask`，按 `DeployState` 的顺序记录各阶段

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::DeployState;

/// 部署任务状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeployStatus::Running)
    }
}

/// 阶段状态
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 单个阶段的执行记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployStage {
    /// 阶段标识，取自 `DeployState::name`（如 "check_existing", "restore"）
    pub name: String,
    pub display_name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 毫秒
    pub duration_ms: Option<i64>,
    /// 结果摘要、失败原因或跳过原因
    pub message: Option<String>,
}

impl DeployStage {
    /// 某个状态对应的待执行阶段
    pub fn pending(state: DeployState) -> Self {
        Self {
            name: state.name().to_string(),
            display_name: state.display_name().to_string(),
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            message: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    pub fn succeed(&mut self, message: Option<String>) {
        self.close(StageStatus::Success, message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.close(StageStatus::Failed, Some(message.into()));
    }

    /// 跳过的阶段不记录时间
    pub fn skip(&mut self, reason: &str) {
        self.status = StageStatus::Skipped;
        self.message = Some(reason.to_string());
    }

    fn close(&mut self, status: StageStatus, message: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = self.started_at.map(|s| (now - s).num_milliseconds());
        self.message = message;
    }
}

/// 部署任务信息
#[derive(Clone, Debug, Serialize)]
pub struct DeployTask {
    pub id: String,
    pub app: String,
    pub status: DeployStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 失败原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stages: Vec<DeployStage>,
}

impl DeployTask {
    pub fn new(id: String, app: String) -> Self {
        Self {
            id,
            app,
            status: DeployStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            stages: Vec::new(),
        }
    }

    /// 正在执行的阶段
    pub fn current_stage(&self) -> Option<&DeployStage> {
        self.stages.iter().find(|s| s.status == StageStatus::Running)
    }

    pub fn complete(&mut self, status: DeployStatus, error: Option<String>) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!DeployStatus::Running.is_terminal());
        assert!(DeployStatus::Success.is_terminal());
        assert!(DeployStatus::Failed.is_terminal());
    }

    #[test]
    fn test_stage_records_timing_and_failure() {
        let mut stage = DeployStage::pending(DeployState::Clone);
        assert_eq!(stage.name, "clone");
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);

        stage.fail("exit code 128");
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.duration_ms.is_some());
        assert_eq!(stage.message.as_deref(), Some("exit code 128"));
    }

    #[test]
    fn test_skipped_stage_has_no_timing() {
        let mut stage = DeployStage::pending(DeployState::Restore);
        stage.skip("no files to keep");
        assert_eq!(stage.status, StageStatus::Skipped);
        assert!(stage.started_at.is_none());
        assert!(stage.finished_at.is_none());
    }

    #[test]
    fn test_task_tracks_current_stage_and_error() {
        let mut task = DeployTask::new("t-1".into(), "demo".into());
        let mut clone = DeployStage::pending(DeployState::Clone);
        clone.start();
        task.stages = vec![DeployStage::pending(DeployState::CheckExisting), clone];
        assert_eq!(task.current_stage().map(|s| s.name.as_str()), Some("clone"));

        task.complete(DeployStatus::Failed, Some("clone failed".into()));
        assert!(task.finished_at.is_some());
        assert_eq!(task.error.as_deref(), Some("clone failed"));
    }
}
