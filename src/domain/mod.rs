//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod deploy;
pub mod install;
pub mod run;

// Re-exports for convenience
pub use deploy::{DeployStage, DeployStatus, DeployTask, StageStatus};
pub use install::{AppType, InstallOutcome, InstallTermination};
pub use run::{DeployState, DeploymentRun, FailurePolicy, OnFailure};
