//! 运行时状态模块
//!
//! 管理应用状态和任务存储

pub mod app_state;
pub mod task_store;

pub use app_state::AppState;
pub use task_store::TaskStore;
