//! 配置模块
//!
//! 环境变量解析与应用部署配置

pub mod apps;
pub mod env;

pub use apps::{AppConfig, DeployConfig};
pub use env::EnvConfig;
