//! 基础设施模块
//!
//! 封装外部依赖（子进程执行、git）

pub mod command;
pub mod git;

pub use command::{CommandRunner, Completion};
pub use git::{GitCli, RepositorySource};
