//! 依赖安装相关领域模型

use std::fmt;

use crate::error::DeployError;

/// 应用类型，决定安装依赖所用的命令
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppType {
    /// `npm install`
    Node,
}

impl AppType {
    /// 解析配置中的应用类型（大小写不敏感）
    pub fn parse(value: &str) -> Result<Self, DeployError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "node" => Ok(AppType::Node),
            _ => Err(DeployError::Configuration(format!(
                "Unrecognized app type \"{}\"; cannot install",
                value
            ))),
        }
    }

    /// 安装命令
    pub fn install_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            AppType::Node => ("npm", &["install"]),
        }
    }

    /// 承载环境标签的环境变量名
    pub fn environment_variable(&self) -> &'static str {
        match self {
            AppType::Node => "NODE_ENV",
        }
    }
}

/// 安装进程的结束方式
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallTermination {
    /// 进程退出；被信号终止时 code 为 None
    Exited { code: Option<i32> },
    /// 进程未能启动
    LaunchFailed(String),
}

/// 一次安装的结果
#[derive(Clone, Debug)]
pub struct InstallOutcome {
    pub succeeded: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub termination: InstallTermination,
}

impl InstallOutcome {
    pub fn exited(code: Option<i32>, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            succeeded: code == Some(0),
            stdout,
            stderr,
            termination: InstallTermination::Exited { code },
        }
    }

    pub fn launch_failed(error: impl Into<String>, stderr: Vec<u8>) -> Self {
        Self {
            succeeded: false,
            stdout: Vec::new(),
            stderr,
            termination: InstallTermination::LaunchFailed(error.into()),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            InstallTermination::Exited { code } => code,
            InstallTermination::LaunchFailed(_) => None,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.termination {
            InstallTermination::Exited { code: Some(code) } => write!(f, "exit code {}", code),
            InstallTermination::Exited { code: None } => write!(f, "terminated by signal"),
            InstallTermination::LaunchFailed(e) => write!(f, "failed to launch: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_type_parse_is_case_insensitive() {
        assert_eq!(AppType::parse("node").unwrap(), AppType::Node);
        assert_eq!(AppType::parse("Node").unwrap(), AppType::Node);
        assert_eq!(AppType::Node.install_command(), ("npm", &["install"][..]));
    }

    #[test]
    fn test_app_type_parse_rejects_unknown_kind() {
        let err = AppType::parse("python").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("python"));
    }

    #[test]
    fn test_outcome_success_requires_zero_exit() {
        assert!(InstallOutcome::exited(Some(0), vec![], vec![]).succeeded);
        let failed = InstallOutcome::exited(Some(1), vec![], b"boom".to_vec());
        assert!(!failed.succeeded);
        assert_eq!(failed.exit_code(), Some(1));
        assert_eq!(failed.to_string(), "exit code 1");
        assert!(!InstallOutcome::exited(None, vec![], vec![]).succeeded);
    }

    #[test]
    fn test_launch_failure_has_no_exit_code() {
        let outcome = InstallOutcome::launch_failed("No such file or directory", vec![]);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code(), None);
        assert!(outcome.to_string().starts_with("failed to launch"));
    }
}
