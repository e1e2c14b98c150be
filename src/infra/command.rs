//! 命令执行器
//!
//! 提供统一的子进程执行接口：
//! - stdout/stderr 分离，按到达顺序增量收集
//! - 结果通过 `Completion` 单次写入，"退出" 与 "启动/等待失败" 只有先到者生效

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
    /// 进程结束但未提交任何结果
    Abandoned,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
            CommandError::Abandoned => write!(f, "Command finished without reporting a result"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) | CommandError::WaitFailed(e) => Some(e),
            CommandError::Abandoned => None,
        }
    }
}

/// 命令执行结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// 退出码；被信号终止时为 None
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

enum CompletionState<T> {
    Pending(oneshot::Sender<T>),
    Settled,
}

/// 单次写入的结果单元
///
/// 第一次 `settle` 把状态从 `Pending` 转为 `Settled` 并投递结果，之后的调用被忽略。
pub struct Completion<T> {
    state: Mutex<CompletionState<T>>,
}

impl<T> Completion<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            state: Mutex::new(CompletionState::Pending(tx)),
        };
        (completion, rx)
    }

    /// 提交结果，返回本次提交是否生效
    pub fn settle(&self, value: T) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match std::mem::replace(&mut *state, CompletionState::Settled) {
            CompletionState::Pending(tx) => {
                let _ = tx.send(value);
                true
            }
            CompletionState::Settled => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        matches!(*state, CompletionState::Settled)
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => collected.extend_from_slice(&chunk[..n]),
        }
    }
    collected
}

impl CommandRunner {
    /// 执行命令并收集全部输出
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `work_dir` - 工作目录
    /// * `envs` - 追加的环境变量
    pub async fn run_capturing(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, CommandError> {
        let (completion, rx) = Completion::new();
        let completion = Arc::new(completion);

        let spawned = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        match spawned {
            Err(e) => {
                completion.settle(Err(CommandError::SpawnFailed(e)));
            }
            Ok(mut child) => {
                let stdout = child.stdout.take();
                let stderr = child.stderr.take();

                let stdout_task = tokio::spawn(async move {
                    match stdout {
                        Some(out) => drain(out).await,
                        None => Vec::new(),
                    }
                });
                let stderr_task = tokio::spawn(async move {
                    match stderr {
                        Some(err) => drain(err).await,
                        None => Vec::new(),
                    }
                });

                let exit_completion = completion.clone();
                let program = program.to_string();
                tokio::spawn(async move {
                    let status = child.wait().await;
                    let stdout = stdout_task.await.unwrap_or_default();
                    let stderr = stderr_task.await.unwrap_or_default();

                    let result = status
                        .map(|status| CommandOutput {
                            code: status.code(),
                            stdout,
                            stderr,
                        })
                        .map_err(CommandError::WaitFailed);

                    if !exit_completion.settle(result) {
                        debug!(program = %program, "Ignoring late completion signal");
                    }
                });
            }
        }

        rx.await.unwrap_or(Err(CommandError::Abandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_run_capturing_success() {
        let output = CommandRunner::run_capturing("echo", &["hello"], &PathBuf::from("/tmp"), &[])
            .await
            .unwrap();

        assert!(output.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn test_run_capturing_separates_streams_and_exit_code() {
        let output = CommandRunner::run_capturing(
            "sh",
            &["-c", "echo out; echo err 1>&2; exit 3"],
            &PathBuf::from("/tmp"),
            &[],
        )
        .await
        .unwrap();

        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[tokio::test]
    async fn test_run_capturing_passes_env() {
        let output = CommandRunner::run_capturing(
            "sh",
            &["-c", "printf %s \"$HDA_LABEL\""],
            &PathBuf::from("/tmp"),
            &[("HDA_LABEL", "staging")],
        )
        .await
        .unwrap();

        assert_eq!(output.stdout, b"staging");
    }

    #[tokio::test]
    async fn test_run_capturing_not_found() {
        let result =
            CommandRunner::run_capturing("nonexistent_command_12345", &[], &PathBuf::from("/tmp"), &[])
                .await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_completion_first_settle_wins() {
        let (completion, rx) = Completion::new();
        assert!(!completion.is_settled());
        assert!(completion.settle("exited"));
        assert!(!completion.settle("launch error"));
        assert!(completion.is_settled());
        assert_eq!(rx.await.unwrap(), "exited");
    }
}
