//! Dependency installation

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::domain::install::{AppType, InstallOutcome};
use crate::error::DeployResult;
use crate::infra::CommandRunner;

/// Runs an application's dependency-installation command.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Fails only for configuration problems (unsupported `app_type`); a failing
    /// or unlaunchable process is reported through the outcome.
    async fn install(
        &self,
        local_path: &Path,
        app_type: &str,
        environment: Option<&str>,
    ) -> DeployResult<InstallOutcome>;
}

/// Installs by spawning the app kind's command as a child process.
#[derive(Clone, Debug, Default)]
pub struct ProcessInstaller {
    /// Used when the app has no `environment` configured.
    default_environment: Option<String>,
    command_override: Option<(String, Vec<String>)>,
}

impl ProcessInstaller {
    pub fn new(default_environment: Option<String>) -> Self {
        Self {
            default_environment,
            command_override: None,
        }
    }

    /// Replace the kind's install command, keeping kind validation and environment.
    pub fn with_command(mut self, program: impl Into<String>, args: &[&str]) -> Self {
        self.command_override = Some((
            program.into(),
            args.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }
}

#[async_trait]
impl DependencyInstaller for ProcessInstaller {
    async fn install(
        &self,
        local_path: &Path,
        app_type: &str,
        environment: Option<&str>,
    ) -> DeployResult<InstallOutcome> {
        let kind = AppType::parse(app_type)?;

        let (default_program, default_args) = kind.install_command();
        let (program, args): (&str, Vec<&str>) = match &self.command_override {
            Some((program, args)) => (program.as_str(), args.iter().map(String::as_str).collect()),
            None => (default_program, default_args.to_vec()),
        };

        let environment = environment.or(self.default_environment.as_deref());
        let envs: Vec<(&str, &str)> = environment
            .map(|env| vec![(kind.environment_variable(), env)])
            .unwrap_or_default();

        info!(
            command = %format!("{} {}", program, args.join(" ")),
            dir = %local_path.display(),
            environment = environment.unwrap_or("(unset)"),
            "Running install command"
        );

        let outcome = match CommandRunner::run_capturing(program, &args, local_path, &envs).await {
            Ok(output) => InstallOutcome::exited(output.code, output.stdout, output.stderr),
            Err(e) => InstallOutcome::launch_failed(e.to_string(), Vec::new()),
        };

        debug!(result = %outcome, succeeded = outcome.succeeded, "Install command finished");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::install::InstallTermination;

    #[tokio::test]
    async fn test_install_success_captures_stdout_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let installer = ProcessInstaller::new(None)
            .with_command("sh", &["-c", "printf 'installing for %s' \"$NODE_ENV\""]);

        let outcome = installer
            .install(dir.path(), "node", Some("production"))
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.stdout_lossy(), "installing for production");
        assert_eq!(outcome.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_install_falls_back_to_default_environment() {
        let dir = tempfile::tempdir().unwrap();
        let installer = ProcessInstaller::new(Some("staging".into()))
            .with_command("sh", &["-c", "printf %s \"$NODE_ENV\""]);

        let outcome = installer.install(dir.path(), "node", None).await.unwrap();
        assert_eq!(outcome.stdout_lossy(), "staging");
    }

    #[tokio::test]
    async fn test_install_runs_in_local_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let installer = ProcessInstaller::default().with_command("ls", &[]);

        let outcome = installer.install(dir.path(), "node", None).await.unwrap();
        assert!(outcome.stdout_lossy().contains("package.json"));
    }

    #[tokio::test]
    async fn test_install_nonzero_exit_is_unsuccessful_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let installer = ProcessInstaller::default()
            .with_command("sh", &["-c", "echo 'npm ERR! missing' 1>&2; exit 1"]);

        let outcome = installer.install(dir.path(), "node", None).await.unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code(), Some(1));
        assert!(outcome.stderr_lossy().contains("npm ERR! missing"));
    }

    #[tokio::test]
    async fn test_install_launch_failure_is_reported_in_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let installer = ProcessInstaller::default().with_command("nonexistent_npm_12345", &[]);

        let outcome = installer.install(dir.path(), "node", None).await.unwrap();
        assert!(!outcome.succeeded);
        assert!(matches!(outcome.termination, InstallTermination::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_unsupported_app_type_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());
        let installer = ProcessInstaller::default().with_command("sh", &["-c", script.as_str()]);

        let err = installer.install(dir.path(), "ruby", None).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(!marker.exists());
    }
}
