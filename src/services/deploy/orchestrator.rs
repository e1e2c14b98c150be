//! Deploy orchestration
//!
//! Drives one run through the `DeployState` transition table and applies the
//! per-step `FailurePolicy`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::context::DeployContext;
use super::install::DependencyInstaller;
use super::janitor::TempDirJanitor;
use super::locks::DeployLocks;
use super::paths::PathResolver;
use super::preserve::{FilePreserver, KeepPlan};
use crate::config::{AppConfig, DeployConfig};
use crate::domain::deploy::{DeployStage, StageStatus};
use crate::domain::install::InstallOutcome;
use crate::domain::run::{DeployState, DeploymentRun, OnFailure};
use crate::error::{DeployError, DeployResult};
use crate::infra::RepositorySource;

/// Result of a completed deploy run.
#[derive(Clone, Debug)]
pub struct DeployReport {
    pub app: String,
    pub local_path: PathBuf,
    pub preserved: bool,
    pub temp_dir: Option<PathBuf>,
    /// `None` only if the run never reached the install step.
    pub install: Option<InstallOutcome>,
    pub stages: Vec<DeployStage>,
}

/// Stage list for one run, indexed by `DeployState`.
struct StageBoard {
    stages: Vec<(DeployState, DeployStage)>,
}

impl StageBoard {
    fn new() -> Self {
        Self {
            stages: DeployState::STEPS
                .iter()
                .map(|s| (*s, DeployStage::pending(*s)))
                .collect(),
        }
    }

    fn get(&mut self, state: DeployState) -> Option<&mut DeployStage> {
        self.stages
            .iter_mut()
            .find(|(s, _)| *s == state)
            .map(|(_, stage)| stage)
    }

    fn skip_pending(&mut self, filter: impl Fn(DeployState) -> bool, reason: &str) {
        for (state, stage) in self.stages.iter_mut() {
            if stage.status == StageStatus::Pending && filter(*state) {
                stage.skip(reason);
            }
        }
    }

    fn snapshot(&self) -> Vec<DeployStage> {
        self.stages.iter().map(|(_, stage)| stage.clone()).collect()
    }
}

/// Mutable bits of a run shared between steps.
struct RunState<'a> {
    run: DeploymentRun,
    app_config: &'a AppConfig,
    plan: Option<KeepPlan>,
    install: Option<InstallOutcome>,
}

/// Composes path resolution, preservation, clone, install and cleanup.
pub struct Orchestrator {
    config: Arc<DeployConfig>,
    paths: PathResolver,
    source: Arc<dyn RepositorySource>,
    installer: Arc<dyn DependencyInstaller>,
    preserver: FilePreserver,
    janitor: TempDirJanitor,
    locks: DeployLocks,
}

impl Orchestrator {
    pub fn new(
        config: Arc<DeployConfig>,
        base_dir: impl Into<PathBuf>,
        source: Arc<dyn RepositorySource>,
        installer: Arc<dyn DependencyInstaller>,
    ) -> Self {
        Self {
            paths: PathResolver::new(base_dir, config.clone()),
            config,
            source,
            installer,
            preserver: FilePreserver,
            janitor: TempDirJanitor,
            locks: DeployLocks::new(),
        }
    }

    /// Apps with a deploy or install currently holding their lock.
    pub async fn busy_apps(&self) -> Vec<String> {
        self.locks.busy_apps().await
    }

    /// Full redeploy of `app`, without task tracking.
    pub async fn deploy(&self, app: &str) -> DeployResult<DeployReport> {
        self.deploy_with_context(&DeployContext::detached(app)).await
    }

    /// Full redeploy of `ctx.app`, reporting stage progress through `ctx`.
    ///
    /// Runs of the same app are serialized; a second call waits for the first.
    pub async fn deploy_with_context(&self, ctx: &DeployContext) -> DeployResult<DeployReport> {
        let app = ctx.app.as_str();
        let app_config = self.config.get(app)?;
        let local_path = self.paths.local_path(app)?;
        let policy = app_config.failure_policy();

        let _guard = self.locks.acquire(app).await;
        info!(app = %app, task_id = %ctx.task_label(), path = %local_path.display(), "Starting deploy");

        let mut rs = RunState {
            run: DeploymentRun::new(app, local_path, app_config.keeps_files()),
            app_config,
            plan: None,
            install: None,
        };
        let mut board = StageBoard::new();
        let mut state = DeployState::CheckExisting;

        while state != DeployState::Done {
            if let Some(stage) = board.get(state) {
                stage.start();
            }
            ctx.update_stages(&board.snapshot()).await;

            let result = self.run_step(state, &mut rs).await;

            match result {
                Ok(message) => {
                    if let Some(stage) = board.get(state) {
                        stage.succeed(message);
                    }
                }
                Err(err) => {
                    if let Some(stage) = board.get(state) {
                        stage.fail(err.to_string());
                    }
                    let on_failure = if err.is_configuration() {
                        OnFailure::Abort
                    } else {
                        policy.on_failure(state)
                    };
                    match on_failure {
                        OnFailure::Abort => {
                            error!(app = %app, step = state.name(), error = %err, "Deploy aborted");
                            if let Some(temp_dir) = &rs.run.temp_dir {
                                if state != DeployState::Cleanup {
                                    warn!(
                                        app = %app,
                                        temp_dir = %temp_dir.display(),
                                        "Kept files remain in temp directory"
                                    );
                                }
                            }
                            board.skip_pending(|_| true, "aborted");
                            ctx.update_stages(&board.snapshot()).await;
                            return Err(err);
                        }
                        OnFailure::LogAndContinue => {
                            warn!(app = %app, step = state.name(), error = %err, "Step failed, continuing");
                        }
                    }
                }
            }

            if state == DeployState::CheckExisting && !rs.run.is_preserving() {
                let reason = if rs.run.preserved_files_requested {
                    "no existing directory"
                } else {
                    "no files to keep"
                };
                board.skip_pending(DeployState::requires_preservation, reason);
            }

            state = state.next(rs.run.is_preserving()).unwrap_or(DeployState::Done);
        }

        let stages = board.snapshot();
        ctx.update_stages(&stages).await;
        info!(app = %app, task_id = %ctx.task_label(), "Deploy finished");

        Ok(DeployReport {
            app: app.to_string(),
            preserved: rs.run.is_preserving(),
            local_path: rs.run.local_path,
            temp_dir: rs.run.temp_dir,
            install: rs.install,
            stages,
        })
    }

    async fn run_step(&self, state: DeployState, rs: &mut RunState<'_>) -> DeployResult<Option<String>> {
        let app = rs.run.app_name.clone();
        let local_path = rs.run.local_path.clone();

        match state {
            DeployState::CheckExisting => {
                rs.run.has_existing_directory = directory_exists(&local_path).await?;
                debug!(app = %app, exists = rs.run.has_existing_directory, "Checked local path");
                if rs.run.has_existing_directory {
                    return Ok(Some("existing directory found".to_string()));
                }
                if !rs.run.preserved_files_requested {
                    return Ok(Some("no existing directory".to_string()));
                }
                let leftovers = self.held_leftovers(&app).await;
                if leftovers.is_empty() {
                    return Ok(Some("no existing directory".to_string()));
                }
                // 下一次带 cleanup 的部署会删除这些目录
                warn!(
                    app = %app,
                    count = leftovers.len(),
                    first = %leftovers[0].display(),
                    "Local path is missing but temp directories from an earlier run hold kept files"
                );
                Ok(Some(format!(
                    "no existing directory; {} temp director{} from an earlier run still hold kept files",
                    leftovers.len(),
                    if leftovers.len() == 1 { "y" } else { "ies" }
                )))
            }
            DeployState::Preserve => {
                let plan = self
                    .preserver
                    .plan(&local_path, &rs.app_config.files_to_keep)
                    .await?;
                let temp_dir = self.paths.temp_dir_name(&app)?;
                self.preserver.preserve(&local_path, &temp_dir).await?;
                let message = format!("{} kept path(s) held in {}", plan.kept().count(), temp_dir.display());
                rs.plan = Some(plan);
                rs.run.temp_dir = Some(temp_dir);
                Ok(Some(message))
            }
            DeployState::Delete => {
                if !rs.run.has_existing_directory {
                    return Ok(Some("nothing to delete".to_string()));
                }
                match (&rs.run.temp_dir, &rs.plan) {
                    (Some(temp_dir), Some(plan)) => {
                        let removed = self.preserver.prune(temp_dir, plan).await?;
                        Ok(Some(format!("removed {} entries not kept", removed)))
                    }
                    _ => {
                        info!(app = %app, path = %local_path.display(), "Deleting working tree");
                        tokio::fs::remove_dir_all(&local_path)
                            .await
                            .map_err(|e| DeployError::fs("delete", &local_path, e))?;
                        Ok(None)
                    }
                }
            }
            DeployState::Clone => {
                let cfg = rs.app_config;
                self.source
                    .clone_repo(&cfg.repo, &local_path, cfg.branch.as_deref())
                    .await?;
                Ok(cfg.branch.as_ref().map(|b| format!("branch {}", b)))
            }
            DeployState::Install => {
                let cfg = rs.app_config;
                let outcome = self
                    .installer
                    .install(&local_path, &cfg.app_type, cfg.environment.as_deref())
                    .await?;
                let result = check_install(&app, &outcome);
                rs.install = Some(outcome);
                result.map(|_| None)
            }
            DeployState::Restore => {
                let temp_dir = rs.run.temp_dir.clone().ok_or_else(|| {
                    DeployError::Precondition("restore requested without a temp directory".into())
                })?;
                info!(app = %app, "Moving kept files back to local path");
                let moved = self.preserver.restore(&temp_dir, &local_path).await?;
                Ok(Some(format!("restored {} entries", moved)))
            }
            DeployState::Cleanup => {
                let prefix = self.paths.temp_dir_prefix(&app)?;
                let removed = self.janitor.clean(&prefix).await?;
                Ok(Some(format!("removed {} temp directories", removed)))
            }
            DeployState::Done => Ok(None),
        }
    }

    /// Temp directories left behind by an aborted run. Lookup errors only log.
    async fn held_leftovers(&self, app: &str) -> Vec<PathBuf> {
        let found = match self.paths.temp_dir_prefix(app) {
            Ok(prefix) => self.janitor.find(&prefix).await,
            Err(e) => Err(e),
        };
        found.unwrap_or_else(|e| {
            debug!(app = %app, error = %e, "Could not look for leftover temp directories");
            Vec::new()
        })
    }

    /// Reinstall dependencies in the existing working tree.
    ///
    /// The local path must exist and be non-empty. An unsuccessful install is an error.
    pub async fn install_only(&self, app: &str) -> DeployResult<InstallOutcome> {
        let app_config = self.config.get(app)?;
        let local_path = self.paths.local_path(app)?;

        let _guard = self.locks.acquire(app).await;

        ensure_populated(&local_path).await?;

        let outcome = self
            .installer
            .install(&local_path, &app_config.app_type, app_config.environment.as_deref())
            .await?;
        check_install(app, &outcome)?;
        Ok(outcome)
    }

    /// Remove every temp directory of `app`. Safe to call with none present.
    pub async fn clean_temp_dirs(&self, app: &str) -> DeployResult<usize> {
        let prefix = self.paths.temp_dir_prefix(app)?;
        let _guard = self.locks.acquire(app).await;
        self.janitor.clean(&prefix).await
    }
}

async fn directory_exists(path: &Path) -> DeployResult<bool> {
    match tokio::fs::read_dir(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DeployError::fs("read directory", path, e)),
    }
}

async fn ensure_populated(path: &Path) -> DeployResult<()> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DeployError::Precondition(format!(
                "Local path {} does not exist",
                path.display()
            )));
        }
        Err(e) => return Err(DeployError::fs("read directory", path, e)),
    };

    let first = entries
        .next_entry()
        .await
        .map_err(|e| DeployError::fs("read directory", path, e))?;
    if first.is_none() {
        return Err(DeployError::Precondition(format!(
            "Local path {} is empty",
            path.display()
        )));
    }
    Ok(())
}

/// Log the outcome and turn an unsuccessful one into `DeployError::Install`.
fn check_install(app: &str, outcome: &InstallOutcome) -> DeployResult<()> {
    if outcome.succeeded {
        debug!(app = %app, output = %outcome.stdout_lossy(), "Install output");
        return Ok(());
    }

    let stderr = outcome.stderr_lossy();
    error!(app = %app, result = %outcome, stderr = %stderr, "Install error");
    let stderr = stderr.trim();
    Err(DeployError::Install(if stderr.is_empty() {
        outcome.to_string()
    } else {
        format!("{}: {}", outcome, stderr)
    }))
}
