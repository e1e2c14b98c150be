//! Deploy run state machine and per-step failure policy

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One step of a deploy run.
///
/// Runs always follow
/// `CheckExisting -> (Preserve) -> Delete -> Clone -> Install -> (Restore) -> (Cleanup) -> Done`,
/// where the bracketed steps only happen when the run preserves files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeployState {
    CheckExisting,
    Preserve,
    Delete,
    Clone,
    Install,
    Restore,
    Cleanup,
    Done,
}

impl DeployState {
    /// All working states, in execution order.
    pub const STEPS: [DeployState; 7] = [
        DeployState::CheckExisting,
        DeployState::Preserve,
        DeployState::Delete,
        DeployState::Clone,
        DeployState::Install,
        DeployState::Restore,
        DeployState::Cleanup,
    ];

    /// Transition table.
    ///
    /// | from          | preserving | not preserving |
    /// |---------------|------------|----------------|
    /// | CheckExisting | Preserve   | Delete         |
    /// | Preserve      | Delete     | -              |
    /// | Delete        | Clone      | Clone          |
    /// | Clone         | Install    | Install        |
    /// | Install       | Restore    | Done           |
    /// | Restore       | Cleanup    | -              |
    /// | Cleanup       | Done       | -              |
    pub fn next(self, preserving: bool) -> Option<DeployState> {
        use DeployState::*;
        match (self, preserving) {
            (CheckExisting, true) => Some(Preserve),
            (CheckExisting, false) => Some(Delete),
            (Preserve, _) => Some(Delete),
            (Delete, _) => Some(Clone),
            (Clone, _) => Some(Install),
            (Install, true) => Some(Restore),
            (Install, false) => Some(Done),
            (Restore, _) => Some(Cleanup),
            (Cleanup, _) => Some(Done),
            (Done, _) => None,
        }
    }

    /// Steps that only run when files are being preserved.
    pub fn requires_preservation(self) -> bool {
        matches!(
            self,
            DeployState::Preserve | DeployState::Restore | DeployState::Cleanup
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            DeployState::CheckExisting => "check_existing",
            DeployState::Preserve => "preserve",
            DeployState::Delete => "delete",
            DeployState::Clone => "clone",
            DeployState::Install => "install",
            DeployState::Restore => "restore",
            DeployState::Cleanup => "cleanup",
            DeployState::Done => "done",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DeployState::CheckExisting => "Check Existing",
            DeployState::Preserve => "Preserve Files",
            DeployState::Delete => "Delete",
            DeployState::Clone => "Clone",
            DeployState::Install => "Install Dependencies",
            DeployState::Restore => "Restore Files",
            DeployState::Cleanup => "Clean Temp Dirs",
            DeployState::Done => "Done",
        }
    }
}

/// What a failing step does to the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    #[default]
    Abort,
    #[serde(alias = "continue")]
    LogAndContinue,
}

/// Per-step failure policy.
///
/// Only the install step is configurable. Every other step aborts the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailurePolicy {
    pub install: OnFailure,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            install: OnFailure::LogAndContinue,
        }
    }
}

impl FailurePolicy {
    pub fn with_install(install: OnFailure) -> Self {
        Self { install }
    }

    pub fn on_failure(&self, state: DeployState) -> OnFailure {
        match state {
            DeployState::Install => self.install,
            _ => OnFailure::Abort,
        }
    }
}

/// State of a single `deploy` call. Never persisted.
#[derive(Clone, Debug)]
pub struct DeploymentRun {
    pub app_name: String,
    pub local_path: PathBuf,
    pub has_existing_directory: bool,
    pub preserved_files_requested: bool,
    /// Set only once preservation is active.
    pub temp_dir: Option<PathBuf>,
}

impl DeploymentRun {
    pub fn new(app_name: impl Into<String>, local_path: PathBuf, keeps_files: bool) -> Self {
        Self {
            app_name: app_name.into(),
            local_path,
            has_existing_directory: false,
            preserved_files_requested: keeps_files,
            temp_dir: None,
        }
    }

    /// Preservation runs only when there is something to preserve from.
    pub fn is_preserving(&self) -> bool {
        self.has_existing_directory && self.preserved_files_requested
    }
}
