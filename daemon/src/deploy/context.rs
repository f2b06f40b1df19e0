//! Execution environment and per-run state shared by the deployment paths

use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::git;
use crate::deploy::report::{Report, Stage};
use crate::deploy::runner::{CommandRunner, CommandSpec};
use crate::errors::{CommandError, PipelineError};
use crate::filesys::dir::Dir;
use crate::models::deployment::DeploymentRequest;
use crate::storage::layout::{StorageLayout, COMMAND_LOG_NAME};
use crate::storage::settings::Settings;
use crate::utils::is_safe_token;

/// Everything a run needs besides the request itself
#[derive(Clone)]
pub struct PipelineEnv {
    pub runner: Arc<dyn CommandRunner>,
    pub layout: StorageLayout,
    pub applications: Vec<String>,
    pub clients: Vec<String>,
    pub update_dir: Option<PathBuf>,
    pub build_attempts: u32,
    pub migrate_command: Vec<String>,
    pub test_command: Vec<String>,
}

impl PipelineEnv {
    pub fn from_settings(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            layout: StorageLayout::new(&settings.deploy.deploy_root, &settings.deploy.clients_dir),
            applications: settings.applications.clone(),
            clients: settings.clients.clone(),
            update_dir: settings.update_dir.clone(),
            build_attempts: settings.deploy.build_attempts.max(1),
            migrate_command: settings.deploy.migrate_command.clone(),
            test_command: settings.deploy.test_command.clone(),
        }
    }

    /// Run `spec` with stderr appended to `log`
    pub async fn exec(&self, spec: CommandSpec, log: &PathBuf) -> Result<(), StepError> {
        let spec = spec.stderr_to(log);
        match self.runner.run(&spec).await {
            Ok(outcome) if outcome.is_success() => Ok(()),
            Ok(outcome) => Err(StepError::Failed(match outcome.code {
                Some(code) => format!("`{}` exited with code {}", spec, code),
                None => format!("`{}` was terminated by a signal", spec),
            })),
            Err(e @ CommandError::Timeout { .. }) => Err(StepError::TimedOut(e.to_string())),
            Err(e) => Err(StepError::Failed(e.to_string())),
        }
    }
}

/// Clone URL rebuilt from the validated owner and repository names
///
/// The delivered `ssh_url` must name the same repository; it is never passed
/// to git itself.
pub fn checked_clone_url(request: &DeploymentRequest) -> Result<String, String> {
    if !is_safe_token(&request.owner) {
        return Err(format!("unsafe owner name {:?}", request.owner));
    }
    let url = git::github_ssh_url(&request.owner, &request.repository_name);
    if !request.ssh_url.eq_ignore_ascii_case(&url) {
        return Err(format!(
            "clone URL {:?} does not match {}",
            request.ssh_url, url
        ));
    }
    Ok(url)
}

/// Failure of one command inside a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    Failed(String),
    TimedOut(String),
}

impl StepError {
    pub fn message(&self) -> &str {
        match self {
            StepError::Failed(msg) | StepError::TimedOut(msg) => msg,
        }
    }

    /// Classify as the stage's error kind, or a timeout
    pub fn into_pipeline(self, stage: Stage, kind: fn(String) -> PipelineError) -> PipelineError {
        match self {
            StepError::Failed(msg) => kind(msg),
            StepError::TimedOut(message) => PipelineError::CommandTimeout {
                stage: stage.to_string(),
                message,
            },
        }
    }
}

/// An aborted run together with everything recorded before the abort
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub report: Report,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for PipelineFailure {}

/// Mutable state of one container deployment, owned by exactly one run
#[derive(Debug)]
pub struct DeploymentContext {
    pub working_dir: Dir,
    pub repo_dir: Dir,
    pub container_name: String,
    pub log_file: PathBuf,
    pub report: Report,
    fsm: DeploymentFsm,
}

impl DeploymentContext {
    pub fn new(request: &DeploymentRequest, layout: &StorageLayout) -> Self {
        let working_dir = layout.working_dir(&request.repository_name, &request.stage);
        let repo_dir = layout.repo_dir(&request.repository_name, &request.stage);
        let log_file = working_dir.path().join(COMMAND_LOG_NAME);
        Self {
            working_dir,
            repo_dir,
            container_name: request.container_name(),
            log_file,
            report: Report::new(),
            fsm: DeploymentFsm::new(),
        }
    }

    pub fn state(&self) -> DeploymentState {
        self.fsm.state()
    }

    /// Record a successful stage transition
    pub fn advance(&mut self, event: DeploymentEvent) {
        if let Err(e) = self.fsm.process(event) {
            error!("{} ({})", e, self.container_name);
        }
    }

    /// Move to `Failed` and record the terminal error
    pub fn fail(&mut self, error: &PipelineError) {
        self.advance(DeploymentEvent::Failed(error.to_string()));
        self.report.set_error(error.to_string());
    }

    /// Run a stage's commands in order, recording a single report line
    pub async fn stage(
        &mut self,
        env: &PipelineEnv,
        stage: Stage,
        commands: Vec<CommandSpec>,
        kind: fn(String) -> PipelineError,
    ) -> Result<(), PipelineError> {
        match self.try_commands(env, commands).await {
            Ok(()) => {
                self.report.ok(stage);
                Ok(())
            }
            Err(step) => {
                self.report.failed(stage, step.message());
                Err(step.into_pipeline(stage, kind))
            }
        }
    }

    /// Run commands in order, stopping at the first failure, without reporting
    pub async fn try_commands(
        &self,
        env: &PipelineEnv,
        commands: Vec<CommandSpec>,
    ) -> Result<(), StepError> {
        for spec in commands {
            env.exec(spec, &self.log_file).await?;
        }
        Ok(())
    }
}
