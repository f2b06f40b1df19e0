//! Pull of the daemon's own checkout

use tracing::info;

use crate::deploy::context::{PipelineEnv, PipelineFailure};
use crate::deploy::git;
use crate::deploy::report::{Report, Stage};
use crate::errors::PipelineError;
use crate::filesys::dir::Dir;
use crate::models::deployment::UpdateRequest;
use crate::storage::layout::COMMAND_LOG_NAME;
use crate::utils::is_safe_token;

/// Check out and pull `request.branch` in the configured update directory
pub async fn pull_update(
    request: &UpdateRequest,
    env: &PipelineEnv,
) -> Result<Report, PipelineFailure> {
    let mut report = Report::new();
    report.header_line(format!("Git pull for {}", request.repository_name));
    report.header_line(format!("Branch: {}", request.branch));

    match pull(request, env, &mut report).await {
        Ok(()) => {
            info!("Updated {} to {}", request.repository_name, request.branch);
            Ok(report)
        }
        Err(error) => {
            report.set_error(error.to_string());
            Err(PipelineFailure { error, report })
        }
    }
}

async fn pull(
    request: &UpdateRequest,
    env: &PipelineEnv,
    report: &mut Report,
) -> Result<(), PipelineError> {
    let Some(path) = &env.update_dir else {
        let message = "update_dir is not configured".to_string();
        report.failed(Stage::Update, &message);
        return Err(PipelineError::PrepareError(message));
    };
    let dir = Dir::new(path);
    if !is_safe_token(&request.branch) || !dir.exists().await {
        let message = format!("cannot pull {:?} into {}", request.branch, path.display());
        report.failed(Stage::Update, &message);
        return Err(PipelineError::PrepareError(message));
    }

    let log = env.layout.deploy_root.join(COMMAND_LOG_NAME);
    for spec in [git::checkout(&request.branch, path), git::pull(path)] {
        if let Err(step) = env.exec(spec, &log).await {
            report.failed(Stage::Update, step.message());
            return Err(step.into_pipeline(Stage::Update, PipelineError::BuildError));
        }
    }
    report.ok(Stage::Update);
    Ok(())
}
