//! Container deployment pipeline
//!
//! Prepare, sync the checkout, copy `.env`, build, optionally migrate, test,
//! replace the running containers and prune images. Every stage appends to the
//! report; the first failing stage aborts the run.

use tracing::{debug, info, warn};

use crate::deploy::compose::ComposeProject;
use crate::deploy::context::{
    checked_clone_url, DeploymentContext, PipelineEnv, PipelineFailure, StepError,
};
use crate::deploy::docker;
use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::git;
use crate::deploy::report::{Report, Stage};
use crate::errors::PipelineError;
use crate::models::deployment::DeploymentRequest;
use crate::utils::is_safe_token;

/// Run every stage for `request`, returning the report of a successful run
pub async fn run_pipeline(
    request: &DeploymentRequest,
    env: &PipelineEnv,
) -> Result<Report, PipelineFailure> {
    let mut ctx = DeploymentContext::new(request, &env.layout);
    info!("Deploying {}", ctx.container_name);

    match run_stages(request, env, &mut ctx).await {
        Ok(()) => {
            info!("Deployment of {} finished", ctx.container_name);
            Ok(ctx.report)
        }
        Err(error) => {
            warn!(
                "Deployment of {} stopped in state {:?}: {}",
                ctx.container_name,
                ctx.state(),
                error
            );
            ctx.fail(&error);
            Err(PipelineFailure {
                error,
                report: ctx.report,
            })
        }
    }
}

async fn run_stages(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    ctx: &mut DeploymentContext,
) -> Result<(), PipelineError> {
    let clone_url = prepare(request, env, ctx).await?;
    sync_checkout(request, env, ctx, &clone_url).await?;
    copy_env(request, env, ctx).await?;

    let project = ComposeProject::new(
        ctx.repo_dir.path(),
        &request.stage,
        &request.version,
        &request.repository_name,
    );

    build(request, env, ctx, &project).await?;
    ctx.advance(DeploymentEvent::Built);

    if request.do_migration {
        let migrate = project.run_in_app(&env.migrate_command);
        ctx.stage(env, Stage::Migrate, vec![migrate], PipelineError::MigrationError)
            .await?;
        ctx.advance(DeploymentEvent::Migrated);
    }

    let test = project.run_in_app(&env.test_command);
    ctx.stage(env, Stage::Test, vec![test], PipelineError::TestError)
        .await?;
    ctx.advance(DeploymentEvent::Tested);

    ctx.stage(
        env,
        Stage::Run,
        vec![project.down(), project.up()],
        PipelineError::RunError,
    )
    .await?;
    ctx.advance(DeploymentEvent::Started);

    cleanup(env, ctx).await;
    ctx.advance(DeploymentEvent::Finished);
    Ok(())
}

/// Check the request may deploy here and that its working directory exists,
/// returning the URL to clone from
async fn prepare(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    ctx: &mut DeploymentContext,
) -> Result<String, PipelineError> {
    if !env.applications.contains(&request.repository_name) {
        return Err(PipelineError::NotDeployable(request.repository_name.clone()));
    }

    ctx.report
        .header_line(format!("Container: {}", ctx.container_name));
    ctx.report.header_line(format!("[build:{}]", request.build));
    ctx.report
        .header_line(format!("[version:{}]", request.version));

    for (what, value) in [
        ("repository", &request.repository_name),
        ("branch", &request.branch),
        ("stage", &request.stage),
    ] {
        if !is_safe_token(value) {
            let message = format!("unsafe {} name {:?}", what, value);
            ctx.report.failed(Stage::Prepare, &message);
            return Err(PipelineError::PrepareError(message));
        }
    }
    let clone_url = checked_clone_url(request).map_err(|message| {
        ctx.report.failed(Stage::Prepare, &message);
        PipelineError::PrepareError(message)
    })?;

    if !ctx.working_dir.exists().await {
        let message = format!(
            "working directory {} does not exist",
            ctx.working_dir.path().display()
        );
        ctx.report.failed(Stage::Prepare, &message);
        return Err(PipelineError::PrepareError(message));
    }

    ctx.report.ok(Stage::Prepare);
    ctx.advance(DeploymentEvent::Prepared);
    Ok(clone_url)
}

/// Clone the branch when there is no checkout yet, otherwise pull it
async fn sync_checkout(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    ctx: &mut DeploymentContext,
    clone_url: &str,
) -> Result<(), PipelineError> {
    if ctx.repo_dir.exists().await {
        let repo = ctx.repo_dir.path().to_path_buf();
        let commands = vec![git::checkout(&request.branch, &repo), git::pull(&repo)];
        ctx.stage(env, Stage::Pull, commands, PipelineError::BuildError)
            .await
    } else {
        let clone = git::clone_branch(clone_url, &request.branch, ctx.repo_dir.path())
            .current_dir(ctx.working_dir.path());
        ctx.stage(env, Stage::Clone, vec![clone], PipelineError::BuildError)
            .await
    }
}

async fn copy_env(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    ctx: &mut DeploymentContext,
) -> Result<(), PipelineError> {
    let env_file = env
        .layout
        .env_file(&request.repository_name, &request.stage);
    match env_file.copy_into(ctx.repo_dir.path()).await {
        Ok(_) => {
            ctx.report.ok(Stage::CopyEnv);
            Ok(())
        }
        Err(e) => {
            let message = format!("{}: {}", env_file.path().display(), e);
            ctx.report.failed(Stage::CopyEnv, &message);
            Err(PipelineError::BuildError(message))
        }
    }
}

/// Check out the branch and build images, retrying failed attempts
///
/// A timed out attempt is not retried.
async fn build(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    ctx: &mut DeploymentContext,
    project: &ComposeProject,
) -> Result<(), PipelineError> {
    let attempts = env.build_attempts.max(1);
    let mut attempt = 1;
    loop {
        let commands = vec![
            git::checkout(&request.branch, project.dir()),
            project.build(),
        ];
        match ctx.try_commands(env, commands).await {
            Ok(()) => {
                ctx.report.ok(Stage::Build);
                return Ok(());
            }
            Err(StepError::Failed(message)) if attempt < attempts => {
                warn!(
                    "Build attempt {}/{} of {} failed: {}",
                    attempt, attempts, ctx.container_name, message
                );
                ctx.report.warning(
                    Stage::Build,
                    format!("attempt {}/{} failed: {}", attempt, attempts, message),
                );
                attempt += 1;
            }
            Err(step) => {
                ctx.report.failed(Stage::Build, step.message());
                return Err(step.into_pipeline(Stage::Build, PipelineError::BuildError));
            }
        }
    }
}

/// Prune dangling images, never failing the run
async fn cleanup(env: &PipelineEnv, ctx: &mut DeploymentContext) {
    match ctx
        .try_commands(env, vec![docker::prune_dangling_images()])
        .await
    {
        Ok(()) => {
            debug!("Pruned dangling images after {}", ctx.container_name);
            ctx.report.ok(Stage::Cleanup);
        }
        Err(step) => {
            warn!("Cleanup after {} failed: {}", ctx.container_name, step.message());
            ctx.report.warning(Stage::Cleanup, step.message());
        }
    }
}
