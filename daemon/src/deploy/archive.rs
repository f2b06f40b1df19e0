//! Archive-copy path for client repositories
//!
//! Client repositories are never built. Their `archive/` files and README are
//! copied from a throwaway clone into a persistent per-client directory.

use tracing::{info, warn};

use crate::deploy::context::{checked_clone_url, PipelineEnv, PipelineFailure};
use crate::deploy::git;
use crate::deploy::report::{Report, Stage};
use crate::errors::{DaemonError, PipelineError};
use crate::filesys::dir::Dir;
use crate::models::deployment::DeploymentRequest;
use crate::storage::layout::COMMAND_LOG_NAME;
use crate::utils::is_safe_token;

/// Directory inside the client repository holding the distributable files
pub const ARCHIVE_DIR: &str = "archive";

/// Copied next to the archive files
pub const README_NAME: &str = "README.md";

/// Prefix of the temporary clone directory under the clients root
const TEMP_PREFIX: &str = ".tmp";

/// Copy the archive files of a client repository
pub async fn copy_client_archive(
    request: &DeploymentRequest,
    env: &PipelineEnv,
) -> Result<Report, PipelineFailure> {
    let label = request.build_label();
    let mut report = Report::new();

    if !env.clients.contains(&request.repository_name) {
        return Err(PipelineFailure {
            error: PipelineError::NotDeployable(request.repository_name.clone()),
            report,
        });
    }

    info!("Copying files for {}", label);
    match copy_files(request, env, &mut report).await {
        Ok(copied) => {
            info!("Copied {} files for {}", copied, label);
            report.header_line(format!("Files {} copied", label));
            Ok(report)
        }
        Err(error) => {
            report.header_line(format!("Failed to copy files {}", label));
            report.header_line(format!("[build:{}]", request.build));
            report.set_error(error.to_string());
            Err(PipelineFailure { error, report })
        }
    }
}

async fn copy_files(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    report: &mut Report,
) -> Result<usize, PipelineError> {
    for value in [&request.repository_name, &request.branch] {
        if !is_safe_token(value) {
            let message = format!("unsafe name {:?}", value);
            report.failed(Stage::Prepare, &message);
            return Err(PipelineError::PrepareError(message));
        }
    }
    let clone_url = checked_clone_url(request).map_err(|message| {
        report.failed(Stage::Prepare, &message);
        PipelineError::PrepareError(message)
    })?;

    let clients_root = env.layout.clients_root();
    let client_dir = env.layout.client_dir(&request.repository_name);
    let temp_dir = match create_dirs(&client_dir, &clients_root).await {
        Ok(temp_dir) => temp_dir,
        Err(e) => {
            report.failed(Stage::Prepare, e.to_string());
            return Err(PipelineError::PrepareError(e.to_string()));
        }
    };
    report.ok(Stage::Prepare);

    let result = clone_and_copy(request, env, report, &clone_url, &client_dir, &temp_dir).await;

    if let Err(e) = temp_dir.delete().await {
        warn!(
            "Failed to delete temporary clone {}: {}",
            temp_dir.path().display(),
            e
        );
    }
    result
}

async fn create_dirs(client_dir: &Dir, clients_root: &Dir) -> Result<Dir, DaemonError> {
    client_dir.create().await?;
    clients_root.create_temp_subdir(TEMP_PREFIX).await
}

async fn clone_and_copy(
    request: &DeploymentRequest,
    env: &PipelineEnv,
    report: &mut Report,
    clone_url: &str,
    client_dir: &Dir,
    temp_dir: &Dir,
) -> Result<usize, PipelineError> {
    let log = env.layout.clients_root().path().join(COMMAND_LOG_NAME);
    let checkout = temp_dir.subdir(&request.repository_name);

    let commands = [
        git::clone(clone_url, checkout.path()).current_dir(temp_dir.path()),
        git::checkout(&request.branch, checkout.path()),
    ];
    for spec in commands {
        if let Err(step) = env.exec(spec, &log).await {
            report.failed(Stage::Clone, step.message());
            return Err(step.into_pipeline(Stage::Clone, PipelineError::BuildError));
        }
    }
    report.ok(Stage::Clone);

    match copy_archive_files(&checkout, client_dir).await {
        Ok(copied) => {
            report.ok(Stage::Archive);
            Ok(copied)
        }
        Err(e) => {
            report.failed(Stage::Archive, e.to_string());
            Err(PipelineError::BuildError(e.to_string()))
        }
    }
}

/// Copy `archive/*.*` and the README of `checkout` into `target`
async fn copy_archive_files(checkout: &Dir, target: &Dir) -> Result<usize, DaemonError> {
    let archive_files: Vec<_> = checkout
        .subdir(ARCHIVE_DIR)
        .list_files()
        .await?
        .into_iter()
        .filter(|file| file.name().is_some_and(|name| name.contains('.')))
        .collect();
    if archive_files.is_empty() {
        return Err(DaemonError::Internal(format!(
            "no files to copy in {}",
            checkout.subdir(ARCHIVE_DIR).path().display()
        )));
    }

    let readme = checkout.file(README_NAME);
    if !readme.exists().await {
        return Err(DaemonError::Internal(format!(
            "{} not found",
            readme.path().display()
        )));
    }

    let mut copied = 0;
    for file in archive_files.iter().chain(std::iter::once(&readme)) {
        file.copy_into(target.path()).await?;
        copied += 1;
    }
    Ok(copied)
}
