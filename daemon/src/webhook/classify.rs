//! Mapping of a verified payload to the action the daemon takes

use github_models::WebhookPayload;
use tracing::{debug, info};

use crate::errors::{ClassifyError, RejectReason};
use crate::models::deployment::{DeploymentRequest, UpdateRequest, WorkflowReport};
use crate::storage::settings::Settings;
use crate::webhook::extract::{extract_version_and_build, has_migration_marker};

/// Action value GitHub sends once a workflow job or run is over
pub const ACTION_COMPLETED: &str = "completed";

/// What to do with a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Nothing to do, with the reason for the log
    Ignore(String),

    /// Tell admins how a CI workflow ended
    WorkflowReport(WorkflowReport),

    /// Pull the daemon's own checkout
    Update(UpdateRequest),

    /// Copy a client repository's archive files
    Archive(DeploymentRequest),

    /// Build and run containers
    Deploy(DeploymentRequest),
}

/// Parse the raw body of a verified delivery
pub fn parse_payload(body: &[u8]) -> Result<WebhookPayload, RejectReason> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Malformed payload: {}", e);
        RejectReason::PayloadMalformed
    })
}

/// Prefix of branch references; tags and other refs never deploy
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Branch name from a `refs/heads/{branch}` reference, `None` for any other ref
///
/// The whole remainder is kept, so `refs/heads/feature/main` is `feature/main`.
pub fn branch_from_ref(git_ref: &str) -> Option<&str> {
    git_ref
        .strip_prefix(BRANCH_REF_PREFIX)
        .filter(|branch| !branch.is_empty())
}

pub fn classify(
    payload: &WebhookPayload,
    settings: &Settings,
) -> Result<Classification, ClassifyError> {
    let Some(repository) = &payload.repository else {
        return Ok(ignore("payload has no repository"));
    };

    if let Some(action) = payload.action.as_deref() {
        return Ok(classify_action(action, payload, &repository.name, settings));
    }

    let git_ref = payload.git_ref.as_deref().unwrap_or_default();
    let Some(branch) = branch_from_ref(git_ref) else {
        return Ok(ignore(format!("ref {:?} is not a branch", git_ref)));
    };
    let Some(stage) = settings.stage_for(branch) else {
        return Ok(ignore(format!("branch {:?} has no stage", branch)));
    };

    if settings.is_update_target(&repository.name) {
        return Ok(Classification::Update(UpdateRequest {
            repository_name: repository.name.clone(),
            branch: branch.to_string(),
        }));
    }

    let Some(ssh_url) = repository.ssh_url.clone() else {
        return Ok(ignore(format!("repository {} has no ssh_url", repository.name)));
    };

    let message = payload.commit_message().unwrap_or_default();
    let (version, build) = extract_version_and_build(message)?;
    let request = DeploymentRequest {
        branch: branch.to_string(),
        stage: stage.to_string(),
        repository_name: repository.name.clone(),
        owner: repository
            .owner
            .as_ref()
            .and_then(|owner| owner.handle())
            .unwrap_or_default(),
        ssh_url,
        version,
        build,
        do_migration: has_migration_marker(message),
    };

    if request.repository_name.ends_with(&settings.client_suffix) {
        info!("Archive request for {}", request.build_label());
        Ok(Classification::Archive(request))
    } else {
        info!("Deploy request for {}", request.container_name());
        Ok(Classification::Deploy(request))
    }
}

fn classify_action(
    action: &str,
    payload: &WebhookPayload,
    repository: &str,
    settings: &Settings,
) -> Classification {
    if action != ACTION_COMPLETED {
        return ignore(format!("action {:?}", action));
    }
    let Some(summary) = payload.workflow_summary() else {
        return ignore("completed action without a workflow");
    };
    let branch = summary.head_branch.unwrap_or_default();
    if settings.stage_for(branch).is_none() {
        return ignore(format!("workflow branch {:?} has no stage", branch));
    }
    Classification::WorkflowReport(WorkflowReport {
        repository_name: repository.to_string(),
        workflow: summary.name.map(str::to_string),
        conclusion: summary.conclusion.unwrap_or("unknown").to_string(),
        branch: branch.to_string(),
        head_sha: summary.head_sha.unwrap_or_default().to_string(),
    })
}

fn ignore(reason: impl Into<String>) -> Classification {
    let reason = reason.into();
    debug!("Ignoring delivery: {}", reason);
    Classification::Ignore(reason)
}
