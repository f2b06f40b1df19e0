//! GitHub webhook payload models
//!
//! Only the fields the deployer reads are modelled; everything else in the
//! payload is ignored during deserialization.

use serde::{Deserialize, Serialize};

/// A webhook payload for `push`, `workflow_job` or `workflow_run` events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Git ref pushed to, e.g. `refs/heads/main` (push events only)
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,

    /// Workflow action, e.g. `queued`, `in_progress`, `completed`
    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub repository: Option<Repository>,

    /// Head commit of a push
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,

    #[serde(default)]
    pub workflow_job: Option<WorkflowJob>,

    #[serde(default)]
    pub workflow_run: Option<WorkflowRun>,
}

impl WebhookPayload {
    /// Commit message of the head commit, if any
    pub fn commit_message(&self) -> Option<&str> {
        self.head_commit
            .as_ref()
            .or_else(|| self.workflow_run.as_ref().and_then(|r| r.head_commit.as_ref()))
            .map(|c| c.message.as_str())
    }

    /// Summary of the workflow job or run carried by an action payload
    pub fn workflow_summary(&self) -> Option<WorkflowSummary<'_>> {
        if let Some(job) = &self.workflow_job {
            return Some(WorkflowSummary {
                name: job.name.as_deref(),
                conclusion: job.conclusion.as_deref(),
                head_branch: job.head_branch.as_deref(),
                head_sha: job.head_sha.as_deref(),
            });
        }
        self.workflow_run.as_ref().map(|run| WorkflowSummary {
            name: run.name.as_deref(),
            conclusion: run.conclusion.as_deref(),
            head_branch: run.head_branch.as_deref(),
            head_sha: run.head_sha.as_deref(),
        })
    }
}

/// Repository section of a payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,

    #[serde(default)]
    pub ssh_url: Option<String>,

    #[serde(default)]
    pub owner: Option<Owner>,
}

/// Repository owner
///
/// Push payloads carry `name`, workflow payloads only `login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub login: Option<String>,
}

impl Owner {
    /// Lowercased owner handle, preferring `name` over `login`
    pub fn handle(&self) -> Option<String> {
        self.name
            .as_deref()
            .or(self.login.as_deref())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub message: String,
}

/// `workflow_job` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowJob {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub conclusion: Option<String>,

    #[serde(default)]
    pub head_branch: Option<String>,

    #[serde(default)]
    pub head_sha: Option<String>,
}

/// `workflow_run` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRun {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub conclusion: Option<String>,

    #[serde(default)]
    pub head_branch: Option<String>,

    #[serde(default)]
    pub head_sha: Option<String>,

    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

/// Borrowed view over a workflow job or run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSummary<'a> {
    pub name: Option<&'a str>,
    pub conclusion: Option<&'a str>,
    pub head_branch: Option<&'a str>,
    pub head_sha: Option<&'a str>,
}
