//! Deployment models

use serde::{Deserialize, Serialize};

/// A validated request to deploy one repository stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Source branch
    pub branch: String,

    /// Stage resolved from the branch
    pub stage: String,

    pub repository_name: String,

    /// Lowercased repository owner
    pub owner: String,

    pub ssh_url: String,

    /// Version tag from the commit message
    pub version: String,

    /// Build tag from the commit message
    pub build: String,

    /// Run schema migrations before testing
    pub do_migration: bool,
}

impl DeploymentRequest {
    /// `{repo}-{stage}-{version}`
    pub fn container_name(&self) -> String {
        format!("{}-{}-{}", self.repository_name, self.stage, self.version)
    }

    /// `{repo}-{stage}-{build}`, used in archive reports
    pub fn build_label(&self) -> String {
        format!("{}-{}-{}", self.repository_name, self.stage, self.build)
    }
}

/// Pull of a checkout that is not deployed as a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub repository_name: String,
    pub branch: String,
}

/// Outcome of a completed GitHub Actions job or run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub repository_name: String,
    pub workflow: Option<String>,
    pub conclusion: String,
    pub branch: String,
    pub head_sha: String,
}

impl WorkflowReport {
    /// Plain text sent to admins
    pub fn render(&self) -> String {
        let mut text = format!("Action result: {}", self.conclusion);
        if let Some(workflow) = &self.workflow {
            text.push_str(&format!("\nWorkflow: {}", workflow));
        }
        text.push_str(&format!(
            "\nRepository: {}\nBranch: {}\nSHA: {}",
            self.repository_name, self.branch, self.head_sha
        ));
        text
    }
}
