//! Git commands used by the deployment paths

use std::path::Path;

use crate::deploy::runner::CommandSpec;

/// SSH clone URL of a GitHub repository
///
/// Both parts must already be safe tokens.
pub fn github_ssh_url(owner: &str, repository: &str) -> String {
    format!("git@github.com:{}/{}.git", owner, repository)
}

/// Clone `url` at `branch` into `target_dir`
pub fn clone_branch(url: &str, branch: &str, target_dir: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .args(["clone", "-b", branch, "--", url])
        .arg(target_dir.to_string_lossy())
}

/// Clone `url` at its default branch into `target_dir`
pub fn clone(url: &str, target_dir: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .args(["clone", "--", url])
        .arg(target_dir.to_string_lossy())
}

/// Switch the checkout at `repo_dir` to `branch`
pub fn checkout(branch: &str, repo_dir: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .args(["checkout", branch])
        .current_dir(repo_dir)
}

/// Fast-forward the current branch of `repo_dir`
pub fn pull(repo_dir: &Path) -> CommandSpec {
    CommandSpec::new("git").arg("pull").current_dir(repo_dir)
}
