//! Utility functions

use std::time::Duration;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::deploy::runner::{CommandRunner, CommandSpec, ProcessRunner};
use crate::errors::DaemonError;
use crate::storage::settings::Settings;

/// Tools the deployment paths shell out to
pub const REQUIRED_TOOLS: [&str; 3] = ["git", "docker-compose", "docker"];

/// Version information for the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Whether a webhook-supplied name is safe as a path segment and a process argument
///
/// Allows ASCII alphanumerics, `.`, `_` and `-`; rejects a leading `-` and the
/// `.`/`..` segments.
pub fn is_safe_token(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 100
        && !value.starts_with('-')
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Print PASS/FAIL lines for the settings and every required tool
///
/// Returns whether every check passed.
pub async fn run_diagnostic(settings: &Result<Settings, DaemonError>) -> bool {
    let mut passed = report_check("settings", settings.as_ref().map(|_| ()).map_err(|e| e.to_string()));

    let runner = ProcessRunner::new(Duration::from_secs(10));
    for tool in REQUIRED_TOOLS {
        let spec = CommandSpec::new(tool).arg("--version");
        let result = match runner.run(&spec).await {
            Ok(outcome) if outcome.is_success() => Ok(()),
            Ok(outcome) => Err(format!("exited with {:?}", outcome.code)),
            Err(e) => Err(e.to_string()),
        };
        passed &= report_check(tool, result);
    }
    passed
}

fn report_check(name: &str, result: Result<(), String>) -> bool {
    match result {
        Ok(()) => {
            println!("{} {}", "[PASS]".green().bold(), name);
            true
        }
        Err(e) => {
            println!("{} {}: {}", "[FAIL]".red().bold(), name, e);
            false
        }
    }
}
