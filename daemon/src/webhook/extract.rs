//! Version and build tags embedded in commit messages
//!
//! A deployable commit carries `version:<value>]` and `build:<value>]`,
//! usually written as `[version:1.2.3][build:45]`. Values are at most 20
//! characters and the first occurrence wins.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::ExtractError;

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"version:(.{0,20}?)\]").unwrap());

static BUILD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"build:(.{0,20}?)\]").unwrap());

/// Commit message marker requesting schema migrations
pub const MIGRATION_MARKER: &str = "__do_migration__";

fn first_capture<'a>(regex: &Regex, message: &'a str) -> Option<&'a str> {
    regex
        .captures(message)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .filter(|value| !value.is_empty())
}

/// Extract `(version, build)` from a commit message
pub fn extract_version_and_build(message: &str) -> Result<(String, String), ExtractError> {
    let version = first_capture(&VERSION_REGEX, message)
        .ok_or_else(|| ExtractError::VersionNotFound(message.to_string()))?;
    let build = first_capture(&BUILD_REGEX, message)
        .ok_or_else(|| ExtractError::BuildNotFound(message.to_string()))?;
    Ok((version.to_string(), build.to_string()))
}

pub fn has_migration_marker(message: &str) -> bool {
    message.contains(MIGRATION_MARKER)
}
