//! Docker Compose commands for one deployment

use std::path::{Path, PathBuf};

use crate::deploy::runner::CommandSpec;

/// Compose service the migration and test commands run in
pub const APP_SERVICE: &str = "app";

/// A compose project checked out at `dir`
///
/// Every command carries `VERSION` and `APPNAME` so the compose file can tag
/// images and name containers per stage and version.
#[derive(Debug, Clone)]
pub struct ComposeProject {
    dir: PathBuf,
    version_tag: String,
    app_name: String,
}

impl ComposeProject {
    pub fn new(dir: impl Into<PathBuf>, stage: &str, version: &str, repository: &str) -> Self {
        Self {
            dir: dir.into(),
            version_tag: format!("{}-{}", stage, version),
            app_name: repository.to_lowercase(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn compose(&self) -> CommandSpec {
        CommandSpec::new("docker-compose")
            .current_dir(&self.dir)
            .env("VERSION", &self.version_tag)
            .env("APPNAME", &self.app_name)
    }

    /// `docker-compose build`
    pub fn build(&self) -> CommandSpec {
        self.compose().arg("build")
    }

    /// `docker-compose run --rm app <command...>`
    pub fn run_in_app(&self, command: &[String]) -> CommandSpec {
        self.compose()
            .args(["run", "--rm", APP_SERVICE])
            .args(command.iter().cloned())
    }

    /// `docker-compose down --remove-orphans`
    pub fn down(&self) -> CommandSpec {
        self.compose().args(["down", "--remove-orphans"])
    }

    /// `docker-compose up -d`
    pub fn up(&self) -> CommandSpec {
        self.compose().args(["up", "-d"])
    }
}
