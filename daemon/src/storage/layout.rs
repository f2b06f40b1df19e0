//! Deployment filesystem layout

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Name of the per-deployment environment file
pub const ENV_FILE_NAME: &str = ".env";

/// Name of the append-only stderr log of external commands
pub const COMMAND_LOG_NAME: &str = "subprocess.log";

/// Where deployments and client archives live on disk
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Root of `{repo}/{stage}` working directories
    pub deploy_root: PathBuf,

    /// Root of per-client archive directories
    pub clients_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(deploy_root: impl Into<PathBuf>, clients_dir: impl Into<PathBuf>) -> Self {
        Self {
            deploy_root: deploy_root.into(),
            clients_dir: clients_dir.into(),
        }
    }

    /// Pre-provisioned working directory of one repository stage
    pub fn working_dir(&self, repository: &str, stage: &str) -> Dir {
        Dir::new(self.deploy_root.join(repository).join(stage))
    }

    /// Checkout inside the working directory
    pub fn repo_dir(&self, repository: &str, stage: &str) -> Dir {
        self.working_dir(repository, stage).subdir(repository)
    }

    /// Environment file copied into every checkout
    pub fn env_file(&self, repository: &str, stage: &str) -> File {
        self.working_dir(repository, stage).file(ENV_FILE_NAME)
    }

    /// Root holding every client archive directory and temporary clones
    pub fn clients_root(&self) -> Dir {
        Dir::new(&self.clients_dir)
    }

    /// Persistent archive directory of one client repository
    pub fn client_dir(&self, repository: &str) -> Dir {
        self.clients_root().subdir(repository)
    }
}
