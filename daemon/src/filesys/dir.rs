//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DaemonError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DaemonError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DaemonError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// List regular files in the directory
    pub async fn list_files(&self) -> Result<Vec<File>, DaemonError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(File::new(entry.path()));
            }
        }

        files.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(files)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Create a uniquely named temporary subdirectory
    pub async fn create_temp_subdir(&self, prefix: &str) -> Result<Dir, DaemonError> {
        let temp_dir = self
            .path
            .join(format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()));
        fs::create_dir(&temp_dir).await?;
        Ok(Dir::new(temp_dir))
    }
}
